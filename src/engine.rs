//! The duplicate-detection engine.
//!
//! One [`Engine`] value owns every piece of run state. `observe` feeds it
//! a discovered path; the pipeline is probe, index lookup, comparator on a
//! signature match, then the policy action. `finish` wraps the run up.
//!
//! Survivors are always the earlier-seen path: given the expander's
//! delivery order the whole run is deterministic.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use crate::checksum::Signature;
use crate::config::Config;
use crate::groups;
use crate::index::{path_key, CandidateIndex, FileRecord, RecordId, MAX_LINK_COUNT};
use crate::output::{self, Reporter};
use crate::platform;
use crate::probe::{self, Probe, ProbeOptions};
use crate::script::BatchWriter;

/// Failures that abort the run. Partial progress during destructive
/// operations would leave user data at risk, so these are never swallowed.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("stat failed on '{path}'")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("delete of '{path}' failed")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("create hard link from '{target}' to '{survivor}' failed")]
    Link {
        target: PathBuf,
        survivor: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    /// Files stored as unique records.
    pub total_files: u64,
    pub total_bytes: u64,
    /// Confirmed duplicates, hard-linked instances included.
    pub duplicate_files: u64,
    pub duplicate_bytes: u64,
    pub zero_length: u64,
    pub ignored: u64,
    pub unreadable: u64,
    pub hardlink_groups: u64,
}

/// How two byte-identical candidates relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Same physical file already.
    HardLinked,
    /// Distinct files with identical content.
    ContentEqual,
}

pub struct Engine<'a> {
    cfg: &'a Config,
    index: CandidateIndex,
    reference_dirs: HashSet<PathBuf>,
    stats: RunStats,
    batch: Option<BatchWriter>,
    reporter: Reporter,
    seen_count: u64,
}

/// Where a freshly walked record hangs in its size bucket.
enum Attach {
    Root(u64),
    Smaller(RecordId),
    Larger(RecordId),
    /// Splice into the equals chain between `prev` and `next`.
    Chain { prev: RecordId, next: RecordId },
}

impl<'a> Engine<'a> {
    pub fn new(cfg: &'a Config, batch: Option<BatchWriter>, reporter: Reporter) -> Self {
        Engine {
            cfg,
            index: CandidateIndex::new(),
            reference_dirs: HashSet::new(),
            stats: RunStats::default(),
            batch,
            reporter,
            seen_count: 0,
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Record the directory of a reference-pattern match. Files under it
    /// only ever serve as survivors.
    fn note_reference(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.reference_dirs.insert(parent.to_path_buf());
        }
    }

    pub fn is_reference(&self, path: &Path) -> bool {
        path.parent()
            .is_some_and(|parent| self.reference_dirs.contains(parent))
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.cfg.ignore_patterns.is_empty() {
            return false;
        }
        let haystack = path.display().to_string().to_lowercase();
        self.cfg
            .ignore_patterns
            .iter()
            .any(|pattern| haystack.contains(pattern))
    }

    /// Feed one discovered path through the pipeline.
    pub fn observe(&mut self, path: &Path, reference: bool) -> Result<()> {
        if !self.index.mark_seen(path_key(path)) {
            // The expander may emit a path more than once.
            return Ok(());
        }

        self.seen_count += 1;
        self.reporter.scanned(self.seen_count, path);

        if self.batch.as_ref().is_some_and(|b| b.path() == path) {
            return Ok(());
        }

        if reference {
            self.note_reference(path);
        }

        if self.is_ignored(path) {
            self.stats.ignored += 1;
            return Ok(());
        }

        let opts = ProbeOptions {
            skip_zero_length: self.cfg.skip_zero_length,
            list_links: self.cfg.list_links,
        };
        let probed = match probe::probe(path, &opts) {
            Ok(Probe::Accepted(probed)) => probed,
            Ok(Probe::ZeroLength) => {
                self.stats.zero_length += 1;
                return Ok(());
            }
            Ok(Probe::NotLinked) => return Ok(()),
            Err(err) => {
                self.stats.unreadable += 1;
                if !self.cfg.quiet_unreadable {
                    self.reporter
                        .warn(format!("Could not read '{}': {err}", path.display()));
                }
                return Ok(());
            }
        };

        if self.cfg.verbose {
            self.reporter.info(format!(
                "Hardlinked ({} links) node={:08x} {:08x}: {}",
                probed.identity.link_count,
                (probed.identity.file_id >> 32) as u32,
                probed.identity.file_id as u32,
                path.display()
            ));
        }
        if self.cfg.print_sigs && !self.cfg.list_links {
            self.reporter.info(format!(
                "{} {:10} {}",
                probed.sig,
                probed.identity.size,
                path.display()
            ));
        }

        let record = FileRecord::new(
            path.to_path_buf(),
            probed.identity.size,
            probed.sig,
            probed.identity.file_id,
            probed.identity.link_count,
        );
        self.insert_or_compare(record)
    }

    /// Walk the record into its size bucket. On a signature match the
    /// comparator and policy run against the indexed candidate; either way
    /// the record is stored so later files can dedup against it.
    fn insert_or_compare(&mut self, record: FileRecord) -> Result<()> {
        let mut confirmed: Option<(RecordId, Relation)> = None;

        let attach = match self.index.root_of_size(record.size) {
            None => Attach::Root(record.size),
            Some(root) => {
                let mut cur = root;
                let mut chain_prev: Option<RecordId> = None;
                loop {
                    let node_sig = self.index.record(cur).sig;
                    match record.sig.cmp(&node_sig) {
                        Ordering::Equal => {
                            if confirmed.is_none() && !self.cfg.list_links {
                                if let Some(relation) = self.confirm_duplicate(&record, cur) {
                                    confirmed = Some((cur, relation));
                                }
                            }
                            match self.index.larger(cur) {
                                Some(next) => {
                                    chain_prev = Some(cur);
                                    cur = next;
                                }
                                None => break Attach::Larger(cur),
                            }
                        }
                        Ordering::Less => match chain_prev {
                            // Leaving an equals chain: splice in ahead of
                            // the first strictly-larger subtree so the
                            // chain stays contiguous.
                            Some(prev) => break Attach::Chain { prev, next: cur },
                            None => match self.index.smaller(cur) {
                                Some(next) => cur = next,
                                None => break Attach::Smaller(cur),
                            },
                        },
                        Ordering::Greater => {
                            chain_prev = None;
                            match self.index.larger(cur) {
                                Some(next) => cur = next,
                                None => break Attach::Larger(cur),
                            }
                        }
                    }
                }
            }
        };

        if let Some((survivor, relation)) = confirmed {
            self.resolve_duplicate(&record, survivor, relation)?;
        }

        let size = record.size;
        let id = self.index.store(record);
        match attach {
            Attach::Root(size) => self.index.install_root(size, id),
            Attach::Smaller(parent) => self.index.set_smaller(parent, Some(id)),
            Attach::Larger(parent) => self.index.set_larger(parent, Some(id)),
            Attach::Chain { prev, next } => {
                self.index.set_larger(prev, Some(id));
                self.index.set_larger(id, Some(next));
            }
        }

        if confirmed.is_none() {
            self.stats.total_files += 1;
            self.stats.total_bytes += size;
        }
        Ok(())
    }

    /// Decide whether `incoming` and an indexed record hold the same
    /// bytes. None means distinct content, an exhausted survivor, or a
    /// failed content read; the caller keeps walking the chain.
    fn confirm_duplicate(&mut self, incoming: &FileRecord, node: RecordId) -> Option<Relation> {
        let (node_size, node_file_id, node_links) = {
            let node = self.index.record(node);
            (node.size, node.file_id, node.link_count)
        };

        if incoming.size != node_size {
            return None;
        }
        if node_links > 0 && incoming.file_id == node_file_id {
            return Some(Relation::HardLinked);
        }
        if node_links >= MAX_LINK_COUNT {
            // The survivor cannot take more links; leave the incoming file
            // as its own record.
            return None;
        }

        match self.full_signature_pair(incoming, node) {
            Some((a, b)) if a == b => Some(Relation::ContentEqual),
            // Mismatch: the prefixes collided, or the files diverge past
            // the first 32 KiB.
            _ => None,
        }
    }

    /// Full-content signatures for both files, memoized per path. Each
    /// file is read at most once however many partners it is compared
    /// with. A read failure yields None and caches nothing from this
    /// comparison; a previously cached partner signature stays as it is.
    fn full_signature_pair(
        &mut self,
        incoming: &FileRecord,
        node: RecordId,
    ) -> Option<(Signature, Signature)> {
        let key_a = path_key(&incoming.path);
        let key_b = path_key(&self.index.record(node).path);
        let cached_a = self.index.full_sig(key_a);
        let cached_b = self.index.full_sig(key_b);

        let sig_a = match cached_a {
            Some(sig) => sig,
            None => match probe::full_signature(&incoming.path) {
                Ok(sig) => sig,
                Err(err) => {
                    self.warn_full_read(&incoming.path, &err);
                    return None;
                }
            },
        };
        let sig_b = match cached_b {
            Some(sig) => sig,
            None => {
                let path = self.index.record(node).path.clone();
                match probe::full_signature(&path) {
                    Ok(sig) => sig,
                    Err(err) => {
                        self.warn_full_read(&path, &err);
                        return None;
                    }
                }
            }
        };

        if cached_a.is_none() {
            self.index.memo_full_sig(key_a, sig_a);
        }
        if cached_b.is_none() {
            self.index.memo_full_sig(key_b, sig_b);
        }
        Some((sig_a, sig_b))
    }

    fn warn_full_read(&self, path: &Path, err: &io::Error) {
        if !self.cfg.quiet_unreadable {
            self.reporter.warn(format!(
                "Error doing full file read on '{}': {err}",
                path.display()
            ));
        }
    }

    /// The policy engine: apply the configured action to one confirmed
    /// duplicate.
    fn resolve_duplicate(
        &mut self,
        incoming: &FileRecord,
        survivor: RecordId,
        relation: Relation,
    ) -> Result<()> {
        self.stats.duplicate_files += 1;
        self.stats.duplicate_bytes += incoming.size;

        let hardlinked = relation == Relation::HardLinked;
        let survivor_path = self.index.record(survivor).path.clone();

        if self.cfg.print_duplicates && !(hardlinked && self.cfg.skip_linked) {
            self.reporter
                .info(format!("Duplicate: '{}'", survivor_path.display()));
            self.reporter
                .info(format!("With:      '{}'", incoming.path.display()));
            if hardlinked {
                self.reporter.info("    (hardlinked instances of same file)");
            }
        }

        // Reference files only ever serve as survivors.
        if self.is_reference(&incoming.path) {
            return Ok(());
        }

        // Fresh attributes; the probe snapshot may be stale by now.
        let facts =
            platform::stat_identity_path(&incoming.path).map_err(|source| FatalError::Stat {
                path: incoming.path.clone(),
                source,
            })?;

        // Read-only duplicates are left alone unless asked for. Scripted
        // deletes carry the force flag instead, and an already-linked pair
        // has nothing left to protect.
        if facts.readonly && !self.cfg.do_readonly && !hardlinked && self.batch.is_none() {
            self.reporter.info(format!(
                "Skipping duplicate readonly file '{}'",
                incoming.path.display()
            ));
            return Ok(());
        }

        if self.cfg.make_hard_links && hardlinked {
            // Already one physical file.
            return Ok(());
        }

        if self.batch.is_some() {
            return self.emit_script(incoming, survivor, &survivor_path, hardlinked, facts.readonly);
        }

        if self.cfg.destructive() {
            return self.eliminate(incoming, survivor, &survivor_path, &facts);
        }

        Ok(())
    }

    /// Policy outcome in script mode: emit the commands, touch nothing.
    fn emit_script(
        &mut self,
        incoming: &FileRecord,
        survivor: RecordId,
        survivor_path: &Path,
        hardlinked: bool,
        readonly: bool,
    ) -> Result<()> {
        let delete = self.cfg.delete_duplicates;
        let Some(batch) = self.batch.as_mut() else {
            return Ok(());
        };

        if delete || !hardlinked {
            batch.delete(&incoming.path, readonly)?;
        }
        if delete {
            batch.note_survivor(survivor_path)?;
        } else if !hardlinked {
            batch.hard_link(&incoming.path, survivor_path)?;
            if readonly {
                batch.restore_readonly(&incoming.path)?;
            }
            // The script will add a link; keep the in-memory ceiling honest.
            self.index.record_mut(survivor).link_count += 1;
        }
        Ok(())
    }

    /// Policy outcome in the destructive modes: delete the incoming file
    /// and, when hard-linking, point its name at the survivor.
    fn eliminate(
        &mut self,
        incoming: &FileRecord,
        survivor: RecordId,
        survivor_path: &Path,
        facts: &platform::FileIdentity,
    ) -> Result<()> {
        if facts.readonly {
            // Assume we own the file; if not, the delete will say so.
            let _ = platform::clear_readonly(&incoming.path, facts.mode);
        }

        let survivor_facts = if self.cfg.make_hard_links {
            Some(
                platform::stat_identity_path(survivor_path).map_err(|source| FatalError::Stat {
                    path: survivor_path.to_path_buf(),
                    source,
                })?,
            )
        } else {
            None
        };

        fs::remove_file(&incoming.path).map_err(|source| FatalError::Delete {
            path: incoming.path.clone(),
            source,
        })?;

        if let Some(survivor_facts) = survivor_facts {
            platform::create_hard_link(&incoming.path, survivor_path).map_err(|source| {
                FatalError::Link {
                    target: incoming.path.clone(),
                    survivor: survivor_path.to_path_buf(),
                    source,
                }
            })?;
            // The new name shares the survivor's inode; make sure its
            // attributes still read as the survivor's.
            let _ = platform::apply_mode(&incoming.path, survivor_facts.mode);
            let _ = platform::set_mtime(&incoming.path, survivor_facts.mtime);
            self.index.record_mut(survivor).link_count += 1;
            self.reporter.info("    Created hardlink");
        } else {
            self.reporter.info("    Deleted duplicate");
        }
        Ok(())
    }

    /// Wrap the run up: list mode walks the index for hard-link groups,
    /// the other modes close the batch script and print the summary.
    pub fn finish(mut self) -> Result<RunStats> {
        if self.cfg.list_links {
            self.reporter.clear();
            self.stats.hardlink_groups = groups::report(&self.index);
            println!();
            println!("Number of hardlink groups found: {}", self.stats.hardlink_groups);
            output::print_footnotes(&self.stats);
            return Ok(self.stats);
        }

        if let Some(batch) = self.batch.take() {
            batch.finish()?;
        }

        if self.stats.total_files == 0 && self.stats.duplicate_files == 0 {
            self.reporter.clear();
            anyhow::bail!("no files to process");
        }

        output::print_summary(&self.reporter, &self.stats);
        Ok(self.stats)
    }

    /// Number of records currently indexed.
    pub fn indexed_files(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Config {
        Config {
            show_progress: false,
            print_duplicates: false,
            ..Config::default()
        }
    }

    #[test]
    fn ignore_patterns_match_case_insensitively() {
        let cfg = Config {
            ignore_patterns: vec![".bak".into(), "cache".into()],
            ..quiet()
        };
        let engine = Engine::new(&cfg, None, Reporter::new(false));
        assert!(engine.is_ignored(Path::new("/data/Report.BAK")));
        assert!(engine.is_ignored(Path::new("/data/MyCache/file.txt")));
        assert!(!engine.is_ignored(Path::new("/data/report.txt")));
    }

    #[test]
    fn reference_matching_is_exact_parent_equality() {
        let cfg = quiet();
        let mut engine = Engine::new(&cfg, None, Reporter::new(false));
        engine.note_reference(Path::new("/refs/master/a.bin"));

        assert!(engine.is_reference(Path::new("/refs/master/b.bin")));
        assert!(!engine.is_reference(Path::new("/refs/master/sub/c.bin")));
        assert!(!engine.is_reference(Path::new("/refs/other/a.bin")));
    }
}
