//! Command-line surface and the run driver.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::config::Config;
use crate::engine::Engine;
use crate::glob;
use crate::output::Reporter;
use crate::platform;
use crate::script::BatchWriter;

#[derive(Parser, Debug)]
#[command(name = "dupelink")]
#[command(version)]
#[command(about = "Find duplicate files and hard link, delete, or script them away")]
#[command(
    long_about = "Scans the given file patterns for byte-identical duplicates \
    and reports, hard-links, or deletes them, or writes a batch script that \
    does it later. A separate list mode enumerates existing hard-link groups.\n\n\
    Pattern examples:\n  \
    c:\\**          every file on drive C\n  \
    c:\\**\\*.jpg    every .jpg on drive C\n  \
    **\\foo\\**      any path with component foo, from the current directory down"
)]
pub struct Cli {
    /// Write a batch file with the commands instead of acting; run it afterwards
    #[arg(long, value_name = "FILE")]
    pub bat: Option<PathBuf>,

    /// Replace duplicates with hard links (hard-link-capable volumes only; use with caution)
    #[arg(long)]
    pub hardlink: bool,

    /// Delete duplicate files
    #[arg(long)]
    pub del: bool,

    /// Verbose output (implies --sigs)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Show the signature calculated from the first 32k of each file
    #[arg(long)]
    pub sigs: bool,

    /// Apply to readonly files also (as opposed to skipping them)
    #[arg(long)]
    pub rdonly: bool,

    /// Do not skip zero-length files (they are skipped by default)
    #[arg(short = 'z', long = "zero")]
    pub zero: bool,

    /// Do not print a warning for files that cannot be read
    #[arg(short = 'u', long = "no-warn")]
    pub no_warn: bool,

    /// Skip linked duplicates in the report and show only unlinked ones
    #[arg(long = "sl", alias = "skip-linked")]
    pub skip_linked: bool,

    /// Hide the progress indicator (useful when redirecting to a file)
    #[arg(short = 'p', long = "no-progress")]
    pub no_progress: bool,

    /// Follow junctions and reparse points (off by default)
    #[arg(short = 'j', long = "junctions")]
    pub follow_reparse: bool,

    /// Hardlink list mode: enumerate groups of hard-linked files
    #[arg(long, conflicts_with_all = ["bat", "hardlink", "del", "rdonly"])]
    pub listlink: bool,

    /// Ignore paths containing this substring, eg. .bak or .tmp (repeatable)
    #[arg(long = "ign", value_name = "SUBSTR")]
    pub ignore: Vec<String>,

    /// Reference pattern: its files are only checked against, never eliminated (repeatable)
    #[arg(long = "ref", value_name = "PATTERN")]
    pub reference: Vec<String>,

    /// File patterns to scan
    #[arg(value_name = "PATTERN", required_unless_present = "reference")]
    pub patterns: Vec<String>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let cfg = self.to_config();

        if self.hardlink || self.bat.is_some() {
            self.check_volumes()?;
        }

        let batch = match &self.bat {
            Some(path) => Some(BatchWriter::create(path)?),
            None => None,
        };

        let reporter = Reporter::new(cfg.show_progress);
        let mut engine = Engine::new(&cfg, batch, reporter);

        // Reference patterns first: their files become the earlier-seen
        // records, which makes them the survivors.
        for pattern in &self.reference {
            scan_pattern(&mut engine, pattern, cfg.follow_reparse, true)?;
        }
        for pattern in &self.patterns {
            scan_pattern(&mut engine, pattern, cfg.follow_reparse, false)?;
        }

        engine.finish()?;
        Ok(())
    }

    fn to_config(&self) -> Config {
        Config {
            print_duplicates: !self.sigs || self.verbose,
            print_sigs: self.sigs || self.verbose,
            verbose: self.verbose,
            make_hard_links: self.hardlink,
            delete_duplicates: self.del,
            do_readonly: self.rdonly,
            skip_zero_length: !self.zero,
            quiet_unreadable: self.no_warn && !self.verbose,
            skip_linked: self.skip_linked,
            show_progress: !self.no_progress,
            follow_reparse: self.follow_reparse,
            list_links: self.listlink,
            ignore_patterns: self.ignore.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Modifying modes only work within one hard-link-capable local
    /// volume; refuse up front rather than fail mid-run.
    fn check_volumes(&self) -> Result<()> {
        let mut first_volume = None;
        for pattern in self.reference.iter().chain(&self.patterns) {
            let root = glob::scan_root(pattern)?;
            if platform::is_network_share(&root) {
                bail!("cannot make hardlinks on network shares");
            }
            match platform::volume_supports_hard_links(&root) {
                Ok(true) => {}
                Ok(false) => bail!("the volume of '{pattern}' does not support hard links"),
                // A root that does not exist yet fails at scan time with a
                // clearer message.
                Err(_) => {}
            }
            if self.hardlink {
                if let Ok(volume) = platform::volume_of(&root) {
                    match first_volume {
                        None => first_volume = Some(volume),
                        Some(seen) if seen != volume => {
                            bail!("hardlinking across different drives is not possible")
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}

fn scan_pattern(
    engine: &mut Engine<'_>,
    pattern: &str,
    follow_reparse: bool,
    reference: bool,
) -> Result<()> {
    let matched = glob::expand(pattern, follow_reparse, |path| {
        engine.observe(path, reference)
    })?;
    if matched == 0 {
        engine.reporter().warn(format!("No files matched '{pattern}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn listlink_conflicts_with_destructive_flags() {
        let err = Cli::try_parse_from(["dupelink", "--listlink", "--hardlink", "d"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        let err = Cli::try_parse_from(["dupelink", "--listlink", "--del", "d"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn at_least_one_pattern_is_required() {
        assert!(Cli::try_parse_from(["dupelink", "--hardlink"]).is_err());
        // A reference pattern alone satisfies the requirement.
        assert!(Cli::try_parse_from(["dupelink", "--ref", "refs"]).is_ok());
    }

    #[test]
    fn verbose_implies_signature_printing() {
        let cli = Cli::try_parse_from(["dupelink", "-v", "d"]).unwrap();
        let cfg = cli.to_config();
        assert!(cfg.print_sigs);
        assert!(cfg.print_duplicates);
        assert!(!cfg.quiet_unreadable);
    }

    #[test]
    fn sigs_alone_disables_the_duplicate_report() {
        let cli = Cli::try_parse_from(["dupelink", "--sigs", "d"]).unwrap();
        let cfg = cli.to_config();
        assert!(cfg.print_sigs);
        assert!(!cfg.print_duplicates);
    }

    #[test]
    fn ignore_patterns_are_lowercased() {
        let cli = Cli::try_parse_from(["dupelink", "--ign", ".BAK", "--ign", "Tmp", "d"]).unwrap();
        assert_eq!(cli.to_config().ignore_patterns, vec![".bak", "tmp"]);
    }

    #[test]
    fn zero_flag_keeps_zero_length_files() {
        let cli = Cli::try_parse_from(["dupelink", "-z", "d"]).unwrap();
        assert!(!cli.to_config().skip_zero_length);
        let cli = Cli::try_parse_from(["dupelink", "d"]).unwrap();
        assert!(cli.to_config().skip_zero_length);
    }
}
