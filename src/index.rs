//! The candidate index: a record arena, per-size search trees, the
//! seen-path set and the full-signature memo.
//!
//! Records live in one growing arena and refer to each other by 32-bit
//! index, so a size bucket's tree is plain integers instead of a web of
//! allocations. Within a bucket the tree is ordered by prefix signature;
//! records with equal signatures form a contiguous chain along `larger`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::checksum::{Hasher, Signature};

/// Per-file ceiling on hard links for NTFS-like volumes.
pub const MAX_LINK_COUNT: u32 = 1023;

/// The arena grows in bulk so multi-million-file scans do not pay
/// repeated doubling moves.
const RECORD_CHUNK: usize = 100_000;

pub type RecordId = u32;

/// One accepted path.
#[derive(Debug)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub sig: Signature,
    /// Equal across hard-linked paths on one volume, distinct otherwise.
    pub file_id: u64,
    /// Snapshot at probe time, bumped in memory when we link onto it.
    pub link_count: u32,
    pub(crate) larger: Option<RecordId>,
    pub(crate) smaller: Option<RecordId>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, sig: Signature, file_id: u64, link_count: u32) -> Self {
        FileRecord {
            path,
            size,
            sig,
            file_id,
            link_count,
            larger: None,
            smaller: None,
        }
    }
}

/// Hash of a path's raw byte representation; keys the seen-path set and
/// the full-signature memo.
pub fn path_key(path: &Path) -> u64 {
    let mut hasher = Hasher::new();
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        hasher.update(path.as_os_str().as_bytes());
    }
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        for unit in path.as_os_str().encode_wide() {
            hasher.update(&unit.to_le_bytes());
        }
    }
    hasher.finish().as_u64()
}

#[derive(Default)]
pub struct CandidateIndex {
    records: Vec<FileRecord>,
    by_size: BTreeMap<u64, RecordId>,
    seen: HashSet<u64>,
    full_sigs: HashMap<u64, Signature>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: RecordId) -> &FileRecord {
        &self.records[id as usize]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut FileRecord {
        &mut self.records[id as usize]
    }

    /// Register a path as seen. False when it was already known, in which
    /// case the caller drops it.
    pub fn mark_seen(&mut self, key: u64) -> bool {
        self.seen.insert(key)
    }

    pub fn root_of_size(&self, size: u64) -> Option<RecordId> {
        self.by_size.get(&size).copied()
    }

    /// Append a record to the arena without linking it into any tree.
    pub fn store(&mut self, record: FileRecord) -> RecordId {
        if self.records.len() == self.records.capacity() {
            self.records.reserve(RECORD_CHUNK);
        }
        let id = self.records.len() as RecordId;
        self.records.push(record);
        id
    }

    pub fn install_root(&mut self, size: u64, id: RecordId) {
        self.by_size.insert(size, id);
    }

    pub fn larger(&self, id: RecordId) -> Option<RecordId> {
        self.records[id as usize].larger
    }

    pub fn smaller(&self, id: RecordId) -> Option<RecordId> {
        self.records[id as usize].smaller
    }

    pub fn set_larger(&mut self, id: RecordId, child: Option<RecordId>) {
        self.records[id as usize].larger = child;
    }

    pub fn set_smaller(&mut self, id: RecordId, child: Option<RecordId>) {
        self.records[id as usize].smaller = child;
    }

    pub fn full_sig(&self, key: u64) -> Option<Signature> {
        self.full_sigs.get(&key).copied()
    }

    /// Memoized full signatures are write-once; a later value for the same
    /// key is dropped.
    pub fn memo_full_sig(&mut self, key: u64, sig: Signature) {
        self.full_sigs.entry(key).or_insert(sig);
    }

    /// Bucket roots in ascending size order, for the group walk.
    pub fn size_roots(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.by_size.values().copied()
    }
}
