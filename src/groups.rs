//! Enumeration of the hard-link groups collected in list mode.
//!
//! In list mode every indexed record's signature is its volume file id, so
//! records naming the same physical file sit on one equals chain. The walk
//! visits each size bucket in order and prints every chain as a group; a
//! chain of one still prints, because the file's other links may simply be
//! outside the scanned set.

use crate::index::{CandidateIndex, RecordId};

/// Walk every size bucket and print the groups. Returns how many groups
/// were found.
pub fn report(index: &CandidateIndex) -> u64 {
    let mut groups = 0;
    for root in index.size_roots() {
        groups += walk_bucket(index, root);
    }
    groups
}

fn walk_bucket(index: &CandidateIndex, root: RecordId) -> u64 {
    let mut groups = 0;
    let mut chain: Vec<RecordId> = Vec::new();

    // In-order traversal with an explicit stack; chains hang off `larger`,
    // so their members come out consecutively.
    let mut stack: Vec<RecordId> = Vec::new();
    let mut cur = Some(root);
    loop {
        while let Some(id) = cur {
            stack.push(id);
            cur = index.smaller(id);
        }
        let Some(id) = stack.pop() else { break };

        if let Some(&head) = chain.first() {
            if index.record(head).sig != index.record(id).sig {
                emit(index, &chain);
                groups += 1;
                chain.clear();
            }
        }
        chain.push(id);

        cur = index.larger(id);
    }
    if !chain.is_empty() {
        emit(index, &chain);
        groups += 1;
    }
    groups
}

fn emit(index: &CandidateIndex, chain: &[RecordId]) {
    let head = index.record(chain[0]);
    println!(
        "\nHardlink group, {} of {} hardlinked instances found in search tree:",
        chain.len(),
        head.link_count
    );
    for &id in chain {
        println!("  \"{}\"", index.record(id).path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Signature;
    use crate::index::FileRecord;
    use std::path::PathBuf;

    fn record(name: &str, file_id: u64, links: u32) -> FileRecord {
        FileRecord::new(
            PathBuf::from(name),
            100,
            Signature::from_file_id(file_id),
            file_id,
            links,
        )
    }

    // Buckets here are built by hand, the way list mode builds them: the
    // id doubles as the signature and equal ids chain along `larger`.
    #[test]
    fn one_chain_is_one_group() {
        let mut index = CandidateIndex::new();
        let a = index.store(record("/d/a", 7, 3));
        let b = index.store(record("/d/b", 7, 3));
        let c = index.store(record("/d/c", 7, 3));
        index.install_root(100, a);
        index.set_larger(a, Some(b));
        index.set_larger(b, Some(c));

        assert_eq!(report(&index), 1);
    }

    #[test]
    fn distinct_ids_split_into_groups() {
        let mut index = CandidateIndex::new();
        let a = index.store(record("/d/a", 20, 2));
        let b = index.store(record("/d/b", 20, 2));
        let lone = index.store(record("/d/lone", 5, 4));
        index.install_root(100, a);
        index.set_larger(a, Some(b));
        index.set_smaller(a, Some(lone));

        // The pair and the partly-scanned singleton each count.
        assert_eq!(report(&index), 2);
    }

    #[test]
    fn buckets_are_walked_independently() {
        let mut index = CandidateIndex::new();
        let a = index.store(record("/d/a", 9, 2));
        let b = index.store(FileRecord::new(
            PathBuf::from("/d/b"),
            200,
            Signature::from_file_id(9),
            9,
            2,
        ));
        index.install_root(100, a);
        index.install_root(200, b);

        assert_eq!(report(&index), 2);
    }
}
