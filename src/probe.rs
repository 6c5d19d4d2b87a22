//! Opening candidate files and computing their signatures.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;

use crate::checksum::{Hasher, Signature};
use crate::platform::{self, FileIdentity};

/// How much of a file the prefix signature covers.
pub const PREFIX_LEN: usize = 32 * 1024;

/// Chunk size for full-content hashing.
pub const FULL_CHUNK: usize = 64 * 1024;

/// A candidate accepted for indexing.
#[derive(Debug)]
pub struct Probed {
    pub identity: FileIdentity,
    pub sig: Signature,
}

#[derive(Debug)]
pub enum Probe {
    Accepted(Probed),
    ZeroLength,
    /// List mode only: a single-link file cannot belong to a group.
    NotLinked,
}

pub struct ProbeOptions {
    pub skip_zero_length: bool,
    pub list_links: bool,
}

/// Open a candidate, snapshot its identity and hash its first 32 KiB.
/// Any I/O failure comes back as the error; the handle is dropped on all
/// paths.
pub fn probe(path: &Path, opts: &ProbeOptions) -> io::Result<Probe> {
    let mut file = File::open(path)?;
    let identity = platform::stat_identity(&file)?;

    if identity.size == 0 && opts.skip_zero_length {
        return Ok(Probe::ZeroLength);
    }

    if opts.list_links {
        if identity.link_count == 1 {
            return Ok(Probe::NotLinked);
        }
        // Cluster by physical identity instead of content; no read needed.
        return Ok(Probe::Accepted(Probed {
            identity,
            sig: Signature::from_file_id(identity.file_id),
        }));
    }

    let want = identity.size.min(PREFIX_LEN as u64) as usize;
    let mut buf = vec![0u8; want];
    let mut total = 0;
    while total < want {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf[..total]);
    Ok(Probe::Accepted(Probed {
        identity,
        sig: hasher.finish().with_size(identity.size),
    }))
}

/// Stream a whole file through the hasher in 64 KiB chunks. Unlike the
/// prefix signature, the size is not folded in.
pub fn full_signature(path: &Path) -> io::Result<Signature> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; FULL_CHUNK];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::signature_of;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    fn default_opts() -> ProbeOptions {
        ProbeOptions {
            skip_zero_length: true,
            list_links: false,
        }
    }

    #[test]
    fn prefix_signature_covers_at_most_32k() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![0xabu8; PREFIX_LEN];
        data.extend_from_slice(b"tail beyond the prefix");
        let path = write_file(&dir, "big", &data);

        let Probe::Accepted(probed) = probe(&path, &default_opts()).unwrap() else {
            panic!("expected acceptance");
        };
        let expected = signature_of(&data[..PREFIX_LEN]).with_size(data.len() as u64);
        assert_eq!(probed.sig, expected);
        assert_eq!(probed.identity.size, data.len() as u64);
    }

    #[test]
    fn short_files_hash_their_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "small", b"just a few bytes");

        let Probe::Accepted(probed) = probe(&path, &default_opts()).unwrap() else {
            panic!("expected acceptance");
        };
        assert_eq!(probed.sig, signature_of(b"just a few bytes").with_size(16));
    }

    #[test]
    fn zero_length_is_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty", b"");
        assert!(matches!(
            probe(&path, &default_opts()).unwrap(),
            Probe::ZeroLength
        ));

        let keep = ProbeOptions {
            skip_zero_length: false,
            list_links: false,
        };
        assert!(matches!(probe(&path, &keep).unwrap(), Probe::Accepted(_)));
    }

    #[test]
    fn list_mode_skips_single_link_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "alone", b"content");
        let opts = ProbeOptions {
            skip_zero_length: true,
            list_links: true,
        };
        assert!(matches!(probe(&path, &opts).unwrap(), Probe::NotLinked));
    }

    #[test]
    fn list_mode_uses_the_file_id_as_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "linked", b"content");
        let link = dir.path().join("other");
        std::fs::hard_link(&path, &link).unwrap();

        let opts = ProbeOptions {
            skip_zero_length: true,
            list_links: true,
        };
        let Probe::Accepted(probed) = probe(&path, &opts).unwrap() else {
            panic!("expected acceptance");
        };
        assert_eq!(probed.sig, Signature::from_file_id(probed.identity.file_id));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe(&dir.path().join("nope"), &default_opts()).is_err());
    }

    #[test]
    fn full_signature_streams_everything() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(FULL_CHUNK * 2 + 17).collect();
        let path = write_file(&dir, "stream", &data);
        assert_eq!(full_signature(&path).unwrap(), signature_of(&data));
    }
}
