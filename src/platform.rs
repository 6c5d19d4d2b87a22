//! Platform file identity and attribute operations.
//!
//! Everything the engine needs to know about physical files goes through
//! here: identity snapshots (the volume file id that makes two hard-linked
//! paths compare equal), hard-link creation, the read-only bit, and volume
//! capability answers. Unix supplies inode and device semantics, Windows
//! the NTFS file index.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;

/// Snapshot of the identity facts about one file.
#[derive(Debug, Clone, Copy)]
pub struct FileIdentity {
    /// Equal for two paths iff they name the same physical file on the
    /// same volume.
    pub file_id: u64,
    pub link_count: u32,
    pub size: u64,
    /// Platform mode word: `st_mode` on Unix, attribute flags on Windows.
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    pub readonly: bool,
}

/// Make `new_path` another name for `existing`.
pub fn create_hard_link(new_path: &Path, existing: &Path) -> io::Result<()> {
    fs::hard_link(existing, new_path)
}

/// Set a file's modification time.
pub fn set_mtime(path: &Path, mtime: i64) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0))
}

pub use imp::*;

#[cfg(unix)]
mod imp {
    use super::FileIdentity;
    use std::fs::{self, File};
    use std::io;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::Path;

    fn identity_from(md: &fs::Metadata) -> FileIdentity {
        FileIdentity {
            file_id: md.ino(),
            link_count: md.nlink() as u32,
            size: md.len(),
            mode: md.mode(),
            mtime: md.mtime(),
            readonly: md.mode() & 0o200 == 0,
        }
    }

    /// Identity of an already-open file; no path re-resolution involved.
    pub fn stat_identity(file: &File) -> io::Result<FileIdentity> {
        Ok(identity_from(&file.metadata()?))
    }

    pub fn stat_identity_path(path: &Path) -> io::Result<FileIdentity> {
        Ok(identity_from(&fs::metadata(path)?))
    }

    /// Grant the owner write permission so the file can be deleted.
    pub fn clear_readonly(path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode((mode | 0o200) & 0o7777))
    }

    /// Re-apply a mode captured earlier.
    pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
    }

    /// Discriminates volumes for the cross-device link check.
    pub fn volume_of(path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.dev())
    }

    pub fn is_network_share(_path: &Path) -> bool {
        false
    }

    /// Local Unix filesystems support hard links; there is no
    /// side-effect-free capability query to ask.
    pub fn volume_supports_hard_links(_path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

#[cfg(windows)]
mod imp {
    use super::FileIdentity;
    use std::fs::{self, File};
    use std::io;
    use std::os::windows::io::AsRawHandle;
    use std::path::{Component, Path, Prefix};

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        GetFileInformationByHandle, GetVolumeInformationW, BY_HANDLE_FILE_INFORMATION,
        FILE_ATTRIBUTE_READONLY, FILE_SUPPORTS_HARD_LINKS,
    };

    // Seconds between the Windows (1601) and Unix (1970) epochs.
    const EPOCH_DELTA_SECS: u64 = 11_644_473_600;

    /// Identity of an already-open file, via its NTFS file index.
    pub fn stat_identity(file: &File) -> io::Result<FileIdentity> {
        let mut info = BY_HANDLE_FILE_INFORMATION::default();
        unsafe { GetFileInformationByHandle(HANDLE(file.as_raw_handle() as _), &mut info) }
            .map_err(io::Error::other)?;
        let write_ticks =
            (info.ftLastWriteTime.dwHighDateTime as u64) << 32 | info.ftLastWriteTime.dwLowDateTime as u64;
        Ok(FileIdentity {
            file_id: (info.nFileIndexHigh as u64) << 32 | info.nFileIndexLow as u64,
            link_count: info.nNumberOfLinks,
            size: (info.nFileSizeHigh as u64) << 32 | info.nFileSizeLow as u64,
            mode: info.dwFileAttributes,
            mtime: (write_ticks / 10_000_000) as i64 - EPOCH_DELTA_SECS as i64,
            readonly: info.dwFileAttributes & FILE_ATTRIBUTE_READONLY.0 != 0,
        })
    }

    pub fn stat_identity_path(path: &Path) -> io::Result<FileIdentity> {
        stat_identity(&File::open(path)?)
    }

    pub fn clear_readonly(path: &Path, _mode: u32) -> io::Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(false);
        fs::set_permissions(path, perms)
    }

    pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(mode & FILE_ATTRIBUTE_READONLY.0 != 0);
        fs::set_permissions(path, perms)
    }

    /// Drive letter as the volume discriminant, matching the rule that
    /// hard links never span drives.
    pub fn volume_of(path: &Path) -> io::Result<u64> {
        match drive_letter(path) {
            Some(letter) => Ok(letter.to_ascii_lowercase() as u64),
            None => Ok(0),
        }
    }

    pub fn is_network_share(path: &Path) -> bool {
        matches!(
            path.components().next(),
            Some(Component::Prefix(p))
                if matches!(p.kind(), Prefix::UNC(..) | Prefix::VerbatimUNC(..))
        )
    }

    pub fn volume_supports_hard_links(path: &Path) -> io::Result<bool> {
        let Some(letter) = drive_letter(path) else {
            return Ok(true);
        };
        let root: Vec<u16> = format!("{}:\\", letter as char)
            .encode_utf16()
            .chain(Some(0))
            .collect();
        let mut flags = 0u32;
        unsafe {
            GetVolumeInformationW(
                PCWSTR(root.as_ptr()),
                None,
                None,
                None,
                Some(&mut flags),
                None,
            )
        }
        .map_err(io::Error::other)?;
        Ok(flags & FILE_SUPPORTS_HARD_LINKS != 0)
    }

    fn drive_letter(path: &Path) -> Option<u8> {
        match path.components().next() {
            Some(Component::Prefix(p)) => match p.kind() {
                Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => Some(letter),
                _ => None,
            },
            _ => None,
        }
    }
}
