//! Deferred-action batch output.
//!
//! In script mode nothing touches the filesystem; every action becomes a
//! cmd.exe line the user replays later. The file is UTF-8 with a BOM so
//! non-ASCII names survive the `chcp 65001` round trip.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Writer for the offline action script.
pub struct BatchWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

/// Batch interpolation: literal percent signs must be doubled.
fn escape_percents(name: &str) -> String {
    name.replace('%', "%%")
}

impl BatchWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("unable to open batch file '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        out.write_all("\u{feff}".as_bytes())?;
        writeln!(out, "@echo off")?;
        writeln!(out, "REM Batch file for replacing duplicates with hard links")?;
        writeln!(out, "REM created by dupelink")?;
        writeln!(out, "chcp 65001")?;
        writeln!(out)?;
        Ok(BatchWriter {
            out,
            path: path.to_path_buf(),
        })
    }

    /// The script's own path; the scan must not swallow it.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn quoted(path: &Path) -> String {
        escape_percents(&path.display().to_string())
    }

    /// `del` line; `/F` forces deletion of read-only targets.
    pub fn delete(&mut self, target: &Path, force: bool) -> Result<()> {
        let force = if force { "/F " } else { "" };
        writeln!(self.out, "del {}\"{}\"", force, Self::quoted(target))?;
        Ok(())
    }

    pub fn hard_link(&mut self, target: &Path, survivor: &Path) -> Result<()> {
        writeln!(
            self.out,
            "fsutil hardlink create \"{}\" \"{}\"",
            Self::quoted(target),
            Self::quoted(survivor)
        )?;
        Ok(())
    }

    pub fn restore_readonly(&mut self, target: &Path) -> Result<()> {
        writeln!(self.out, "attrib +r \"{}\"", Self::quoted(target))?;
        Ok(())
    }

    /// Informational comment naming the survivor of a deletion.
    pub fn note_survivor(&mut self, survivor: &Path) -> Result<()> {
        writeln!(self.out, "rem duplicate of \"{}\"", Self::quoted(survivor))?;
        Ok(())
    }

    /// Flush and close; runs before the summary prints.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush().context("flushing batch file")?;
        Ok(())
    }
}
