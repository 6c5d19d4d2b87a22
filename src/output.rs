//! Console reporting: the progress line, warnings and the end-of-run
//! summary.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::RunStats;

/// Owns the optional progress line and keeps ordinary output from tearing
/// it. All engine chatter funnels through here.
pub struct Reporter {
    progress: Option<ProgressBar>,
}

impl Reporter {
    pub fn new(show_progress: bool) -> Self {
        let progress = show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{wide_msg}").unwrap());
            pb.enable_steady_tick(Duration::from_millis(200));
            pb
        });
        Reporter { progress }
    }

    /// Update the progress line; redraw throttling is indicatif's job.
    pub fn scanned(&self, count: u64, path: &Path) {
        if let Some(pb) = &self.progress {
            pb.set_message(format!("Scanned {count:4} files: {}", path.display()));
        }
    }

    /// Print a line without tearing the progress indicator.
    pub fn info(&self, line: impl AsRef<str>) {
        match &self.progress {
            Some(pb) => pb.suspend(|| println!("{}", line.as_ref())),
            None => println!("{}", line.as_ref()),
        }
    }

    pub fn warn(&self, line: impl AsRef<str>) {
        match &self.progress {
            Some(pb) => pb.suspend(|| eprintln!("{}", line.as_ref().yellow())),
            None => eprintln!("{}", line.as_ref().yellow()),
        }
    }

    /// Drop the progress line for good, before final output.
    pub fn clear(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }
}

/// kBytes with a floor of one for nonzero byte counts, so tiny runs do
/// not report zero.
fn kbytes(bytes: u64) -> u64 {
    if bytes > 0 && bytes < 1024 {
        1
    } else {
        bytes / 1024
    }
}

pub fn print_summary(reporter: &Reporter, stats: &RunStats) {
    reporter.clear();
    println!();
    println!(
        "Files: {:>8} kBytes in {:>5} files",
        kbytes(stats.total_bytes),
        stats.total_files
    );
    println!(
        "Dupes: {:>8} kBytes in {:>5} files",
        kbytes(stats.duplicate_bytes),
        stats.duplicate_files
    );
    print_footnotes(stats);
}

/// Skip counters, shown in every mode.
pub fn print_footnotes(stats: &RunStats) {
    if stats.zero_length > 0 {
        println!("  {} files of zero length were skipped", stats.zero_length);
    }
    if stats.ignored > 0 {
        println!("  {} files were ignored", stats.ignored);
    }
    if stats.unreadable > 0 {
        println!("  {} files could not be opened", stats.unreadable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kbytes_floors_small_nonzero_counts() {
        assert_eq!(kbytes(0), 0);
        assert_eq!(kbytes(1), 1);
        assert_eq!(kbytes(1023), 1);
        assert_eq!(kbytes(1024), 1);
        assert_eq!(kbytes(10 * 1024), 10);
    }

    #[test]
    fn silent_reporter_has_no_progress_state() {
        let reporter = Reporter::new(false);
        assert!(reporter.progress.is_none());
        // These must not panic without a progress bar.
        reporter.scanned(1, Path::new("/tmp/x"));
        reporter.clear();
    }
}
