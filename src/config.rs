//! Run configuration, assembled once by the CLI layer and passed to the
//! engine by reference. There are no process globals.

/// What to do with what we find. The default is a dry report: print
/// duplicate pairs, touch nothing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Report each confirmed duplicate pair.
    pub print_duplicates: bool,
    /// Print the 32 KiB prefix signature of every probed file.
    pub print_sigs: bool,
    /// Per-file identity lines (link count and file index).
    pub verbose: bool,
    /// Replace duplicates with hard links to the survivor.
    pub make_hard_links: bool,
    /// Delete duplicates outright.
    pub delete_duplicates: bool,
    /// Apply destructive actions to read-only files too.
    pub do_readonly: bool,
    /// Skip zero-length files (on by default; they are all "identical").
    pub skip_zero_length: bool,
    /// Suppress warnings about unreadable files.
    pub quiet_unreadable: bool,
    /// Omit already-hard-linked duplicates from the report.
    pub skip_linked: bool,
    pub show_progress: bool,
    /// Follow reparse points and symlinked directories while expanding.
    pub follow_reparse: bool,
    /// Enumerate existing hard-link groups instead of detecting duplicates.
    pub list_links: bool,
    /// Case-insensitive substrings of paths to leave alone, stored
    /// lowercase.
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            print_duplicates: true,
            print_sigs: false,
            verbose: false,
            make_hard_links: false,
            delete_duplicates: false,
            do_readonly: false,
            skip_zero_length: true,
            quiet_unreadable: false,
            skip_linked: false,
            show_progress: true,
            follow_reparse: false,
            list_links: false,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// True when the run may modify the filesystem.
    pub fn destructive(&self) -> bool {
        self.make_hard_links || self.delete_duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_a_dry_report() {
        let cfg = Config::default();
        assert!(cfg.print_duplicates);
        assert!(cfg.skip_zero_length);
        assert!(!cfg.destructive());
        assert!(!cfg.list_links);
    }

    #[test]
    fn destructive_modes() {
        let cfg = Config {
            make_hard_links: true,
            ..Config::default()
        };
        assert!(cfg.destructive());
        let cfg = Config {
            delete_duplicates: true,
            ..Config::default()
        };
        assert!(cfg.destructive());
    }
}
