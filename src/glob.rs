//! Wildcard expansion with recursive `**` directories.
//!
//! `*` and `?` match within one path component; a `**` component matches
//! any depth, so `c:\**\*.jpg` finds every .jpg on the drive. A pattern
//! without wildcards names a file, or a directory whose whole tree is
//! scanned. Matching is case-insensitive on Windows.
//!
//! Delivery order is deterministic: each directory's entries are visited
//! in file-name order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

/// Expand `pattern`, invoking `on_path` once per matching file. Returns
/// how many paths were delivered so the caller can warn about dead
/// patterns.
pub fn expand<F>(pattern: &str, follow_reparse: bool, mut on_path: F) -> Result<usize>
where
    F: FnMut(&Path) -> Result<()>,
{
    let normalized = normalize(pattern);
    let absolute = std::path::absolute(Path::new(&normalized))
        .with_context(|| format!("cannot resolve pattern '{pattern}'"))?;

    if !has_wildcards(&normalized) {
        // Plain path: a directory means its whole tree, a file itself.
        let Ok(meta) = fs::metadata(&absolute) else {
            return Ok(0);
        };
        if meta.is_dir() {
            return walk(&absolute, None, follow_reparse, &mut on_path);
        }
        on_path(&absolute)?;
        return Ok(1);
    }

    let matcher = GlobBuilder::new(&absolute.to_string_lossy())
        .literal_separator(true)
        .case_insensitive(cfg!(windows))
        .build()
        .with_context(|| format!("bad pattern '{pattern}'"))?
        .compile_matcher();
    walk(&literal_base(&absolute), Some(&matcher), follow_reparse, &mut on_path)
}

/// Directory where a pattern's expansion starts: its longest wildcard-free
/// prefix. Used for pre-scan volume checks too.
pub fn scan_root(pattern: &str) -> Result<PathBuf> {
    let normalized = normalize(pattern);
    let absolute = std::path::absolute(Path::new(&normalized))
        .with_context(|| format!("cannot resolve pattern '{pattern}'"))?;
    if has_wildcards(&normalized) {
        Ok(literal_base(&absolute))
    } else {
        Ok(absolute)
    }
}

fn walk<F>(
    base: &Path,
    matcher: Option<&GlobMatcher>,
    follow: bool,
    on_path: &mut F,
) -> Result<usize>
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut matched = 0;
    for entry in WalkDir::new(base)
        .follow_links(follow)
        .sort_by_file_name()
    {
        // Unreadable directories are not fatal during expansion; files the
        // probe cannot open are counted later.
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.map_or(true, |m| m.is_match(entry.path())) {
            on_path(entry.path())?;
            matched += 1;
        }
    }
    Ok(matched)
}

fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

fn literal_base(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        if component.as_os_str().to_string_lossy().contains(['*', '?']) {
            break;
        }
        base.push(component);
    }
    base
}

fn normalize(pattern: &str) -> String {
    #[cfg(windows)]
    let mut normalized = pattern.replace('/', "\\");
    #[cfg(not(windows))]
    let mut normalized = pattern.to_string();

    // Trailing separators confuse nothing downstream but the root itself.
    while normalized.len() > 1
        && normalized.ends_with(std::path::MAIN_SEPARATOR)
        && !normalized.ends_with(":\\")
    {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(path: &Path, data: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(data).unwrap();
    }

    fn collect(pattern: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        expand(pattern, false, |p| {
            paths.push(p.to_path_buf());
            Ok(())
        })
        .unwrap();
        paths
    }

    #[test]
    fn directory_pattern_scans_the_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"a");
        touch(&dir.path().join("sub/b.txt"), b"b");
        touch(&dir.path().join("sub/deep/c.log"), b"c");

        let paths = collect(dir.path().to_str().unwrap());
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn plain_file_pattern_yields_just_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.txt");
        touch(&file, b"x");
        touch(&dir.path().join("other.txt"), b"y");

        let paths = collect(file.to_str().unwrap());
        assert_eq!(paths, vec![file]);
    }

    #[test]
    fn star_matches_within_one_component() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"a");
        touch(&dir.path().join("b.log"), b"b");
        touch(&dir.path().join("sub/c.txt"), b"c");

        let pattern = dir.path().join("*.txt");
        let paths = collect(pattern.to_str().unwrap());
        assert_eq!(paths, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn double_star_matches_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.txt"), b"t");
        touch(&dir.path().join("one/mid.txt"), b"m");
        touch(&dir.path().join("one/two/deep.txt"), b"d");
        touch(&dir.path().join("one/two/deep.log"), b"l");

        let pattern = dir.path().join("**").join("*.txt");
        let paths = collect(pattern.to_str().unwrap());
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn question_mark_matches_one_character() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("f1.dat"), b"1");
        touch(&dir.path().join("f22.dat"), b"2");

        let pattern = dir.path().join("f?.dat");
        let paths = collect(pattern.to_str().unwrap());
        assert_eq!(paths, vec![dir.path().join("f1.dat")]);
    }

    #[test]
    fn delivery_is_name_sorted_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("c"), b"c");
        touch(&dir.path().join("a"), b"a");
        touch(&dir.path().join("b"), b"b");

        let paths = collect(dir.path().to_str().unwrap());
        assert_eq!(
            paths,
            vec![
                dir.path().join("a"),
                dir.path().join("b"),
                dir.path().join("c")
            ]
        );
    }

    #[test]
    fn missing_plain_path_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("absent");
        let mut calls = 0;
        let count = expand(pattern.to_str().unwrap(), false, |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn scan_root_stops_at_the_first_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("sub").join("*.txt");
        let root = scan_root(pattern.to_str().unwrap()).unwrap();
        assert_eq!(root, dir.path().join("sub"));
    }
}
