//! Test discovery and the index-based selection syntax.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

/// Every sub-directory of `test_dir`, sorted by name and made canonical.
pub fn discover_tests(test_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(test_dir)
        .with_context(|| format!("Failed to read test directory {}", test_dir.display()))?;

    let mut tests = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", test_dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            let path = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            tests.push(path);
        }
    }
    tests.sort();
    Ok(tests)
}

/// Display name of a test directory.
pub fn test_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse `a:b` into the inclusive range it names.
fn parse_range(item: &str) -> Option<RangeInclusive<usize>> {
    let (begin, end) = item.split_once(':')?;
    let begin = begin.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    Some(begin..=end)
}

/// Restrict `range` to the indices of `count` tests.
fn clamp_range(item: &str, range: RangeInclusive<usize>, count: usize) -> RangeInclusive<usize> {
    let (begin, end) = range.into_inner();
    let last = match count.checked_sub(1) {
        Some(last) if begin <= last => last,
        _ => {
            warn!(item, count, "Test selection out of range; skipping");
            return RangeInclusive::new(1, 0);
        }
    };
    if end > last {
        warn!(item, last, "Test selection range exceeds the available tests; clamping");
    }
    begin..=end.min(last)
}

/// Indices named by `selection` among `count` tests.
///
/// `all` selects everything; otherwise a comma-separated list of indices and
/// inclusive `a:b` ranges. Invalid or out-of-range items are logged and
/// skipped; repeated indices are kept once, in first-mention order.
pub fn parse_selection(selection: &str, count: usize) -> Vec<usize> {
    if selection.trim() == "all" {
        return (0..count).collect();
    }

    let mut picked = Vec::new();
    for item in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let indices: Vec<usize> = if item.contains(':') {
            match parse_range(item) {
                Some(range) => clamp_range(item, range, count).collect(),
                None => {
                    warn!(item, "Invalid range selection; skipping");
                    continue;
                }
            }
        } else {
            match item.parse() {
                Ok(i) => vec![i],
                Err(_) => {
                    warn!(item, "Invalid test selection; skipping");
                    continue;
                }
            }
        };

        for i in indices {
            if i >= count {
                warn!(index = i, count, "Test selection out of range; skipping");
                continue;
            }
            if !picked.contains(&i) {
                picked.push(i);
            }
        }
    }
    picked
}

/// The tests named by `selection`.
pub fn select(tests: &[PathBuf], selection: &str) -> Vec<PathBuf> {
    parse_selection(selection, tests.len())
        .into_iter()
        .map(|i| tests[i].clone())
        .collect()
}
