//! Sandbox layout and data-file path resolution.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::descriptor::{IntList, IntListItem};
use crate::error::{PathError, PathResult};

/// Name of the per-test output sandbox.
pub const OUTPUT_DIR: &str = "output";

/// Sandbox directory of the test at `test_dir`.
pub fn output_dir(test_dir: &Path) -> PathBuf {
    test_dir.join(OUTPUT_DIR)
}

/// Substitute `value` into the single printf-style integer specifier of
/// `template` (`%d`, `%5d` or `%05d`). Templates without `%` are returned
/// unchanged.
pub fn format_int(template: &str, value: i64) -> PathResult<String> {
    let Some(start) = template.find('%') else {
        return Ok(template.to_string());
    };
    let bad = || PathError::BadSpecifier(template.to_string());

    let rest = &template[start + 1..];
    let end = rest.find('d').ok_or_else(bad)?;
    let spec = &rest[..end];
    if !spec.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }

    let width: usize = if spec.is_empty() {
        0
    } else {
        spec.parse().map_err(|_| bad())?
    };
    let number = if spec.starts_with('0') {
        format!("{value:0width$}")
    } else {
        format!("{value:width$}")
    };
    Ok(format!("{}{}{}", &template[..start], number, &rest[end + 1..]))
}

/// Resolve the files a check reads for the test at `test_dir`.
///
/// A `%` placeholder is filled with `seed` for single-seed runs and with
/// `1..=num_seeds` otherwise. Paths containing `*` are glob-expanded.
pub fn data_paths(
    test_dir: &Path,
    data_file: &str,
    seed: u64,
    num_seeds: usize,
) -> PathResult<Vec<PathBuf>> {
    let out = output_dir(test_dir);

    let names: Vec<String> = match data_file.matches('%').count() {
        0 => vec![data_file.to_string()],
        1 if num_seeds <= 1 => vec![format_int(data_file, seed as i64)?],
        1 => (1..=num_seeds as i64)
            .map(|s| format_int(data_file, s))
            .collect::<PathResult<_>>()?,
        _ => return Err(PathError::TooManySpecifiers(data_file.to_string())),
    };

    let mut paths = Vec::new();
    for name in names {
        let path = out.join(name);
        if path.to_string_lossy().contains('*') {
            paths.extend(expand_glob(&path)?);
        } else {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(PathError::NoMatches(data_file.to_string()));
    }
    Ok(paths)
}

/// Expand a `*` pattern against the file system, sorted.
pub fn expand_glob(pattern: &Path) -> PathResult<Vec<PathBuf>> {
    let text = pattern.to_string_lossy();
    let glob = GlobBuilder::new(&text)
        .literal_separator(true)
        .build()
        .map_err(|e| PathError::Glob {
            path: text.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();

    let mut base = PathBuf::new();
    for component in pattern.components() {
        if component.as_os_str().to_string_lossy().contains('*') {
            break;
        }
        base.push(component);
    }
    let depth = pattern.components().count() - base.components().count();

    let mut matches: Vec<PathBuf> = WalkDir::new(&base)
        .min_depth(depth)
        .max_depth(depth)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| glob.is_match(path))
        .collect();
    matches.sort();
    Ok(matches)
}

/// Most values a single range item may expand to.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// Expand a `start:end[:step]` range. `end` is exclusive.
pub fn range_to_list(range: &str) -> PathResult<Vec<i64>> {
    let bad = || PathError::BadRange(range.to_string());
    let parts: Vec<&str> = range.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(bad());
    }

    let begin: i64 = parts[0].trim().parse().map_err(|_| bad())?;
    let end: i64 = parts[1].trim().parse().map_err(|_| bad())?;
    let step: i64 = match parts.get(2) {
        Some(s) => s.trim().parse().map_err(|_| bad())?,
        None => 1,
    };
    if step <= 0 {
        return Err(bad());
    }

    let span = (i128::from(end) - i128::from(begin)).max(0);
    let len = (span + i128::from(step) - 1) / i128::from(step);
    if len > MAX_RANGE_LEN as i128 {
        return Err(PathError::RangeTooLarge {
            range: range.to_string(),
            limit: MAX_RANGE_LEN,
        });
    }
    Ok((begin..end).step_by(step as usize).collect())
}

/// Convert an int-list into sorted unique integers.
pub fn expand_int_list(list: &IntList) -> PathResult<Vec<i64>> {
    let mut values = BTreeSet::new();
    for item in &list.0 {
        match item {
            IntListItem::Int(i) => {
                values.insert(*i);
            }
            IntListItem::Text(s) if s.contains(':') => values.extend(range_to_list(s)?),
            IntListItem::Text(s) => {
                let i = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| PathError::BadRange(s.clone()))?;
                values.insert(i);
            }
        }
    }
    Ok(values.into_iter().collect())
}

/// Expand `name` over every id in `id_range`. An empty range passes the name
/// through unchanged.
pub fn generate_file_list(name: &str, id_range: &IntList) -> PathResult<Vec<String>> {
    if id_range.is_empty() {
        return Ok(vec![name.to_string()]);
    }
    expand_int_list(id_range)?
        .into_iter()
        .map(|id| format_int(name, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn list(items: Vec<IntListItem>) -> IntList {
        IntList(items)
    }

    #[test]
    fn test_format_int_variants() {
        assert_eq!(format_int("counts.%d.dat", 7).unwrap(), "counts.7.dat");
        assert_eq!(format_int("viz.%5d.dat", 42).unwrap(), "viz.   42.dat");
        assert_eq!(format_int("viz.%05d.dat", 42).unwrap(), "viz.00042.dat");
        assert_eq!(format_int("plain.dat", 1).unwrap(), "plain.dat");
        assert!(matches!(
            format_int("bad.%s.dat", 1),
            Err(PathError::BadSpecifier(_))
        ));
    }

    #[test]
    fn test_data_paths_seed_expansion() {
        let test = Path::new("/tests/t");
        let single = data_paths(test, "counts.%d.dat", 4711, 1).unwrap();
        assert_eq!(single, vec![PathBuf::from("/tests/t/output/counts.4711.dat")]);

        let multi = data_paths(test, "counts.%d.dat", 2, 3).unwrap();
        assert_eq!(
            multi,
            vec![
                PathBuf::from("/tests/t/output/counts.1.dat"),
                PathBuf::from("/tests/t/output/counts.2.dat"),
                PathBuf::from("/tests/t/output/counts.3.dat"),
            ]
        );

        let plain = data_paths(test, "counts.dat", 2, 3).unwrap();
        assert_eq!(plain, vec![PathBuf::from("/tests/t/output/counts.dat")]);

        assert!(matches!(
            data_paths(test, "%d.%d.dat", 1, 1),
            Err(PathError::TooManySpecifiers(_))
        ));
    }

    #[test]
    fn test_data_paths_glob() {
        let dir = tempfile::tempdir().unwrap();
        let out = output_dir(dir.path());
        fs::create_dir_all(out.join("sub")).unwrap();
        for name in ["b.dat", "a.dat", "c.txt", "sub/d.dat"] {
            fs::write(out.join(name), "0 1\n").unwrap();
        }

        let paths = data_paths(dir.path(), "*.dat", 1, 1).unwrap();
        assert_eq!(paths, vec![out.join("a.dat"), out.join("b.dat")]);

        assert!(matches!(
            data_paths(dir.path(), "*.none", 1, 1),
            Err(PathError::NoMatches(_))
        ));
    }

    #[test]
    fn test_range_to_list() {
        assert_eq!(range_to_list("4:10").unwrap(), vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(range_to_list("0:10:5").unwrap(), vec![0, 5]);
        assert!(range_to_list("4:10:0").is_err());
        assert!(range_to_list("4").is_err());
        assert!(range_to_list("a:5").is_err());
    }

    #[test]
    fn test_range_to_list_rejects_oversized_ranges() {
        let huge = format!("0:{}", i64::MAX);
        assert!(matches!(
            range_to_list(&huge),
            Err(PathError::RangeTooLarge { limit: MAX_RANGE_LEN, .. })
        ));
        let wide = format!("{}:{}", i64::MIN, i64::MAX);
        assert!(matches!(range_to_list(&wide), Err(PathError::RangeTooLarge { .. })));

        assert_eq!(range_to_list("0:1000000").unwrap().len(), MAX_RANGE_LEN);
        assert_eq!(range_to_list(&format!("0:{}:{}", i64::MAX, i64::MAX / 4)).unwrap().len(), 5);
        assert!(range_to_list("10:2").unwrap().is_empty());
    }

    #[test]
    fn test_expand_int_list_sorted_unique() {
        let l = list(vec![
            IntListItem::Int(7),
            IntListItem::Text("3".to_string()),
            IntListItem::Text("0:10:3".to_string()),
        ]);
        assert_eq!(expand_int_list(&l).unwrap(), vec![0, 3, 6, 7, 9]);

        let bad = list(vec![IntListItem::Text("x".to_string())]);
        assert!(matches!(expand_int_list(&bad), Err(PathError::BadRange(_))));
    }

    #[test]
    fn test_generate_file_list() {
        assert_eq!(
            generate_file_list("viz.dat", &IntList::default()).unwrap(),
            vec!["viz.dat"]
        );
        let ids = list(vec![IntListItem::Text("1:4".to_string())]);
        assert_eq!(
            generate_file_list("mol.%d.bin", &ids).unwrap(),
            vec!["mol.1.bin", "mol.2.bin", "mol.3.bin"]
        );
    }
}
