//! Loaders for whitespace-delimited columnar simulator output.
//!
//! The first column is always the time value. Count files carry integer
//! columns after it; trigger files mix ints, floats and labels and are kept
//! as strings until a check interprets them.

use std::path::{Path, PathBuf};

use crate::error::{DataError, DataResult};

/// Reaction count output: one time column and any number of integer columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountColumns {
    pub times: Vec<f64>,
    /// Column-major: `counts[c][r]`.
    pub counts: Vec<Vec<i64>>,
}

/// Trigger output with untyped value columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringColumns {
    pub times: Vec<f64>,
    /// Column-major: `values[c][r]`.
    pub values: Vec<Vec<String>>,
}

impl CountColumns {
    pub fn rows(&self) -> usize {
        self.times.len()
    }
}

impl StringColumns {
    pub fn rows(&self) -> usize {
        self.times.len()
    }
}

/// Split a file into data rows, dropping the header and blank lines.
/// Yields `(1-based line number, fields)`.
fn data_rows(content: &str, have_header: bool) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .skip(usize::from(have_header))
        .map(|(i, line)| (i + 1, line.split_whitespace().collect::<Vec<_>>()))
        .filter(|(_, fields)| !fields.is_empty())
}

fn read_file(path: &Path) -> DataResult<String> {
    std::fs::read_to_string(path).map_err(|source| DataError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_time(path: &Path, line: usize, field: &str) -> DataResult<f64> {
    field.parse::<f64>().map_err(|_| DataError::BadTime {
        path: path.to_path_buf(),
        line,
        value: field.to_string(),
    })
}

fn check_width(path: &Path, line: usize, expected: usize, found: usize) -> DataResult<()> {
    if expected != found {
        return Err(DataError::Ragged {
            path: path.to_path_buf(),
            line,
            expected,
            found,
        });
    }
    Ok(())
}

/// Read one count file.
pub fn read_counts(path: &Path, have_header: bool) -> DataResult<CountColumns> {
    let content = read_file(path)?;
    let mut cols = CountColumns::default();
    let mut width = None;

    for (line, fields) in data_rows(&content, have_header) {
        let expected = *width.get_or_insert_with(|| {
            cols.counts = vec![Vec::new(); fields.len() - 1];
            fields.len()
        });
        check_width(path, line, expected, fields.len())?;

        cols.times.push(parse_time(path, line, fields[0])?);
        for (c, field) in fields[1..].iter().enumerate() {
            let count = field.parse::<i64>().map_err(|_| DataError::BadCount {
                path: path.to_path_buf(),
                line,
                value: field.to_string(),
            })?;
            cols.counts[c].push(count);
        }
    }

    if cols.times.is_empty() {
        return Err(DataError::Empty(path.to_path_buf()));
    }
    Ok(cols)
}

/// Read one trigger file, keeping value fields as strings.
pub fn read_string_columns(path: &Path, have_header: bool) -> DataResult<StringColumns> {
    let content = read_file(path)?;
    let mut cols = StringColumns::default();
    let mut width = None;

    for (line, fields) in data_rows(&content, have_header) {
        let expected = *width.get_or_insert_with(|| {
            cols.values = vec![Vec::new(); fields.len() - 1];
            fields.len()
        });
        check_width(path, line, expected, fields.len())?;

        cols.times.push(parse_time(path, line, fields[0])?);
        for (c, field) in fields[1..].iter().enumerate() {
            cols.values[c].push((*field).to_string());
        }
    }

    if cols.times.is_empty() {
        return Err(DataError::Empty(path.to_path_buf()));
    }
    Ok(cols)
}

/// Load every count file, or a single averaged dataset when `average` is set.
///
/// Averaging sums element-wise and divides by the number of files with
/// truncating integer division, matching historical reference outputs.
pub fn load_counts(paths: &[PathBuf], have_header: bool, average: bool) -> DataResult<Vec<CountColumns>> {
    if !average {
        return paths.iter().map(|p| read_counts(p, have_header)).collect();
    }

    let Some((first, rest)) = paths.split_first() else {
        return Ok(Vec::new());
    };
    let mut sum = read_counts(first, have_header)?;
    for path in rest {
        let next = read_counts(path, have_header)?;
        if next.rows() != sum.rows() || next.counts.len() != sum.counts.len() {
            return Err(DataError::ShapeMismatch {
                path: path.clone(),
                first: first.clone(),
            });
        }
        for (acc, col) in sum.counts.iter_mut().zip(&next.counts) {
            for (a, v) in acc.iter_mut().zip(col) {
                *a = a
                    .checked_add(*v)
                    .ok_or_else(|| DataError::Overflow(path.clone()))?;
            }
        }
    }

    let n = paths.len() as i64;
    for col in &mut sum.counts {
        for v in col.iter_mut() {
            *v /= n;
        }
    }
    Ok(vec![sum])
}

/// Load every trigger file.
pub fn load_string_columns(paths: &[PathBuf], have_header: bool) -> DataResult<Vec<StringColumns>> {
    paths
        .iter()
        .map(|p| read_string_columns(p, have_header))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_counts_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(
            dir.path(),
            "counts.dat",
            "# time A B\n0 10 20\n1e-6 11 19\n\n2e-6 12 18\n",
        );

        let cols = read_counts(&path, true).unwrap();
        assert_eq!(cols.times, vec![0.0, 1e-6, 2e-6]);
        assert_eq!(cols.counts, vec![vec![10, 11, 12], vec![20, 19, 18]]);
    }

    #[test]
    fn test_read_counts_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let bad_time = fixture(dir.path(), "a.dat", "x 1\n");
        assert!(matches!(
            read_counts(&bad_time, false),
            Err(DataError::BadTime { line: 1, .. })
        ));

        let bad_count = fixture(dir.path(), "b.dat", "0 1\n1 2.5\n");
        assert!(matches!(
            read_counts(&bad_count, false),
            Err(DataError::BadCount { line: 2, .. })
        ));

        let ragged = fixture(dir.path(), "c.dat", "0 1 2\n1 2\n");
        assert!(matches!(
            read_counts(&ragged, false),
            Err(DataError::Ragged {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "empty.dat", "time A\n");
        let err = read_counts(&path, true).unwrap_err();
        assert!(matches!(err, DataError::Empty(_)));
        assert!(err.to_string().ends_with("contains no data"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_counts(Path::new("/nonexistent/counts.dat"), false),
            Err(DataError::Read { .. })
        ));
    }

    #[test]
    fn test_average_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a.dat", "0 1 10\n1 2 -3\n");
        let b = fixture(dir.path(), "b.dat", "0 2 11\n1 2 -4\n");

        let data = load_counts(&[a, b], false, true).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].counts, vec![vec![1, 2], vec![10, -3]]);
    }

    #[test]
    fn test_average_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a.dat", "0 1\n1 2\n");
        let b = fixture(dir.path(), "b.dat", "0 1\n");
        assert!(matches!(
            load_counts(&[a, b], false, true),
            Err(DataError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_average_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a.dat", &format!("0 {}\n", i64::MAX));
        let b = fixture(dir.path(), "b.dat", "0 1\n");
        assert!(matches!(
            load_counts(&[a, b.clone()], false, true),
            Err(DataError::Overflow(p)) if p == b
        ));
    }

    #[test]
    fn test_load_without_average_keeps_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a.dat", "0 1\n");
        let b = fixture(dir.path(), "b.dat", "0 3\n");
        let data = load_counts(&[a, b], false, false).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].counts, vec![vec![3]]);
    }

    #[test]
    fn test_string_columns_keep_raw_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(
            dir.path(),
            "trigger.dat",
            "1e-6 0.1 0.2 0.3 1 rxn\n2e-6 0.5 -0.5 0 -1 rxn\n",
        );
        let data = load_string_columns(&[path], false).unwrap();
        assert_eq!(data[0].times, vec![1e-6, 2e-6]);
        assert_eq!(data[0].values.len(), 5);
        assert_eq!(data[0].values[3], vec!["1", "-1"]);
        assert_eq!(data[0].values[4], vec!["rxn", "rxn"]);
    }
}
