//! Checks over integer count columns.

use std::path::Path;

use crate::data::CountColumns;
use crate::descriptor::{CountConstraint, MeanSpec, TimeWindow};
use crate::error::CheckError;

type Outcome = Result<(), CheckError>;

/// Row indices whose time lies inside `window`.
fn rows_in<'a>(data: &'a CountColumns, window: &'a TimeWindow) -> impl Iterator<Item = usize> + 'a {
    data.times
        .iter()
        .enumerate()
        .filter(|(_, t)| window.contains(**t))
        .map(|(r, _)| r)
}

pub(super) fn check_constraints(
    data: &CountColumns,
    path: &Path,
    window: &TimeWindow,
    constraints: &[CountConstraint],
) -> Outcome {
    let path = path.display();
    for con in constraints {
        if con.query.len() != data.counts.len() {
            return Err(CheckError::failed(format!(
                "in {path}: length of constraint ({}) does not match number of data columns ({})",
                con.query.len(),
                data.counts.len()
            )));
        }
    }

    for r in rows_in(data, window) {
        for con in constraints {
            let result = con
                .query
                .iter()
                .zip(&data.counts)
                .try_fold(0i64, |acc, (q, col)| q.checked_mul(col[r])?.checked_add(acc))
                .ok_or_else(|| {
                    CheckError::failed(format!(
                        "in {path}: constraint evaluation overflows in row {r}"
                    ))
                })?;
            if result != con.target {
                return Err(CheckError::failed(format!(
                    "in {path}: constraint mismatch in row {r}: expected ({}) - actual ({result})",
                    con.target
                )));
            }
        }
    }
    Ok(())
}

pub(super) fn check_minmax(
    data: &CountColumns,
    path: &Path,
    window: &TimeWindow,
    maximum: Option<&[i64]>,
    minimum: Option<&[i64]>,
) -> Outcome {
    let path = path.display();
    for (name, bound) in [("CountMaximum", maximum), ("CountMinimum", minimum)] {
        if let Some(b) = bound {
            if b.len() != data.counts.len() {
                return Err(CheckError::failed(format!(
                    "in {path}: number of constraints in {name} does not match number of data columns"
                )));
            }
        }
    }

    for r in rows_in(data, window) {
        for (c, col) in data.counts.iter().enumerate() {
            let v = col[r];
            if let Some(max) = maximum {
                if v > max[c] {
                    return Err(CheckError::failed(format!(
                        "in {path}: maximum exceeded: data ({v}) > max({})",
                        max[c]
                    )));
                }
            }
            if let Some(min) = minimum {
                if v < min[c] {
                    return Err(CheckError::failed(format!(
                        "in {path}: minimum undershot: data ({v}) < min({})",
                        min[c]
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Per-column tolerances for comparing against a reference. Empty means
/// the comparison is exact for that kind of deviation.
pub(super) struct Deviation<'a> {
    pub absolute: &'a [i64],
    pub relative: &'a [f64],
}

impl Deviation<'_> {
    fn accepts(&self, column: usize, actual: i64, reference: i64) -> bool {
        // widened so that counts of opposite extremes cannot overflow
        let diff = (i128::from(actual) - i128::from(reference)).abs();
        if diff == 0 {
            return true;
        }
        let within_abs = self.absolute.get(column).map(|tol| diff <= i128::from(*tol));
        let within_rel = self
            .relative
            .get(column)
            .map(|tol| diff as f64 <= tol * (reference as f64).abs());
        within_abs.unwrap_or(false) || within_rel.unwrap_or(false)
    }
}

pub(super) fn compare(
    data: &CountColumns,
    reference: &CountColumns,
    path: &Path,
    window: &TimeWindow,
    tolerance: &Deviation<'_>,
) -> Outcome {
    let path = path.display();
    if reference.rows() != data.rows() {
        return Err(CheckError::failed(format!(
            "in {path}: reference and actual data set have different number of rows"
        )));
    }
    if reference.counts.len() != data.counts.len() {
        return Err(CheckError::failed(format!(
            "in {path}: reference and actual data set have different number of columns"
        )));
    }
    for (name, len) in [
        ("AbsDeviation", tolerance.absolute.len()),
        ("RelDeviation", tolerance.relative.len()),
    ] {
        if len != 0 && len != data.counts.len() {
            return Err(CheckError::failed(format!(
                "in {path}: number of {name} entries does not match number of data columns"
            )));
        }
    }

    for r in rows_in(data, window) {
        for (c, (col, ref_col)) in data.counts.iter().zip(&reference.counts).enumerate() {
            if !tolerance.accepts(c, col[r], ref_col[r]) {
                return Err(CheckError::failed(format!(
                    "in {path}: reference and actual data differ in row {r} and col {c}"
                )));
            }
        }
    }
    Ok(())
}

fn check_targets(path: &impl std::fmt::Display, data: &CountColumns, targets: &MeanSpec) -> Outcome {
    if targets.means.len() != data.counts.len() {
        return Err(CheckError::failed(format!(
            "in {path}: number of provided means does not match number of data columns"
        )));
    }
    if targets.tolerances.len() != targets.means.len() {
        return Err(CheckError::failed(format!(
            "in {path}: number of provided tolerances does not match number of means"
        )));
    }
    Ok(())
}

/// Column means over the window of `value(count, time)`.
fn window_means<F>(data: &CountColumns, window: &TimeWindow, value: F) -> Option<Vec<f64>>
where
    F: Fn(i64, f64) -> f64,
{
    let mut sums = vec![0.0; data.counts.len()];
    let mut n = 0usize;
    for r in rows_in(data, window) {
        n += 1;
        for (sum, col) in sums.iter_mut().zip(&data.counts) {
            *sum += value(col[r], data.times[r]);
        }
    }
    if n == 0 {
        return None;
    }
    Some(sums.into_iter().map(|s| s / n as f64).collect())
}

pub(super) fn check_equilibrium(
    data: &CountColumns,
    path: &Path,
    window: &TimeWindow,
    targets: &MeanSpec,
) -> Outcome {
    let path = path.display();
    check_targets(&path, data, targets)?;

    let averages = window_means(data, window, |count, _| count as f64)
        .ok_or_else(|| CheckError::failed(format!("in {path}: no data within time window")))?;
    for (c, average) in averages.iter().enumerate() {
        let (mean, tol) = (targets.means[c], targets.tolerances[c]);
        if *average < mean - tol || *average > mean + tol {
            return Err(CheckError::failed(format!(
                "in {path}: average value {average} of column {c} outside of tolerance {mean} +/- {tol}"
            )));
        }
    }
    Ok(())
}

/// Mean of `count / (t - base_time)` per column.
pub(super) fn check_rates(
    data: &CountColumns,
    path: &Path,
    window: &TimeWindow,
    base_time: f64,
    targets: &MeanSpec,
) -> Outcome {
    let path = path.display();
    check_targets(&path, data, targets)?;

    let rates = window_means(data, window, |count, t| count as f64 / (t - base_time))
        .ok_or_else(|| CheckError::failed(format!("in {path}: no data within time window")))?;
    for (c, rate) in rates.iter().enumerate() {
        let (mean, tol) = (targets.means[c], targets.tolerances[c]);
        if !(mean - tol..=mean + tol).contains(rate) {
            return Err(CheckError::failed(format!(
                "in {path}: average reaction rate {rate} is outside of tolerance {mean} +/- {tol}"
            )));
        }
    }
    Ok(())
}

/// Every count in the window is at least `lower`.
pub(super) fn check_lower_bound(data: &CountColumns, path: &Path, window: &TimeWindow, lower: i64) -> Outcome {
    let qualifier = if lower > 0 { "positive" } else { "positive or zero" };
    for r in rows_in(data, window) {
        for (c, col) in data.counts.iter().enumerate() {
            if col[r] < lower {
                return Err(CheckError::failed(format!(
                    "in {} value {} in column {c} in row {r} is not {qualifier}",
                    path.display(),
                    col[r]
                )));
            }
        }
    }
    Ok(())
}

pub(super) fn check_zero(data: &CountColumns, path: &Path, window: &TimeWindow) -> Outcome {
    for r in rows_in(data, window) {
        for (c, col) in data.counts.iter().enumerate() {
            if col[r] != 0 {
                return Err(CheckError::failed(format!(
                    "in {} value {} in column {c} in row {r} is non-zero",
                    path.display(),
                    col[r]
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(times: Vec<f64>, counts: Vec<Vec<i64>>) -> CountColumns {
        CountColumns { times, counts }
    }

    fn unbounded() -> TimeWindow {
        TimeWindow::default()
    }

    #[test]
    fn test_constraints_fail_on_second_row() {
        // rows: (2, 4) and (3, 5); 1*2 + 2*4 = 10, 1*3 + 2*5 = 13
        let data = cols(vec![0.0, 1.0], vec![vec![2, 3], vec![4, 5]]);
        let con = [CountConstraint {
            target: 10,
            query: vec![1, 2],
        }];
        let err = check_constraints(&data, Path::new("counts.dat"), &unbounded(), &con).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("counts.dat"));
        assert!(msg.contains("row 1"));
        assert!(msg.contains("actual (13)"));

        let window = TimeWindow {
            min_time: 0.0,
            max_time: 0.5,
        };
        assert!(check_constraints(&data, Path::new("counts.dat"), &window, &con).is_ok());
    }

    #[test]
    fn test_constraint_overflow_is_a_failure() {
        let data = cols(vec![0.0], vec![vec![i64::MAX]]);
        let con = [CountConstraint {
            target: 0,
            query: vec![2],
        }];
        let err = check_constraints(&data, Path::new("huge.dat"), &unbounded(), &con).unwrap_err();
        assert!(err.to_string().contains("overflows in row 0"));
    }

    #[test]
    fn test_deviation_handles_extreme_counts() {
        let tolerant = Deviation {
            absolute: &[i64::MAX],
            relative: &[],
        };
        assert!(!tolerant.accepts(0, i64::MAX, i64::MIN));
        assert!(tolerant.accepts(0, i64::MAX, 0));
    }

    #[test]
    fn test_constraints_column_mismatch() {
        let data = cols(vec![0.0], vec![vec![1]]);
        let con = [CountConstraint {
            target: 1,
            query: vec![1, 1],
        }];
        assert!(check_constraints(&data, Path::new("c"), &unbounded(), &con).is_err());
    }

    #[test]
    fn test_minmax() {
        let over = cols(vec![0.0, 1.0, 2.0], vec![vec![1, 6, 2]]);
        let max = [5];
        assert!(check_minmax(&over, Path::new("c"), &unbounded(), Some(&max), None).is_err());

        let fine = cols(vec![0.0, 1.0], vec![vec![5, 5]]);
        assert!(check_minmax(&fine, Path::new("c"), &unbounded(), Some(&max), None).is_ok());

        let min = [6];
        assert!(check_minmax(&fine, Path::new("c"), &unbounded(), None, Some(&min)).is_err());

        let window = TimeWindow {
            min_time: 1.5,
            max_time: 0.0,
        };
        assert!(check_minmax(&over, Path::new("c"), &window, Some(&max), None).is_ok());
    }

    #[test]
    fn test_equilibrium() {
        let data = cols(vec![1.0, 2.0, 3.0], vec![vec![9, 10, 11]]);
        let ok = MeanSpec {
            means: vec![10.0],
            tolerances: vec![0.5],
        };
        assert!(check_equilibrium(&data, Path::new("c"), &unbounded(), &ok).is_ok());

        let off = MeanSpec {
            means: vec![12.0],
            tolerances: vec![0.5],
        };
        assert!(check_equilibrium(&data, Path::new("c"), &unbounded(), &off).is_err());
    }

    #[test]
    fn test_mean_checks_fail_on_empty_window() {
        let data = cols(vec![1.0, 2.0], vec![vec![1, 1]]);
        let window = TimeWindow {
            min_time: 5.0,
            max_time: 0.0,
        };
        let targets = MeanSpec {
            means: vec![1.0],
            tolerances: vec![1.0],
        };
        let err = check_equilibrium(&data, Path::new("c"), &window, &targets).unwrap_err();
        assert!(err.to_string().contains("no data within time window"));
        assert!(check_rates(&data, Path::new("c"), &window, 0.0, &targets).is_err());
    }

    #[test]
    fn test_rates() {
        // rates 10/1 and 20/2 average to 10
        let data = cols(vec![1.0, 2.0], vec![vec![10, 20]]);
        let targets = MeanSpec {
            means: vec![10.0],
            tolerances: vec![0.1],
        };
        assert!(check_rates(&data, Path::new("c"), &unbounded(), 0.0, &targets).is_ok());
        assert!(check_rates(&data, Path::new("c"), &unbounded(), 0.5, &targets).is_err());
    }

    #[test]
    fn test_bounds() {
        let data = cols(vec![0.0, 1.0], vec![vec![0, 1]]);
        assert!(check_lower_bound(&data, Path::new("c"), &unbounded(), 1).is_err());
        assert!(check_lower_bound(&data, Path::new("c"), &unbounded(), 0).is_ok());
        assert!(check_zero(&data, Path::new("c"), &unbounded()).is_err());

        let zeros = cols(vec![0.0], vec![vec![0], vec![0]]);
        assert!(check_zero(&zeros, Path::new("c"), &unbounded()).is_ok());
    }

    #[test]
    fn test_compare_with_relative_deviation() {
        let data = cols(vec![0.0, 1.0], vec![vec![105, 200]]);
        let reference = cols(vec![0.0, 1.0], vec![vec![100, 200]]);
        let exact = Deviation {
            absolute: &[],
            relative: &[],
        };
        assert!(compare(&data, &reference, Path::new("c"), &unbounded(), &exact).is_err());

        let relative = Deviation {
            absolute: &[],
            relative: &[0.05],
        };
        assert!(compare(&data, &reference, Path::new("c"), &unbounded(), &relative).is_ok());

        let short = cols(vec![0.0], vec![vec![100]]);
        assert!(compare(&short, &reference, Path::new("c"), &unbounded(), &exact).is_err());
    }
}
