//! Trigger output validation.
//!
//! Row layout after the time column: an optional exact-time column, the
//! x/y/z location, then zero (reaction), one (hits) or two (molecule count)
//! event data columns.

use std::path::Path;

use crate::data::StringColumns;
use crate::descriptor::{TimeWindow, TriggerKind, TriggerSpec};
use crate::error::CheckError;

fn parse_f64(data: &StringColumns, col: usize, row: usize) -> Option<f64> {
    data.values[col][row].parse().ok()
}

pub(super) fn check_triggers(
    data: &StringColumns,
    path: &Path,
    window: &TimeWindow,
    spec: &TriggerSpec,
) -> Result<(), CheckError> {
    let path = path.display();
    let (data_cols, allowed): (usize, &[i64]) = match &spec.kind {
        TriggerKind::Reaction => (0, &[][..]),
        TriggerKind::Hits => (1, &[-1, 1][..]),
        TriggerKind::MolCounts => (2, &[-1, 0, 1][..]),
        TriggerKind::Unknown(name) => {
            return Err(CheckError::failed(format!(
                "in {path}: unknown trigger type {name}"
            )))
        }
    };

    let location = usize::from(spec.have_exact_time);
    let first_data = location + 3;
    let expected = first_data + data_cols;
    if data.values.len() != expected {
        return Err(CheckError::failed(format!(
            "in {path}: incorrect column count of {} (expected {expected})",
            data.values.len()
        )));
    }

    for (row, time) in data.times.iter().enumerate() {
        if !window.contains(*time) {
            continue;
        }

        if spec.have_exact_time {
            let exact = parse_f64(data, 0, row).ok_or_else(|| {
                CheckError::failed(format!(
                    "in {path}: exact time value in row {row} is not a float value"
                ))
            })?;
            if exact < *time || exact > time + spec.output_time {
                return Err(CheckError::failed(format!(
                    "in {path}: exact time out of bounds in row {row}"
                )));
            }
        }

        if !allowed.is_empty() {
            let value: i64 = data.values[first_data][row].parse().map_err(|_| {
                CheckError::failed(format!(
                    "in {path}: data value in row {row} col {first_data} is not an int"
                ))
            })?;
            if !allowed.contains(&value) {
                let expected = allowed
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CheckError::failed(format!(
                    "in {path}: incorrect trigger data {value} in row {row} (expected {expected})"
                )));
            }
        }

        let coords = (
            parse_f64(data, location, row),
            parse_f64(data, location + 1, row),
            parse_f64(data, location + 2, row),
        );
        let (Some(x), Some(y), Some(z)) = coords else {
            return Err(CheckError::failed(format!(
                "in {path}: location data values in row {row} are not of type float"
            )));
        };
        for (axis, value, range) in [
            ("x", x, spec.xrange),
            ("y", y, spec.yrange),
            ("z", z, spec.zrange),
        ] {
            if let Some((lo, hi)) = range {
                if value < lo || value > hi {
                    return Err(CheckError::failed(format!(
                        "in {path}: {axis} coordinate {value} out of bounds in row {row} (expected [{lo},{hi}])"
                    )));
                }
            }
        }
    }
    Ok(())
}
