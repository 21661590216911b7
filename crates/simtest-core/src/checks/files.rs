//! Checks that read raw output files rather than count columns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Utc, Weekday};
use regex::Regex;

use crate::descriptor::{FileSizeSpec, TestDescriptor};
use crate::error::CheckError;
use crate::paths::{data_paths, generate_file_list, output_dir};

type Outcome = Result<(), CheckError>;

fn read(path: &Path) -> Result<String, CheckError> {
    std::fs::read_to_string(path).map_err(|source| CheckError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Files from `FileNames` x `IDRange` exist and are empty, or non-empty with
/// the requested size.
pub(super) fn check_file_sizes(test: &TestDescriptor, spec: &FileSizeSpec, empty: bool) -> Outcome {
    let mut names = Vec::new();
    for name in &spec.file_names {
        names.extend(generate_file_list(name, &spec.id_range)?);
    }
    if names.is_empty() {
        return Err(CheckError::failed("no files to test specified"));
    }

    let size_ok = |size: u64| match (empty, spec.file_size) {
        (true, _) => size == 0,
        (false, 0) => size != 0,
        (false, expected) => size == expected,
    };

    let mut bad: Vec<PathBuf> = Vec::new();
    for name in &names {
        let paths = data_paths(&test.path, name, test.run.seed, 1).map_err(|e| {
            CheckError::failed(format!("failed to construct data path for file {name}:\n{e}"))
        })?;
        for path in paths {
            let ok = std::fs::metadata(&path)
                .map(|m| size_ok(m.len()))
                .unwrap_or(false);
            if !ok {
                bad.push(path);
            }
        }
    }

    if bad.is_empty() {
        return Ok(());
    }
    let listing = bad
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n\t\t");
    let state = if empty { "non-empty" } else { "empty" };
    Err(CheckError::failed(format!(
        "the following files were either missing, {state}, or had the wrong size:\n\n\t\t{listing}"
    )))
}

fn modified(path: &Path) -> Result<DateTime<Utc>, CheckError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|_| CheckError::failed(format!("Failed to stat file {}", path.display())))
}

/// The checkpoint file was written `delay ± margin` seconds after the stamp
/// file.
pub(super) fn check_checkpoint(test_dir: &Path, base_name: &str, delay: f64, margin: f64) -> Outcome {
    let out = output_dir(test_dir);
    let stamp = modified(&out.join(format!("{base_name}.stamp")))?;
    let checkpoint = modified(&out.join(format!("{base_name}.cp")))?;
    let elapsed = (checkpoint - stamp).num_milliseconds() as f64 / 1000.0;

    if elapsed < delay - margin {
        return Err(CheckError::failed(format!(
            "Realtime checkpoint scheduled for {delay} seconds but time between timestamp and checkpoint is less than {} seconds",
            delay - margin
        )));
    }
    if elapsed > delay + margin {
        return Err(CheckError::failed(format!(
            "Realtime checkpoint scheduled for {delay} seconds but time between timestamp and checkpoint exceeds {} seconds",
            delay + margin
        )));
    }
    Ok(())
}

/// Header `# nx=.. ny=.. nz=..` and `(ydim + 1) * zdim + 2` lines.
pub(super) fn check_legacy_vol_output(path: &Path, xdim: u64, ydim: u64, zdim: u64) -> Outcome {
    let content = read(path)?;
    let lines: Vec<&str> = content.split('\n').collect();
    let name = path.display();

    let header = Regex::new(r"# *nx=([0-9]+) *ny=([0-9]+) *nz=([0-9]+)")
        .map_err(|e| CheckError::failed(e.to_string()))?;
    let caps = header
        .captures(lines[0])
        .ok_or_else(|| CheckError::failed(format!("could not parse header of file {name}")))?;
    let dims: Vec<Option<u64>> = (1..=3).map(|i| caps[i].parse().ok()).collect();
    if dims != [Some(xdim), Some(ydim), Some(zdim)] {
        return Err(CheckError::failed(format!(
            "volume output in {name} had incorrect x, y, or z dimensions"
        )));
    }

    let expected = ydim
        .checked_add(1)
        .and_then(|y| y.checked_mul(zdim))
        .and_then(|n| n.checked_add(2))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            CheckError::failed(format!("volume dimensions of {name} are too large"))
        })?;
    if lines.len() != expected {
        return Err(CheckError::failed(format!(
            "volume output in {name} had incorrect number of lines ({} instead of {expected})",
            lines.len()
        )));
    }
    Ok(())
}

/// Every line holds 8 fields; fields 2 to 7 are floats.
pub(super) fn check_ascii_viz_output(path: &Path) -> Outcome {
    let content = read(path)?;
    let name = path.display();
    let mut lines: Vec<&str> = content.split('\n').collect();
    lines.pop();

    for (row, line) in lines.iter().enumerate() {
        let items: Vec<&str> = line.split_whitespace().collect();
        if items.len() != 8 {
            return Err(CheckError::failed(format!(
                "incorrect number of data items in {name} row {row}. Expected 8 found {}",
                items.len()
            )));
        }
        for col in 2..8 {
            if items[col].parse::<f64>().is_err() {
                return Err(CheckError::failed(format!(
                    "in file {name}: item in row {row} and col {col} is not a float"
                )));
            }
        }
    }
    Ok(())
}

/// `pattern` matches exactly `expected` times. CRLF line endings are
/// normalised first.
pub(super) fn match_pattern(path: &Path, pattern: &str, expected: usize) -> Outcome {
    let content = read(path)?.replace("\r\n", "\n");
    let matcher = Regex::new(pattern)
        .map_err(|e| CheckError::failed(format!("invalid match pattern {pattern}: {e}")))?;
    let found = matcher.find_iter(&content).count();
    if found != expected {
        return Err(CheckError::failed(format!(
            "failed pattern match: {pattern} matched {found} times instead of {expected}"
        )));
    }
    Ok(())
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

/// Lines of the form `X == Y` (exact) or `X ~= mean/std` (within two
/// standard deviations). Each line carries a four character prefix and the
/// file ends with two trailer entries.
pub(super) fn check_expressions(path: &Path) -> Outcome {
    let content = read(path)?;
    let lines: Vec<&str> = content.split('\n').collect();
    let body = &lines[..lines.len().saturating_sub(2)];

    for line in body {
        let expr = line.get(4..).unwrap_or("");
        let malformed = || CheckError::failed(format!("malformed expression {expr}"));
        let not_floats = || CheckError::failed(format!("cannot convert expression {expr} into floats"));

        if line.contains("==") {
            let (lhs, rhs) = expr.split_once("==").ok_or_else(malformed)?;
            if rhs.contains("==") {
                return Err(malformed());
            }
            let (a, b) = parse_float(lhs).zip(parse_float(rhs)).ok_or_else(not_floats)?;
            if a != b {
                return Err(CheckError::failed(format!(
                    "target expression {a} == {b} does not evaluate correctly"
                )));
            }
        } else if line.contains("~=") {
            let (lhs, rhs) = expr.split_once("~=").ok_or_else(malformed)?;
            let (mean, std) = rhs.split_once('/').ok_or_else(malformed)?;
            if rhs.contains("~=") || std.contains('/') {
                return Err(malformed());
            }
            let (value, (mean, std)) = parse_float(lhs)
                .zip(parse_float(mean).zip(parse_float(std)))
                .ok_or_else(not_floats)?;
            if value < mean - 2.0 * std || value > mean + 2.0 * std {
                return Err(CheckError::failed(format!(
                    "Warning: Gaussian value {value} out of 95% confidence interval ({mean} +/- {std})"
                )));
            }
        } else {
            return Err(CheckError::failed(format!("unknown expression type {line}")));
        }
    }
    Ok(())
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Replace each `%s` with the next parameter value and `%%` with `%`.
fn fill_template(template: &str, values: &[String]) -> Result<String, CheckError> {
    let mut out = String::with_capacity(template.len());
    let mut values = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                let value = values
                    .next()
                    .ok_or_else(|| CheckError::failed("template has more %s than parameters"))?;
                out.push_str(value);
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    Ok(out)
}

/// Output equals the template file after parameter substitution.
pub(super) fn diff_file_content(path: &Path, template: &Path, parameters: &[String]) -> Outcome {
    let values = parameters
        .iter()
        .map(|p| match p.as_str() {
            "TODAY_DAY" => Ok(weekday_name(Local::now().weekday()).to_string()),
            other => Err(CheckError::failed(format!("unknown template parameter {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let content = read(path)?.replace("\r\n", "\n");
    let expected = fill_template(&read(template)?, &values)?;

    if content != expected {
        return Err(CheckError::failed(format!(
            "the test output does not match template.\n\nexpected\n\n{expected}\n\nbut got\n\n{content}\n"
        )));
    }
    Ok(())
}
