//! The check catalogue.
//!
//! [`run_check`] evaluates one [`CheckSpec`] against a finished
//! [`TestRecord`] and always yields exactly one [`CheckResult`]. Kind-specific
//! logic lives in the submodules; this module resolves data paths, loads data
//! for the kinds that need it and maps errors into results.

mod counts;
mod files;
mod triggers;
mod viz;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{load_counts, load_string_columns, read_counts, CountColumns};
use crate::descriptor::{CheckSpec, DataSource, TestDescriptor, TestRecord};
use crate::error::CheckError;
use crate::paths::data_paths;

/// Outcome of one check, as consumed by the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The test directory.
    pub test_path: PathBuf,
    pub success: bool,
    /// `TestType` tag of the check.
    pub kind: String,
    /// Empty on success.
    pub message: String,
}

impl CheckResult {
    pub fn passed(test_path: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            test_path: test_path.into(),
            success: true,
            kind: kind.into(),
            message: String::new(),
        }
    }

    pub fn failed(
        test_path: impl Into<PathBuf>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            test_path: test_path.into(),
            success: false,
            kind: kind.into(),
            message: message.into(),
        }
    }

    fn from_outcome(test_path: &Path, kind: &str, outcome: Result<(), CheckError>) -> Self {
        match outcome {
            Ok(()) => Self::passed(test_path, kind),
            Err(e) => Self::failed(test_path, kind, e.to_string()),
        }
    }
}

/// A check result plus whether the record's remaining checks may still run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Continue(CheckResult),
    /// The simulation did not succeed; skip every later check of the record.
    Abort(CheckResult),
}

impl CheckOutcome {
    pub fn is_abort(&self) -> bool {
        matches!(self, CheckOutcome::Abort(_))
    }

    pub fn into_result(self) -> CheckResult {
        match self {
            CheckOutcome::Continue(r) | CheckOutcome::Abort(r) => r,
        }
    }
}

/// Evaluate `check` against `record`.
pub fn run_check(record: &TestRecord, check: &CheckSpec) -> CheckOutcome {
    let test = &record.descriptor;
    debug!(test = %test.path.display(), kind = check.kind(), "Running check");

    if let CheckSpec::SimSuccess = check {
        return sim_success(record);
    }
    let outcome = evaluate(record, check);
    CheckOutcome::Continue(CheckResult::from_outcome(&test.path, check.kind(), outcome))
}

fn sim_success(record: &TestRecord) -> CheckOutcome {
    let path = &record.descriptor.path;
    let kind = CheckSpec::SimSuccess.kind();

    if record.sim_results.is_empty() {
        return CheckOutcome::Abort(CheckResult::failed(
            path,
            kind,
            "simulations did not run or return an exit status",
        ));
    }
    match record.sim_results.iter().find(|r| !r.success) {
        Some(failed) => CheckOutcome::Abort(CheckResult::failed(
            path,
            kind,
            format!("{}\n{}", failed.exit_message, failed.stderr_content),
        )),
        None => CheckOutcome::Continue(CheckResult::passed(path, kind)),
    }
}

fn resolve(test: &TestDescriptor, data: &DataSource) -> Result<Vec<PathBuf>, CheckError> {
    Ok(data_paths(
        &test.path,
        &data.data_file,
        test.run.seed,
        test.run.seed_count(),
    )?)
}

fn load(test: &TestDescriptor, data: &DataSource) -> Result<Vec<(PathBuf, CountColumns)>, CheckError> {
    let paths = resolve(test, data)?;
    let columns = load_counts(&paths, data.have_header, data.average_data)?;
    Ok(paths.into_iter().zip(columns).collect())
}

fn for_each_count_file<F>(test: &TestDescriptor, data: &DataSource, mut f: F) -> Result<(), CheckError>
where
    F: FnMut(&CountColumns, &Path) -> Result<(), CheckError>,
{
    for (path, columns) in load(test, data)? {
        f(&columns, &path)?;
    }
    Ok(())
}

fn for_each_path<F>(test: &TestDescriptor, data: &DataSource, mut f: F) -> Result<(), CheckError>
where
    F: FnMut(&Path) -> Result<(), CheckError>,
{
    for path in resolve(test, data)? {
        f(&path)?;
    }
    Ok(())
}

fn evaluate(record: &TestRecord, check: &CheckSpec) -> Result<(), CheckError> {
    let test = &record.descriptor;

    match check {
        CheckSpec::SimSuccess => Ok(()),
        CheckSpec::ExitCode { expected } => {
            match record.sim_results.iter().find(|r| r.exit_code != *expected) {
                Some(r) => Err(CheckError::failed(format!(
                    "expected exit code {} but got {} instead",
                    expected, r.exit_code
                ))),
                None => Ok(()),
            }
        }
        CheckSpec::NonEmptyFiles(spec) => files::check_file_sizes(test, spec, false),
        CheckSpec::EmptyFiles(spec) => files::check_file_sizes(test, spec, true),
        CheckSpec::Checkpoint {
            base_name,
            delay,
            margin,
        } => files::check_checkpoint(&test.path, base_name, *delay, *margin),
        CheckSpec::LegacyVolOutput {
            data,
            xdim,
            ydim,
            zdim,
        } => for_each_path(test, data, |p| {
            files::check_legacy_vol_output(p, *xdim, *ydim, *zdim)
        }),
        CheckSpec::AsciiVizOutput { data } => for_each_path(test, data, files::check_ascii_viz_output),
        CheckSpec::VizMolsBin {
            viz_path,
            all,
            surf,
            vol,
        } => viz::check_mols_bin(&test.path, viz_path, all, surf, vol),
        CheckSpec::VizMolsAscii { frames, mol_names } => {
            viz::check_mols_ascii(&test.path, frames, mol_names)
        }
        CheckSpec::VizMeshBin { frames, mesh_empty } => {
            viz::check_mesh_bin(&test.path, frames, *mesh_empty)
        }
        CheckSpec::VizMeshAscii {
            frames,
            mesh_empty,
            objects,
            object_regions,
        } => viz::check_mesh_ascii(&test.path, frames, *mesh_empty, objects, object_regions),
        CheckSpec::VizGrouped(spec) => viz::check_grouped(&test.path, spec),
        CheckSpec::DiffFileContent {
            data,
            template_file,
            template_parameters,
        } => {
            let template = test.path.join(template_file);
            for_each_path(test, data, |p| {
                files::diff_file_content(p, &template, template_parameters)
            })
        }
        CheckSpec::CountConstraints {
            data,
            window,
            constraints,
        } => for_each_count_file(test, data, |cols, p| {
            counts::check_constraints(cols, p, window, constraints)
        }),
        CheckSpec::CountMinMax {
            data,
            window,
            maximum,
            minimum,
        } => for_each_count_file(test, data, |cols, p| {
            counts::check_minmax(cols, p, window, maximum.as_deref(), minimum.as_deref())
        }),
        CheckSpec::FileMatchPattern {
            data,
            pattern,
            num_matches,
        } => for_each_path(test, data, |p| files::match_pattern(p, pattern, *num_matches)),
        CheckSpec::CheckExpressions { data } => for_each_path(test, data, files::check_expressions),
        CheckSpec::CompareCounts {
            data,
            window,
            reference_file,
            abs_deviation,
            rel_deviation,
        } => {
            let reference = read_counts(&test.path.join(reference_file), data.have_header)?;
            let tolerance = counts::Deviation {
                absolute: abs_deviation,
                relative: rel_deviation,
            };
            for_each_count_file(test, data, |cols, p| {
                counts::compare(cols, &reference, p, window, &tolerance)
            })
        }
        CheckSpec::CountEquilibrium {
            data,
            window,
            targets,
        } => for_each_count_file(test, data, |cols, p| {
            counts::check_equilibrium(cols, p, window, targets)
        }),
        CheckSpec::CountRates {
            data,
            window,
            base_time,
            targets,
        } => for_each_count_file(test, data, |cols, p| {
            counts::check_rates(cols, p, window, *base_time, targets)
        }),
        CheckSpec::PositiveCounts { data, window } => for_each_count_file(test, data, |cols, p| {
            counts::check_lower_bound(cols, p, window, 1)
        }),
        CheckSpec::PositiveOrZeroCounts { data, window } => {
            for_each_count_file(test, data, |cols, p| {
                counts::check_lower_bound(cols, p, window, 0)
            })
        }
        CheckSpec::ZeroCounts { data, window } => {
            for_each_count_file(test, data, |cols, p| counts::check_zero(cols, p, window))
        }
        CheckSpec::Triggers {
            data,
            window,
            trigger,
        } => {
            let paths = resolve(test, data)?;
            let columns = load_string_columns(&paths, data.have_header)?;
            for (path, cols) in paths.iter().zip(&columns) {
                triggers::check_triggers(cols, path, window, trigger)?;
            }
            Ok(())
        }
        CheckSpec::Unknown { test_type } => Err(CheckError::failed(format!(
            "Unknown test type: {test_type}"
        ))),
    }
}
