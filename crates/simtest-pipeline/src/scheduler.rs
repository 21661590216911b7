//! Run scheduler: the single producer of simulation jobs.

use std::path::{Path, PathBuf};

use rand::Rng;
use simtest_core::{load_descriptor, CheckResult, RunId, TestDescriptor};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::sandbox::create_sandbox;

/// Upper bound (exclusive) of randomly picked single seeds.
pub const MAX_RANDOM_SEED: u64 = 10_000;

/// Result kind reported when a description cannot be loaded.
pub const PARSE_FAILURE: &str = "parse description";
/// Result kind reported when a sandbox cannot be created.
pub const SANDBOX_FAILURE: &str = "create output directory";

/// Turn one loaded descriptor into its simulation jobs.
///
/// A single seed is picked at random; `N > 1` seeds produce jobs with seeds
/// `1..=N`. All jobs of one descriptor share a fresh run identifier.
pub fn expand_seeds<R: Rng>(mut descriptor: TestDescriptor, rng: &mut R) -> Vec<TestDescriptor> {
    let n = descriptor.run.seed_count();
    descriptor.run.num_seeds = n;
    descriptor.run.run_id = RunId::new();

    if n == 1 {
        descriptor.run.seed = rng.gen_range(0..MAX_RANDOM_SEED);
        return vec![descriptor];
    }
    (1..=n as u64).map(|seed| descriptor.with_seed(seed)).collect()
}

/// Load, sandbox and enqueue every test in order. Tests that fail to load
/// or sandbox are reported on `failures` and skipped. `jobs` is closed when
/// this returns.
#[instrument(skip_all, fields(tests = tests.len()))]
pub async fn schedule(
    include_dir: PathBuf,
    tests: Vec<PathBuf>,
    jobs: mpsc::Sender<TestDescriptor>,
    failures: mpsc::Sender<CheckResult>,
) {
    for test in tests {
        let batch = match prepare(&test, &include_dir) {
            Ok(batch) => batch,
            Err(failure) => {
                if failures.send(failure).await.is_err() {
                    warn!("Result channel closed; stopping scheduler");
                    return;
                }
                continue;
            }
        };

        info!(test = %test.display(), jobs = batch.len(), "Scheduling test");
        for job in batch {
            if jobs.send(job).await.is_err() {
                warn!("Job queue closed; stopping scheduler");
                return;
            }
        }
    }
}

/// The jobs of one test, or the failure result to report instead.
fn prepare(test: &Path, include_dir: &Path) -> Result<Vec<TestDescriptor>, CheckResult> {
    let descriptor = match load_descriptor(test, include_dir) {
        Ok(d) => d,
        Err(e) => {
            warn!(test = %test.display(), error = %e, "Failed to load test description");
            let msg = format!("Error parsing test description in {}: {e}", test.display());
            return Err(CheckResult::failed(test, PARSE_FAILURE, msg));
        }
    };

    if let Err(e) = create_sandbox(test) {
        warn!(test = %test.display(), error = %e, "Failed to create sandbox");
        let msg = format!("failed to create output directory in {}: {e}", test.display());
        return Err(CheckResult::failed(test, SANDBOX_FAILURE, msg));
    }

    Ok(expand_seeds(descriptor, &mut rand::thread_rng()))
}
