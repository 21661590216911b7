//! Pipeline entry point: wires the stages together and runs them to
//! completion.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use simtest_core::{CheckResult, PipelineConfig, TestDescriptor, TestRecord};
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::aggregator::aggregate;
use crate::dispatcher::spawn_check_pool;
use crate::error::Result;
use crate::executor::{ProcessSimulator, Simulator};
use crate::pool::spawn_simulation_pool;
use crate::reporter::{Reporter, RunSummary};
use crate::sandbox::clean_output;
use crate::scheduler::schedule;

/// Run `tests` against the configured simulator binary, streaming the
/// report to `out`.
pub async fn run_tests<W: Write>(
    config: &PipelineConfig,
    tests: Vec<PathBuf>,
    out: W,
) -> Result<RunSummary> {
    let simulator = Arc::new(ProcessSimulator::new(config.simulator_path.clone()));
    run_tests_with(config, simulator, tests, out).await
}

/// Run `tests` with an arbitrary [`Simulator`].
///
/// Previous sandboxes are removed first. The reporter runs on the calling
/// task; every other stage is spawned.
#[instrument(
    skip_all,
    fields(
        tests = tests.len(),
        sim_workers = config.sim_workers,
        check_workers = config.check_workers
    )
)]
pub async fn run_tests_with<W: Write>(
    config: &PipelineConfig,
    simulator: Arc<dyn Simulator>,
    tests: Vec<PathBuf>,
    out: W,
) -> Result<RunSummary> {
    clean_output(&tests)?;
    info!("Starting test run");

    let capacity = tests.len().max(1);
    let (job_tx, job_rx) = mpsc::channel::<TestDescriptor>(config.sim_workers);
    let (sim_tx, sim_rx) = mpsc::channel::<TestRecord>(capacity);
    let (record_tx, record_rx) = mpsc::channel::<TestRecord>(capacity);
    let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(capacity);
    let (done_tx, mut done_rx) = mpsc::channel::<usize>(config.check_workers);

    let scheduler = tokio::spawn(schedule(
        config.include_dir.clone(),
        tests,
        job_tx,
        result_tx.clone(),
    ));
    let sim_supervisor = spawn_simulation_pool(simulator, config.sim_workers, job_rx, sim_tx);
    let aggregator = tokio::spawn(aggregate(sim_rx, record_tx));
    let check_supervisor = spawn_check_pool(config.check_workers, record_rx, result_tx, done_tx);

    let mut reporter = Reporter::new(out);
    reporter
        .collect(&mut result_rx, &mut done_rx, config.check_workers)
        .await?;

    let (scheduled, aggregated) = futures::future::join(scheduler, aggregator).await;
    let (simulated, checked) = futures::future::join(sim_supervisor, check_supervisor).await;
    // a failure reported by the scheduler after the last check worker
    // finished is still queued
    reporter.drain_pending(&mut result_rx)?;
    let summary = reporter.finish()?;

    scheduled?;
    aggregated?;
    simulated??;
    checked??;
    Ok(summary)
}
