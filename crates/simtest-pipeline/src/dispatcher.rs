//! Check dispatcher pool.

use std::panic::{catch_unwind, AssertUnwindSafe};

use simtest_core::{run_check, CheckOutcome, CheckResult, CheckSpec, TestRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::pool::{panic_message, supervise, SharedQueue};

/// Run the checks of `record` in declaration order, handing each result to
/// `emit`. Stops after a check that aborts the record, or when `emit`
/// returns `false`. Returns the number of results emitted.
pub fn check_record(record: &TestRecord, emit: impl FnMut(CheckResult) -> bool) -> usize {
    check_record_with(record, run_check, emit)
}

/// [`check_record`] with the check evaluation supplied by the caller. A
/// check that panics becomes a failed result and its siblings still run.
pub fn check_record_with<F>(
    record: &TestRecord,
    evaluate: F,
    mut emit: impl FnMut(CheckResult) -> bool,
) -> usize
where
    F: Fn(&TestRecord, &CheckSpec) -> CheckOutcome,
{
    let path = &record.descriptor.path;
    let mut emitted = 0;
    for check in record.descriptor.checks.iter() {
        let outcome = catch_unwind(AssertUnwindSafe(|| evaluate(record, check)))
            .unwrap_or_else(|payload| {
                let msg = panic_message(payload.as_ref());
                warn!(test = %path.display(), kind = check.kind(), error = %msg, "Check panicked");
                CheckOutcome::Continue(CheckResult::failed(
                    path,
                    check.kind(),
                    format!("check panicked: {msg}"),
                ))
            });
        let abort = outcome.is_abort();
        emitted += 1;
        if !emit(outcome.into_result()) {
            break;
        }
        if abort {
            debug!(test = %path.display(), "Simulation failed; skipping remaining checks");
            break;
        }
    }
    emitted
}

/// Start `workers` check workers on the blocking thread pool. Each worker
/// signals on its own completion; the returned supervisor closes `results`
/// once every worker has. Worker termination signals are also forwarded to
/// `done` for the reporter.
#[instrument(skip_all, fields(workers = workers))]
pub fn spawn_check_pool(
    workers: usize,
    records: mpsc::Receiver<TestRecord>,
    results: mpsc::Sender<CheckResult>,
    done: mpsc::Sender<usize>,
) -> JoinHandle<Result<()>> {
    let queue = SharedQueue::new(records);
    let (done_tx, done_rx) = mpsc::channel(workers.max(1));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let queue = queue.clone();
        let results = results.clone();
        let done_tx = done_tx.clone();
        let done = done.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut checked = 0usize;
            while let Some(record) = queue.blocking_next() {
                debug!(worker, test = %record.descriptor.path.display(), "Checking record");
                let mut open = true;
                check_record(&record, |result| {
                    open = results.blocking_send(result).is_ok();
                    open
                });
                checked += 1;
                if !open {
                    break;
                }
            }
            info!(worker, checked, "Check worker finished");
            let _ = done.blocking_send(worker);
            let _ = done_tx.blocking_send(worker);
        }));
    }
    drop(done_tx);
    drop(done);

    tokio::spawn(supervise("check", handles, done_rx, results))
}
