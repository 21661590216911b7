//! Worker-pool plumbing shared by the simulation and check stages, plus the
//! simulation executor pool itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use simtest_core::{SimResult, TestDescriptor, TestRecord};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::executor::{Simulator, UNKNOWN_EXIT_CODE};

/// A bounded queue drained by several workers.
pub struct SharedQueue<T>(Arc<Mutex<mpsc::Receiver<T>>>);

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> SharedQueue<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self(Arc::new(Mutex::new(rx)))
    }

    /// Next item, or `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<T> {
        self.0.lock().await.recv().await
    }

    /// Blocking variant for workers running on the blocking thread pool.
    /// Must not be called from an async context.
    pub fn blocking_next(&self) -> Option<T> {
        self.0.blocking_lock().blocking_recv()
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Wait for a termination signal from each of `workers`, then drop `output`
/// so the downstream stage sees the queue close only after every writer is
/// done. A worker that dies without signalling closes `done` early, which
/// ends the wait as well. Workers that panicked are reported as an error
/// once the output queue is closed.
pub async fn supervise<T>(
    stage: &'static str,
    workers: Vec<JoinHandle<()>>,
    mut done: mpsc::Receiver<usize>,
    output: mpsc::Sender<T>,
) -> Result<()> {
    let mut finished = 0;
    while finished < workers.len() {
        match done.recv().await {
            Some(worker) => {
                finished += 1;
                debug!(stage, worker, finished, "Worker finished");
            }
            None => break,
        }
    }
    drop(output);
    info!(stage, workers = workers.len(), "All workers finished; closing output queue");

    let mut panicked = 0;
    for (worker, handle) in workers.into_iter().enumerate() {
        if let Err(e) = handle.await {
            warn!(stage, worker, error = %e, "Worker terminated abnormally");
            panicked += 1;
        }
    }
    if panicked > 0 {
        return Err(PipelineError::WorkerPanicked { stage, panicked });
    }
    Ok(())
}

/// Start `workers` simulation workers draining `jobs`. Every job is
/// forwarded to `output` exactly once, carrying its per-file results.
/// `output` is closed by the returned supervisor once all workers are done.
/// A simulator that panics yields a single failed result for its job.
#[instrument(skip_all, fields(workers = workers))]
pub fn spawn_simulation_pool(
    simulator: Arc<dyn Simulator>,
    workers: usize,
    jobs: mpsc::Receiver<TestDescriptor>,
    output: mpsc::Sender<TestRecord>,
) -> JoinHandle<Result<()>> {
    let queue = SharedQueue::new(jobs);
    let (done_tx, done_rx) = mpsc::channel(workers.max(1));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let queue = queue.clone();
        let simulator = Arc::clone(&simulator);
        let output = output.clone();
        let done = done_tx.clone();
        handles.push(tokio::spawn(async move {
            while let Some(job) = queue.next().await {
                info!(worker, test = %job.path.display(), seed = job.run.seed, "Running simulation");
                let sim_results = match AssertUnwindSafe(simulator.run(&job)).catch_unwind().await {
                    Ok(results) => results,
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        warn!(worker, test = %job.path.display(), error = %msg, "Simulator panicked");
                        vec![SimResult::failed(
                            format!("simulator panicked: {msg}"),
                            String::new(),
                            UNKNOWN_EXIT_CODE,
                        )]
                    }
                };
                let record = TestRecord {
                    descriptor: job,
                    sim_results,
                };
                if output.send(record).await.is_err() {
                    break;
                }
            }
            // the supervisor only listens until every worker reported
            let _ = done.send(worker).await;
        }));
    }
    drop(done_tx);

    tokio::spawn(supervise("simulation", handles, done_rx, output))
}
