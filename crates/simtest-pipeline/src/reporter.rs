//! Streams check results to the user and keeps the tallies.

use std::io::{self, Write};

use serde::Serialize;
use simtest_core::CheckResult;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Final tallies of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failures: Vec<CheckResult>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed()
    }
}

fn test_name(result: &CheckResult) -> String {
    result
        .test_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| result.test_path.display().to_string())
}

/// Writes one aligned line per result as it arrives.
pub struct Reporter<W: Write> {
    out: W,
    summary: RunSummary,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            summary: RunSummary::default(),
        }
    }

    /// Print and tally one result.
    pub fn record(&mut self, result: CheckResult) -> io::Result<()> {
        let name = test_name(&result);
        if result.success {
            writeln!(self.out, "{name:<43} ::   {:<25}       [SUCCESS]", result.kind)?;
            self.summary.passed += 1;
        } else {
            writeln!(self.out, "{name:<43} ::   {:<25}    ***[FAILURE]***", result.kind)?;
            if !result.message.is_empty() {
                writeln!(self.out, "\t ERROR:  {}", result.message)?;
            }
            self.summary.failures.push(result);
        }
        self.out.flush()
    }

    /// Record everything already queued without waiting for more.
    pub fn drain_pending(&mut self, results: &mut mpsc::Receiver<CheckResult>) -> io::Result<usize> {
        let mut drained = 0;
        while let Ok(result) = results.try_recv() {
            self.record(result)?;
            drained += 1;
        }
        Ok(drained)
    }

    /// Record results until `workers` completion signals have arrived on
    /// `done`, then pick up whatever was queued before the last signal.
    ///
    /// Results and completion signals travel on separate channels, so the
    /// final non-blocking drain is required: a worker's last results can
    /// still be queued when its signal is observed.
    pub async fn collect(
        &mut self,
        results: &mut mpsc::Receiver<CheckResult>,
        done: &mut mpsc::Receiver<usize>,
        workers: usize,
    ) -> io::Result<()> {
        let mut finished = 0;
        while finished < workers {
            tokio::select! {
                Some(result) = results.recv() => self.record(result)?,
                signal = done.recv() => match signal {
                    Some(worker) => {
                        finished += 1;
                        debug!(worker, finished, "Check worker done");
                    }
                    None => break,
                },
            }
        }
        let late = self.drain_pending(results)?;
        debug!(late, "Drained remaining results");
        Ok(())
    }

    /// Print the summary block and hand back the tallies.
    pub fn finish(mut self) -> io::Result<RunSummary> {
        let summary = self.summary;
        writeln!(self.out, "{}", "-".repeat(86))?;
        writeln!(
            self.out,
            "{} checks passed, {} checks failed",
            summary.passed,
            summary.failed()
        )?;
        for failure in &summary.failures {
            writeln!(self.out, "    {} :: {}", test_name(failure), failure.kind)?;
        }
        self.out.flush()?;
        info!(passed = summary.passed, failed = summary.failed(), "Run finished");
        Ok(summary)
    }
}
