//! Merges per-seed simulation records back into one record per test.

use std::collections::HashMap;

use simtest_core::{RunId, SimResult, TestRecord};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

/// Per-run accumulation state. Owned by the single aggregator task.
#[derive(Debug, Default)]
pub struct Aggregator {
    pending: HashMap<RunId, (usize, Vec<SimResult>)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one per-seed record. Returns the merged record once every seed
    /// of its run has arrived; single-seed records pass straight through.
    pub fn accept(&mut self, record: TestRecord) -> Option<TestRecord> {
        let expected = record.descriptor.run.seed_count();
        if expected == 1 {
            return Some(record);
        }

        let run_id = record.descriptor.run.run_id;
        let (received, results) = self.pending.entry(run_id).or_default();
        *received += 1;
        results.extend(record.sim_results);
        debug!(%run_id, received = *received, expected, "Accumulated seed");

        if *received < expected {
            return None;
        }
        let (_, sim_results) = self.pending.remove(&run_id)?;
        Some(TestRecord {
            descriptor: record.descriptor,
            sim_results,
        })
    }

    /// Runs that are still waiting for seeds.
    pub fn incomplete(&self) -> usize {
        self.pending.len()
    }
}

/// Forward merged records from `input` to `output` until `input` closes,
/// then close `output`.
#[instrument(skip_all)]
pub async fn aggregate(mut input: mpsc::Receiver<TestRecord>, output: mpsc::Sender<TestRecord>) {
    let mut aggregator = Aggregator::new();
    let mut forwarded = 0usize;
    while let Some(record) = input.recv().await {
        let Some(merged) = aggregator.accept(record) else {
            continue;
        };
        info!(test = %merged.descriptor.path.display(), results = merged.sim_results.len(), "Aggregation complete");
        forwarded += 1;
        if output.send(merged).await.is_err() {
            break;
        }
    }
    info!(forwarded, incomplete = aggregator.incomplete(), "Aggregator finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtest_core::{CheckSpec, RunSpec, TestDescriptor};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn record(name: &str, run_id: RunId, num_seeds: usize, seed: u64, ok: bool) -> TestRecord {
        let descriptor = TestDescriptor {
            path: PathBuf::from(name),
            description: String::new(),
            keywords: vec![],
            includes: vec![],
            run: RunSpec {
                input_files: vec!["a.mdl".into()],
                num_seeds,
                commandline_opts: vec![],
                seed,
                run_id,
            },
            checks: Arc::from(vec![CheckSpec::SimSuccess]),
        };
        let result = if ok {
            SimResult::ok()
        } else {
            SimResult::failed(format!("seed {seed}"), String::new(), 1)
        };
        TestRecord {
            descriptor,
            sim_results: vec![result],
        }
    }

    #[test]
    fn test_single_seed_passes_through() {
        let mut agg = Aggregator::new();
        let merged = agg.accept(record("a", RunId::new(), 1, 42, true)).unwrap();
        assert_eq!(merged.sim_results.len(), 1);
        assert_eq!(agg.incomplete(), 0);
    }

    #[test]
    fn test_multi_seed_merges_once_in_any_order() {
        let mut agg = Aggregator::new();
        let run = RunId::new();
        assert!(agg.accept(record("a", run, 3, 3, true)).is_none());
        assert!(agg.accept(record("a", run, 3, 1, false)).is_none());
        let merged = agg.accept(record("a", run, 3, 2, true)).unwrap();

        assert_eq!(merged.sim_results.len(), 3);
        assert_eq!(merged.sim_results.iter().filter(|r| !r.success).count(), 1);
        assert_eq!(agg.incomplete(), 0);
    }

    #[test]
    fn test_interleaved_runs_accumulate_separately() {
        let mut agg = Aggregator::new();
        let (a, b) = (RunId::new(), RunId::new());
        assert!(agg.accept(record("a", a, 2, 1, true)).is_none());
        assert!(agg.accept(record("b", b, 2, 1, false)).is_none());
        assert_eq!(agg.incomplete(), 2);

        let merged_b = agg.accept(record("b", b, 2, 2, false)).unwrap();
        assert_eq!(merged_b.descriptor.path, PathBuf::from("b"));
        assert!(merged_b.sim_results.iter().all(|r| !r.success));

        let merged_a = agg.accept(record("a", a, 2, 2, true)).unwrap();
        assert!(merged_a.sim_results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_aggregate_closes_output_with_input() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let task = tokio::spawn(aggregate(in_rx, out_tx));

        let run = RunId::new();
        in_tx.send(record("a", run, 2, 1, true)).await.unwrap();
        in_tx.send(record("b", RunId::new(), 1, 9, true)).await.unwrap();
        in_tx.send(record("a", run, 2, 2, true)).await.unwrap();
        // never completed
        in_tx.send(record("c", RunId::new(), 2, 1, true)).await.unwrap();
        drop(in_tx);

        let mut names = Vec::new();
        while let Some(r) = out_rx.recv().await {
            names.push(r.descriptor.path);
        }
        task.await.unwrap();
        assert_eq!(names, vec![PathBuf::from("b"), PathBuf::from("a")]);
    }
}
