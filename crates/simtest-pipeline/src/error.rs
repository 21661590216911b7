//! Pipeline errors.

use std::path::PathBuf;

/// Failures that stop a pipeline run. Per-test and per-check failures never
/// surface here; they become failed check results instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to clean output of {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),

    #[error("pipeline stage panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{panicked} {stage} worker(s) panicked")]
    WorkerPanicked { stage: &'static str, panicked: usize },
}

/// Setup failures of a single simulator invocation.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to record command line in {path}: {source}")]
    CommandLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve input file {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
