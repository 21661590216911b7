//! Error taxonomy for descriptor loading, data loading and checks.

use std::path::PathBuf;

/// Errors produced while loading a test description.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("no test description found in {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("include '{name}' not found in {dir}")]
    IncludeNotFound { name: String, dir: PathBuf },

    #[error("include cycle detected: {}", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("include depth limit of {limit} exceeded while including '{name}'")]
    IncludeDepth { name: String, limit: usize },
}

/// Errors produced while reading harness configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{pool} worker count must be at least 1")]
    InvalidWorkerCount { pool: &'static str },
}

/// Errors produced while loading columnar simulation output.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: invalid time value '{value}' in line {line}")]
    BadTime {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("{path}: invalid count value '{value}' in line {line}")]
    BadCount {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("{path}: line {line} has {found} columns (expected {expected})")]
    Ragged {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{0}: contains no data")]
    Empty(PathBuf),

    #[error("{path}: shape differs from {first} and cannot be averaged")]
    ShapeMismatch { path: PathBuf, first: PathBuf },

    #[error("{0}: counts overflow while averaging")]
    Overflow(PathBuf),
}

/// Errors produced while resolving data-file paths.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("datafile {0} has too many format specifiers")]
    TooManySpecifiers(String),

    #[error("unsupported format specifier in {0}")]
    BadSpecifier(String),

    #[error("failed to expand glob pattern in {path}: {reason}")]
    Glob { path: String, reason: String },

    #[error("could not construct any valid output files, perhaps due to failed globbing of {0}")]
    NoMatches(String),

    #[error("invalid range item '{0}'")]
    BadRange(String),

    #[error("range item '{range}' expands to more than {limit} values")]
    RangeTooLarge { range: String, limit: usize },
}

/// A failed check. The message is what the reporter prints beneath the
/// failure line.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("failed to open file {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        CheckError::Failed(message.into())
    }
}

pub type DescriptorResult<T> = std::result::Result<T, DescriptorError>;
pub type DataResult<T> = std::result::Result<T, DataError>;
pub type PathResult<T> = std::result::Result<T, PathError>;
