//! simtest core library
//!
//! Everything a test run needs that does not involve concurrency:
//! - `config`: harness configuration (simulator path, test and include dirs)
//! - `descriptor`: the in-memory test description and its loader
//! - `data`: loaders for columnar simulator output
//! - `paths`: sandbox layout and data-file path resolution
//! - `checks`: the check catalogue and its dispatch by kind

pub mod checks;
pub mod config;
pub mod data;
pub mod descriptor;
pub mod error;
pub mod paths;
pub mod telemetry;

pub use checks::{run_check, CheckOutcome, CheckResult};
pub use config::{Config, PipelineConfig};
pub use descriptor::{
    load_descriptor, CheckSpec, RunId, RunSpec, SimResult, TestDescriptor, TestRecord,
};
pub use error::{CheckError, ConfigError, DataError, DescriptorError, PathError};
pub use telemetry::init_tracing;
