//! simtest pipeline
//!
//! Runs loaded tests through the simulator and the check catalogue:
//! scheduler -> simulation pool -> aggregator -> check pool -> reporter.
//! Stages talk over bounded `tokio::sync::mpsc` queues; each pool is closed
//! by a supervisor once all of its workers have signalled completion.

pub mod aggregator;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod pool;
pub mod reporter;
pub mod sandbox;
pub mod scheduler;

pub use error::{ExecError, PipelineError, Result};
pub use executor::{ProcessSimulator, Simulator};
pub use pipeline::{run_tests, run_tests_with};
pub use reporter::{Reporter, RunSummary};
pub use sandbox::clean_output;
