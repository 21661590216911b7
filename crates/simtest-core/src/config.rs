//! Harness configuration.
//!
//! [`Config`] is what `simtest.toml` holds; [`PipelineConfig`] is the subset
//! the pipeline needs, validated and passed explicitly to its entry point.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "simtest.toml";

/// Default size of both worker pools.
pub const DEFAULT_WORKERS: usize = 2;

/// On-disk harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Path to the simulation binary.
    pub simulator_path: PathBuf,

    /// Directory containing one sub-directory per test.
    pub test_dir: PathBuf,

    /// Directory containing includable descriptor fragments.
    pub include_dir: PathBuf,

    /// Number of concurrent simulation workers.
    pub sim_workers: usize,

    /// Number of concurrent check workers.
    pub check_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulator_path: PathBuf::from("mcell"),
            test_dir: PathBuf::from("tests"),
            include_dir: PathBuf::from("includes"),
            sim_workers: DEFAULT_WORKERS,
            check_workers: DEFAULT_WORKERS,
        }
    }
}

impl Config {
    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override the worker counts when given.
    pub fn with_workers(mut self, sim_workers: Option<usize>, check_workers: Option<usize>) -> Self {
        if let Some(n) = sim_workers {
            self.sim_workers = n;
        }
        if let Some(m) = check_workers {
            self.check_workers = m;
        }
        self
    }

    /// Validate and convert into the value threaded through the pipeline.
    pub fn pipeline(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::new(
            self.simulator_path.clone(),
            self.include_dir.clone(),
            self.sim_workers,
            self.check_workers,
        )
    }
}

/// Everything the pipeline needs to run, with both pool sizes validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub simulator_path: PathBuf,
    pub include_dir: PathBuf,
    pub sim_workers: usize,
    pub check_workers: usize,
}

impl PipelineConfig {
    pub fn new(
        simulator_path: PathBuf,
        include_dir: PathBuf,
        sim_workers: usize,
        check_workers: usize,
    ) -> Result<Self, ConfigError> {
        if sim_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount { pool: "simulation" });
        }
        if check_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount { pool: "check" });
        }
        Ok(Self {
            simulator_path,
            include_dir,
            sim_workers,
            check_workers,
        })
    }
}
