//! simtest - regression harness for particle simulators
//!
//! ## Commands
//!
//! - `list`: show the available tests with their selection index
//! - `categories`: show every keyword and how many tests carry it
//! - `describe`: print the description of selected tests
//! - `clean`: delete the output sandboxes of selected tests
//! - `run`: run selected tests and stream the check report

mod selection;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simtest_core::config::DEFAULT_CONFIG_FILE;
use simtest_core::{load_descriptor, Config};
use tracing::{debug, info, warn, Level};

use selection::{discover_tests, select, test_name};

#[derive(Parser)]
#[command(name = "simtest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regression test harness for particle simulators", long_about = None)]
struct Cli {
    /// Harness configuration file
    #[arg(long, global = true, env = "SIMTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available tests
    List,

    /// List test categories (keywords) with their test counts
    Categories,

    /// Show the description of selected tests
    Describe {
        /// Tests to describe: `all` or indices and ranges such as `0,3:5`
        #[arg(short, long, default_value = "all")]
        select: String,
    },

    /// Remove the output of selected tests
    Clean {
        /// Tests to clean: `all` or indices and ranges such as `0,3:5`
        #[arg(short, long, default_value = "all")]
        select: String,
    },

    /// Run selected tests
    Run {
        /// Tests to run: `all` or indices and ranges such as `0,3:5`
        #[arg(short, long, default_value = "all", conflicts_with = "category")]
        select: String,

        /// Run only tests carrying this keyword
        #[arg(short, long)]
        category: Option<String>,

        /// Number of concurrent simulation jobs
        #[arg(short = 'n', long)]
        sim_workers: Option<usize>,

        /// Number of concurrent check jobs
        #[arg(short = 'm', long)]
        check_workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    simtest_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let tests = discover_tests(&config.test_dir)?;
    debug!(count = tests.len(), dir = %config.test_dir.display(), "Discovered tests");

    match cli.command {
        Commands::List => cmd_list(&tests),
        Commands::Categories => cmd_categories(&config, &tests),
        Commands::Describe { select: sel } => cmd_describe(&config, &select(&tests, &sel)),
        Commands::Clean { select: sel } => cmd_clean(&select(&tests, &sel)),
        Commands::Run {
            select: sel,
            category,
            sim_workers,
            check_workers,
        } => {
            let chosen = match category {
                Some(category) => by_category(&config, &tests, &category),
                None => select(&tests, &sel),
            };
            let config = config.with_workers(sim_workers, check_workers);
            cmd_run(&config, chosen).await
        }
    }
}

/// An explicit path must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).context("Failed to load configuration"),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                Config::load(default).context("Failed to load configuration")
            } else {
                debug!("No {DEFAULT_CONFIG_FILE} found; using defaults");
                Ok(Config::default())
            }
        }
    }
}

fn cmd_list(tests: &[PathBuf]) -> Result<()> {
    println!("Available tests:");
    println!("----------------");
    for (i, test) in tests.iter().enumerate() {
        println!("[{i}] {}", test_name(test));
    }
    Ok(())
}

/// Keyword counts over every test whose description loads.
fn categories(config: &Config, tests: &[PathBuf]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for test in tests {
        match load_descriptor(test, &config.include_dir) {
            Ok(descriptor) => {
                for keyword in descriptor.keywords {
                    *counts.entry(keyword).or_insert(0) += 1;
                }
            }
            Err(e) => warn!(test = %test.display(), error = %e, "Skipping test"),
        }
    }
    counts
}

fn cmd_categories(config: &Config, tests: &[PathBuf]) -> Result<()> {
    println!("Available categories:");
    println!("---------------------");
    for (keyword, count) in categories(config, tests) {
        println!("{keyword:<30} ({count} tests)");
    }
    Ok(())
}

fn by_category(config: &Config, tests: &[PathBuf], category: &str) -> Vec<PathBuf> {
    tests
        .iter()
        .filter(|test| match load_descriptor(test, &config.include_dir) {
            Ok(descriptor) => descriptor.keywords.iter().any(|k| k == category),
            Err(e) => {
                warn!(test = %test.display(), error = %e, "Skipping test");
                false
            }
        })
        .cloned()
        .collect()
}

fn cmd_describe(config: &Config, tests: &[PathBuf]) -> Result<()> {
    for test in tests {
        let name = test_name(test);
        match load_descriptor(test, &config.include_dir) {
            Ok(descriptor) => {
                println!("{name}:");
                println!("    {}", descriptor.description.trim());
                if !descriptor.keywords.is_empty() {
                    println!("    keywords: {}", descriptor.keywords.join(", "));
                }
                println!();
            }
            Err(e) => println!("{name}:\n    Error parsing test description: {e}\n"),
        }
    }
    Ok(())
}

fn cmd_clean(tests: &[PathBuf]) -> Result<()> {
    simtest_pipeline::clean_output(tests).context("Failed to clean test output")?;
    info!(count = tests.len(), "Cleaned test output");
    Ok(())
}

/// Check failures only show in the report; they do not change the exit
/// status.
async fn cmd_run(config: &Config, tests: Vec<PathBuf>) -> Result<()> {
    if tests.is_empty() {
        warn!("No tests selected");
        return Ok(());
    }
    let pipeline = config.pipeline().context("Invalid configuration")?;
    info!(
        tests = tests.len(),
        simulator = %pipeline.simulator_path.display(),
        "Running tests"
    );
    simtest_pipeline::run_tests(&pipeline, tests, std::io::stdout())
        .await
        .context("Test run failed")?;
    Ok(())
}
