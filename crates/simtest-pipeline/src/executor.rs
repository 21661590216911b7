//! Simulator invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use simtest_core::paths::output_dir;
use simtest_core::{SimResult, TestDescriptor};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ExecError;

/// File in the sandbox that records every simulator command line.
pub const COMMANDLINE_FILE: &str = "commandline.txt";

/// Exit code recorded when the process never ran or died from a signal.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Runs every input file of one job and reports one result per file.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn run(&self, job: &TestDescriptor) -> Vec<SimResult>;
}

/// Runs the external simulator binary inside the test's sandbox.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    program: PathBuf,
}

impl ProcessSimulator {
    /// `program` is made absolute when it names a path rather than a bare
    /// command looked up on `PATH`, since the process runs in the sandbox.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let program = if program.components().count() > 1 {
            std::path::absolute(&program).unwrap_or(program)
        } else {
            program
        };
        Self { program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for input file `index` of `job`.
    pub fn arguments(job: &TestDescriptor, index: usize, input: &Path) -> Vec<String> {
        let seed = job.run.seed;
        let mut args = job.run.commandline_opts.clone();
        args.extend([
            "-seed".to_string(),
            seed.to_string(),
            "-logfile".to_string(),
            format!("run_{seed}.{index}.log"),
            "-errfile".to_string(),
            format!("err_{seed}.{index}.log"),
            input.display().to_string(),
        ]);
        args
    }

    async fn run_file(
        &self,
        job: &TestDescriptor,
        sandbox: &Path,
        index: usize,
        file: &str,
    ) -> Result<SimResult, ExecError> {
        let seed = job.run.seed;
        let input = job.path.join(file);
        let input = std::path::absolute(&input).map_err(|source| ExecError::Input {
            path: input.clone(),
            source,
        })?;
        let args = Self::arguments(job, index, &input);

        self.record_command_line(sandbox, &args).await?;

        let stdout_path = sandbox.join(format!("stdout_{seed}.{index}.log"));
        let stderr_path = sandbox.join(format!("stderr_{seed}.{index}.log"));
        let stdout = create_log(&stdout_path)?;
        let stderr = create_log(&stderr_path)?;

        debug!(test = %job.path.display(), seed, file, "Launching simulator");
        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(sandbox)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .await
            .map_err(|source| ExecError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            return Ok(SimResult::ok());
        }

        let code = status.code().unwrap_or(UNKNOWN_EXIT_CODE);
        let errfile = sandbox.join(format!("err_{seed}.{index}.log"));
        let stderr_content = match tokio::fs::read_to_string(&errfile).await {
            Ok(content) if !content.is_empty() => content,
            _ => tokio::fs::read_to_string(&stderr_path)
                .await
                .unwrap_or_default(),
        };
        warn!(test = %job.path.display(), seed, file, code, "Simulator failed");
        Ok(SimResult::failed(
            format!("simulator exited with status {code}"),
            stderr_content,
            code,
        ))
    }

    /// Append the full command line to the sandbox's record and sync it.
    async fn record_command_line(&self, sandbox: &Path, args: &[String]) -> Result<(), ExecError> {
        let path = sandbox.join(COMMANDLINE_FILE);
        let mut line = self.program.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await
        };
        write
            .await
            .map_err(|source| ExecError::CommandLine { path, source })
    }
}

fn create_log(path: &Path) -> Result<std::fs::File, ExecError> {
    std::fs::File::create(path).map_err(|source| ExecError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl Simulator for ProcessSimulator {
    async fn run(&self, job: &TestDescriptor) -> Vec<SimResult> {
        let sandbox = output_dir(&job.path);
        let files = &job.run.input_files;
        let mut results = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            match self.run_file(job, &sandbox, index, file).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(test = %job.path.display(), seed = job.run.seed, error = %e, "Simulation setup failed");
                    results.push(SimResult::failed(e.to_string(), String::new(), UNKNOWN_EXIT_CODE));
                    for skipped in &files[index + 1..] {
                        results.push(SimResult::failed(
                            format!("{skipped} not run"),
                            String::new(),
                            UNKNOWN_EXIT_CODE,
                        ));
                    }
                    break;
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtest_core::{CheckSpec, RunId, RunSpec};
    use std::fs;
    use std::sync::Arc;

    fn job(dir: &Path, files: &[&str], opts: Vec<String>, seed: u64) -> TestDescriptor {
        TestDescriptor {
            path: dir.to_path_buf(),
            description: String::new(),
            keywords: vec![],
            includes: vec![],
            run: RunSpec {
                input_files: files.iter().map(|f| f.to_string()).collect(),
                num_seeds: 1,
                commandline_opts: opts,
                seed,
                run_id: RunId::new(),
            },
            checks: Arc::from(vec![CheckSpec::SimSuccess]),
        }
    }

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("sim.sh");
        fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_arguments_follow_options() {
        let t = job(Path::new("/t"), &["a.mdl"], vec!["-quiet".into()], 12);
        let args = ProcessSimulator::arguments(&t, 1, Path::new("/t/a.mdl"));
        assert_eq!(
            args,
            vec![
                "-quiet", "-seed", "12", "-logfile", "run_12.1.log", "-errfile", "err_12.1.log",
                "/t/a.mdl"
            ]
        );
    }

    #[test]
    fn test_bare_program_is_kept() {
        assert_eq!(ProcessSimulator::new("mcell").program(), Path::new("mcell"));
        assert!(ProcessSimulator::new("bin/mcell").program().is_absolute());
    }

    #[tokio::test]
    async fn test_successful_run_records_command_line_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        fs::create_dir_all(test.join("output")).unwrap();
        let sh = script(dir.path(), "echo hello\necho oops >&2\n");

        let sim = ProcessSimulator::new("/bin/sh");
        let results = sim.run(&job(&test, &["a.mdl", "b.mdl"], vec![sh], 5)).await;
        assert_eq!(results, vec![SimResult::ok(), SimResult::ok()]);

        let out = test.join("output");
        let recorded = fs::read_to_string(out.join(COMMANDLINE_FILE)).unwrap();
        assert_eq!(recorded.lines().count(), 2);
        assert!(recorded.contains("-seed 5 -logfile run_5.0.log"));
        assert!(recorded.contains("err_5.1.log"));
        assert_eq!(fs::read_to_string(out.join("stdout_5.0.log")).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(out.join("stderr_5.1.log")).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        fs::create_dir_all(test.join("output")).unwrap();
        let sh = script(dir.path(), "echo broken >&2\nexit 3\n");

        let sim = ProcessSimulator::new("/bin/sh");
        let results = sim.run(&job(&test, &["a.mdl"], vec![sh], 0)).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].exit_code, 3);
        assert_eq!(results[0].exit_message, "simulator exited with status 3");
        assert_eq!(results[0].stderr_content, "broken\n");
    }

    #[tokio::test]
    async fn test_missing_sandbox_fails_every_input() {
        let dir = tempfile::tempdir().unwrap();
        let sim = ProcessSimulator::new("/bin/sh");
        let results = sim
            .run(&job(dir.path(), &["a.mdl", "b.mdl", "c.mdl"], vec![], 1))
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.exit_code == UNKNOWN_EXIT_CODE));
        assert!(results[0].exit_message.contains(COMMANDLINE_FILE));
        assert_eq!(results[2].exit_message, "c.mdl not run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_sandbox_fails_every_input() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        fs::create_dir_all(&out).unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o555)).unwrap();
        // permission bits do not bind a privileged user
        if fs::write(out.join("writable"), "").is_ok() {
            fs::set_permissions(&out, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let sim = ProcessSimulator::new("/bin/sh");
        let results = sim
            .run(&job(dir.path(), &["a.mdl", "b.mdl"], vec![], 1))
            .await;
        fs::set_permissions(&out, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.exit_code == UNKNOWN_EXIT_CODE));
        assert!(results[0].exit_message.contains(COMMANDLINE_FILE));
        assert_eq!(results[1].exit_message, "b.mdl not run");
        assert!(!out.join(COMMANDLINE_FILE).exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("output")).unwrap();
        let sim = ProcessSimulator::new(dir.path().join("no-such-simulator"));
        let results = sim.run(&job(dir.path(), &["a.mdl"], vec![], 1)).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].exit_message.starts_with("failed to launch"));
    }
}
