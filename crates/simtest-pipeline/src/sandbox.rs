//! Per-test output sandboxes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use simtest_core::paths::output_dir;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Remove the sandbox of every test. Missing sandboxes are fine.
pub fn clean_output(tests: &[PathBuf]) -> Result<()> {
    for test in tests {
        let out = output_dir(test);
        match std::fs::remove_dir_all(&out) {
            Ok(()) => debug!(path = %out.display(), "Removed sandbox"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(PipelineError::Clean { path: out, source }),
        }
    }
    Ok(())
}

/// Create the sandbox of the test at `test_dir`. The parent must exist and
/// the sandbox itself must not.
pub fn create_sandbox(test_dir: &Path) -> std::io::Result<PathBuf> {
    let out = output_dir(test_dir);
    std::fs::create_dir(&out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_clean_removes_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        fs::create_dir_all(test.join("output/nested")).unwrap();
        fs::write(test.join("output/nested/old.dat"), "0 1\n").unwrap();

        clean_output(&[test.clone(), dir.path().join("never_run")]).unwrap();
        assert!(!test.join("output").exists());

        let out = create_sandbox(&test).unwrap();
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_create_sandbox_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        create_sandbox(dir.path()).unwrap();
        assert!(create_sandbox(dir.path()).is_err());
    }
}
