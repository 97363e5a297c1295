//! Subprocess runner for script-produced tables.
//!
//! The script body is written to a scratch file, marked executable, and run
//! with stdout and stderr redirected to sibling files. A non-zero exit
//! status surfaces the captured stderr text.

use std::fs;
use std::process::Command;

use tracing::debug;

use crate::error::{BackendError, Result};
use crate::traits::{ScriptOutput, ScriptRunner};

/// Runs scripts as local child processes.
#[derive(Debug, Default)]
pub struct LocalScriptRunner;

impl LocalScriptRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptRunner for LocalScriptRunner {
    fn run(&self, script: &str) -> Result<ScriptOutput> {
        let scratch = tempfile::tempdir()?;
        let script_path = scratch.path().join("script");
        let stdout_path = scratch.path().join("stdout");
        let stderr_path = scratch.path().join("stderr");

        fs::write(&script_path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o700))?;
        }

        debug!(script = %script_path.display(), "running table script");
        let status = Command::new(&script_path)
            .stdout(fs::File::create(&stdout_path)?)
            .stderr(fs::File::create(&stderr_path)?)
            .status()?;

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(BackendError::Script {
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(ScriptOutput {
            stdout_path,
            scratch,
        })
    }
}
