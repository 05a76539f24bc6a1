//! Subprocess-backed dependency installer.

use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::snapshot::traits::{InstallError, InstallOutput, Installer};

/// Runs an external package installer inside the workspace.
///
/// Defaults to `npm install`. The command blocks until the installer exits
/// and its output is captured into [`InstallOutput`].
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    retries: u32,
}

impl CommandInstaller {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            retries: 0,
        }
    }

    pub fn npm() -> Self {
        Self::new("npm", ["install"])
    }

    /// Re-runs the command up to `retries` more times after a non-zero exit.
    ///
    /// Spawn failures are not retried.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn run_once(&self, workspace: &Path) -> Result<InstallOutput, InstallError> {
        let out = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workspace)
            .output()
            .map_err(|source| InstallError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(InstallOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

impl Default for CommandInstaller {
    fn default() -> Self {
        Self::npm()
    }
}

impl Installer for CommandInstaller {
    fn install(&self, workspace: &Path) -> Result<InstallOutput, InstallError> {
        let mut attempt = 0;
        loop {
            let output = self.run_once(workspace)?;
            debug!(
                program = %self.program,
                attempt,
                exit_code = ?output.exit_code,
                stdout = %output.stdout,
                "Installer exited"
            );
            if output.success() || attempt >= self.retries {
                return Ok(output);
            }
            attempt += 1;
            warn!(
                program = %self.program,
                attempt,
                max_retries = self.retries,
                "Installer failed, retrying"
            );
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}
