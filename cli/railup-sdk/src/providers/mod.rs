use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::utils::CommandExt;

pub mod conda;
pub mod fetcher;
pub mod pip;
pub mod prereqs;
pub mod runtime;

/// Exit status POSIX shells use for "command not found". Failures with this
/// status are environment problems, not resource problems, so they skip the
/// hardware requirements hint.
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run `{0}`: {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("`{command}` failed with exit code {code}")]
    Status { command: String, code: i32 },
    #[error("`{command}` failed with exit code {code}\n  stdout: {stdout}\n  stderr: {stderr}")]
    BadExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
}

impl ExecError {
    /// The child's exit code, if it ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Spawn(..) => None,
            ExecError::Status { code, .. } | ExecError::BadExit { code, .. } => Some(*code),
        }
    }
}

/// How provider subprocesses run.
///
/// Every mutating provider command goes through one of the `run_*` methods so
/// that command echo and dry-run short-circuiting happen in exactly one
/// place. Each command is echoed before it runs; in dry-run mode it is
/// printed as a `# ` comment instead and nothing executes. Read-only
/// [Runner::probe]s execute even during a dry run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner {
    /// Print commands as comments instead of executing them.
    pub dry_run: bool,
    /// Pass subprocess output through instead of keeping things quiet.
    pub verbose: bool,
}

impl Runner {
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Runner { dry_run, verbose }
    }

    fn announce(&self, command: &Command) {
        println!("`{}`", command.display());
    }

    /// Print `command` as the comment a dry run leaves behind.
    pub fn comment(&self, command: &Command) {
        println!("# {}", command.display());
    }

    /// Run with output capture decided by verbosity: verbose runs stream,
    /// quiet runs capture and only surface output in the error.
    pub fn run(&self, command: &mut Command) -> Result<(), ExecError> {
        if self.verbose {
            self.run_streaming(command)
        } else {
            self.run_quiet(command)
        }
    }

    /// Run with the child inheriting stdout/stderr.
    pub fn run_streaming(&self, command: &mut Command) -> Result<(), ExecError> {
        if self.dry_run {
            self.comment(command);
            return Ok(());
        }
        self.announce(command);
        debug!("running {}", command.display());

        let status = command
            .status()
            .map_err(|err| ExecError::Spawn(command.display().to_string(), err))?;
        if !status.success() {
            return Err(ExecError::Status {
                command: command.display().to_string(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    /// Run with output captured; on failure the captured output is part of
    /// the error.
    pub fn run_quiet(&self, command: &mut Command) -> Result<(), ExecError> {
        if self.dry_run {
            self.comment(command);
            return Ok(());
        }
        self.announce(command);
        debug!("running {}", command.display());

        let output = command
            .output()
            .map_err(|err| ExecError::Spawn(command.display().to_string(), err))?;
        if !output.status.success() {
            return Err(ExecError::BadExit {
                command: command.display().to_string(),
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run a read-only probe and return its stdout.
    ///
    /// Probes observe the system without changing it, so they execute even
    /// in dry-run mode; the dry run would be useless if version checks and
    /// environment listings came back empty.
    pub fn probe(&self, command: &mut Command) -> Result<String, ExecError> {
        self.announce(command);
        debug!("probing {}", command.display());

        let output = command
            .output()
            .map_err(|err| ExecError::Spawn(command.display().to_string(), err))?;
        if !output.status.success() {
            return Err(ExecError::BadExit {
                command: command.display().to_string(),
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // absolute path so concurrent tests rewriting $PATH cannot interfere
    fn bash(script: &str) -> Command {
        let mut command = Command::new("/bin/bash");
        command.args(["-c", script]);
        command
    }

    #[test]
    fn dry_run_does_not_execute() {
        let runner = Runner::new(true, false);
        // would fail if it actually ran
        let mut command = bash("exit 1");
        runner.run(&mut command).unwrap();
        runner.run_streaming(&mut command).unwrap();
    }

    #[test]
    fn probe_returns_stdout() {
        let runner = Runner::default();
        let mut command = bash("echo hello");
        assert_eq!(runner.probe(&mut command).unwrap(), "hello\n");
    }

    #[test]
    fn quiet_failures_carry_output_and_code() {
        let runner = Runner::default();
        let mut command = bash("echo so much for that >&2; exit 3");
        let err = runner.run_quiet(&mut command).unwrap_err();
        match err {
            ExecError::BadExit { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "so much for that");
            },
            other => panic!("expected BadExit, got {other:?}"),
        }
        assert_eq!(
            runner.run_quiet(&mut command).unwrap_err().exit_code(),
            Some(3)
        );
    }
}
