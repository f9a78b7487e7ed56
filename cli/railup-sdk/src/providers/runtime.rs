use std::fmt::Display;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ExecError, Runner};
use crate::utils::find_in_path;

static DOCKER_BIN: LazyLock<String> =
    LazyLock::new(|| std::env::var("RAILUP_DOCKER").unwrap_or_else(|_| "docker".to_string()));
static PODMAN_BIN: LazyLock<String> =
    LazyLock::new(|| std::env::var("RAILUP_PODMAN").unwrap_or_else(|_| "podman".to_string()));

/// The runtime a recipe is built into an image with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

fn available(bin: &str) -> bool {
    if bin.contains('/') {
        Path::new(bin).is_file()
    } else {
        find_in_path(bin).is_some()
    }
}

impl ContainerRuntime {
    /// Pick a runtime, preferring docker when both are present.
    pub fn detect() -> Option<ContainerRuntime> {
        if available(&DOCKER_BIN) {
            return Some(ContainerRuntime::Docker);
        }
        if available(&PODMAN_BIN) {
            return Some(ContainerRuntime::Podman);
        }
        None
    }

    fn bin(&self) -> &str {
        match self {
            ContainerRuntime::Docker => &DOCKER_BIN,
            ContainerRuntime::Podman => &PODMAN_BIN,
        }
    }

    /// The build command, with the recipe expected at `Dockerfile` inside
    /// the context directory.
    pub fn build_command(&self, context_dir: &Path, tag: &str) -> Command {
        let mut command = Command::new(self.bin());
        command.arg("build").args(["--tag", tag]).arg(context_dir);
        command
    }

    /// Build the context directory into a tagged image.
    pub fn build(&self, context_dir: &Path, tag: &str, runner: &Runner) -> Result<(), ExecError> {
        runner.run_streaming(&mut self.build_command(context_dir, tag))
    }
}

impl Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerRuntime::Docker => write!(f, "docker"),
            ContainerRuntime::Podman => write!(f, "podman"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown container runtime `{0}`, expected docker or podman")]
pub struct ParseRuntimeError(String);

impl FromStr for ContainerRuntime {
    type Err = ParseRuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(ContainerRuntime::Docker),
            "podman" => Ok(ContainerRuntime::Podman),
            other => Err(ParseRuntimeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::CommandExt;

    #[test]
    fn runtimes_parse_from_their_names() {
        assert_eq!("docker".parse(), Ok(ContainerRuntime::Docker));
        assert_eq!("podman".parse(), Ok(ContainerRuntime::Podman));
        assert!("containerd".parse::<ContainerRuntime>().is_err());
    }

    #[test]
    fn build_command_shape() {
        let command =
            ContainerRuntime::Podman.build_command(Path::new("/tmp/context"), "railup-rail:latest");
        assert_eq!(
            command.display().to_string(),
            format!(
                "{} build --tag 'railup-rail:latest' /tmp/context",
                *PODMAN_BIN
            )
        );

        // a dry run only prints the command
        let runner = Runner::new(true, false);
        ContainerRuntime::Podman
            .build(Path::new("/tmp/context"), "railup-rail:latest", &runner)
            .unwrap();
    }

    #[test]
    fn detection_prefers_docker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker"), "").unwrap();
        std::fs::write(dir.path().join("podman"), "").unwrap();
        temp_env::with_var("PATH", Some(dir.path()), || {
            assert_eq!(ContainerRuntime::detect(), Some(ContainerRuntime::Docker));
        });

        let podman_only = tempfile::tempdir().unwrap();
        std::fs::write(podman_only.path().join("podman"), "").unwrap();
        temp_env::with_var("PATH", Some(podman_only.path()), || {
            assert_eq!(ContainerRuntime::detect(), Some(ContainerRuntime::Podman));
        });
    }
}
