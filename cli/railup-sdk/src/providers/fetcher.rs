use std::fmt::Display;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use super::{ExecError, Runner};
use crate::utils::find_in_path;

static WGET_BIN: LazyLock<String> =
    LazyLock::new(|| std::env::var("RAILUP_WGET").unwrap_or_else(|_| "wget".to_string()));
static CURL_BIN: LazyLock<String> =
    LazyLock::new(|| std::env::var("RAILUP_CURL").unwrap_or_else(|_| "curl".to_string()));

/// The download tool used for installer assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetcher {
    Wget,
    Curl,
}

/// `bin` may be a bare name to look up on `$PATH` or a path.
fn available(bin: &str) -> bool {
    if bin.contains('/') {
        Path::new(bin).is_file()
    } else {
        find_in_path(bin).is_some()
    }
}

impl Fetcher {
    /// Pick a download tool, preferring wget when both are present.
    pub fn detect() -> Option<Fetcher> {
        if available(&WGET_BIN) {
            return Some(Fetcher::Wget);
        }
        if available(&CURL_BIN) {
            return Some(Fetcher::Curl);
        }
        None
    }

    fn bin(&self) -> &str {
        match self {
            Fetcher::Wget => &WGET_BIN,
            Fetcher::Curl => &CURL_BIN,
        }
    }

    /// The download command. Progress bars stay on unless `verbose` already
    /// passes the tool's full output through.
    pub fn command(&self, url: &str, output: &Path, verbose: bool) -> Command {
        let mut command = Command::new(self.bin());
        command.arg(url);
        match self {
            Fetcher::Curl => {
                command.arg("--location").arg("--output").arg(output);
                if !verbose {
                    command.arg("--progress-bar");
                }
            },
            Fetcher::Wget => {
                command.arg("--output-document").arg(output);
                if !verbose {
                    command.args(["--quiet", "--show-progress"]);
                }
            },
        }
        command
    }

    /// Download `url` to `output`.
    pub fn fetch(&self, url: &str, output: &Path, runner: &Runner) -> Result<(), ExecError> {
        let mut command = self.command(url, output, runner.verbose);
        runner.run_streaming(&mut command)
    }
}

impl Display for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetcher::Wget => write!(f, "wget"),
            Fetcher::Curl => write!(f, "curl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::CommandExt;

    #[test]
    fn curl_command_shape() {
        let command = Fetcher::Curl.command(
            "https://example.org/installer.sh",
            Path::new("/tmp/installer.sh"),
            false,
        );
        assert_eq!(
            command.display().to_string(),
            format!(
                "{} 'https://example.org/installer.sh' --location --output /tmp/installer.sh --progress-bar",
                *CURL_BIN
            )
        );
    }

    #[test]
    fn wget_command_shape() {
        let command = Fetcher::Wget.command(
            "https://example.org/installer.sh",
            Path::new("/tmp/installer.sh"),
            true,
        );
        assert_eq!(
            command.display().to_string(),
            format!(
                "{} 'https://example.org/installer.sh' --output-document /tmp/installer.sh",
                *WGET_BIN
            )
        );
    }

    #[test]
    fn detection_prefers_wget() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wget"), "").unwrap();
        std::fs::write(dir.path().join("curl"), "").unwrap();
        temp_env::with_var("PATH", Some(dir.path()), || {
            assert_eq!(Fetcher::detect(), Some(Fetcher::Wget));
        });

        let curl_only = tempfile::tempdir().unwrap();
        std::fs::write(curl_only.path().join("curl"), "").unwrap();
        temp_env::with_var("PATH", Some(curl_only.path()), || {
            assert_eq!(Fetcher::detect(), Some(Fetcher::Curl));
        });

        let empty = tempfile::tempdir().unwrap();
        temp_env::with_var("PATH", Some(empty.path()), || {
            assert_eq!(Fetcher::detect(), None);
        });
    }
}
