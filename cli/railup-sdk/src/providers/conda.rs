//! Driving conda-compatible environment managers.
//!
//! All manager invocations funnel through [`CondaProvider::manager_command`]:
//! when the manager has an activation script the command is wrapped in
//! `. {script} && ...` so it works even before the user's shell has been
//! initialized for it.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Command;

use itertools::Itertools;
use semver::Version;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::fetcher::Fetcher;
use super::{ExecError, Runner};
use crate::models::lockfile::EnvSpec;
use crate::models::manager::{ManagerFlavor, ParseVersionError};
use crate::models::platform::Platform;
use crate::utils::find_in_path;

#[derive(Debug, Error)]
pub enum CondaError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(
        "requested installation of `{requested}` but `{}` was already found on the system{}",
        found.executable(),
        shell_init_hint(*found, *preinitialized)
    )]
    AlreadyInstalled {
        requested: ManagerFlavor,
        found: ManagerFlavor,
        preinitialized: bool,
    },
    #[error("railup cannot install {0}, choose mamba or miniconda")]
    NotInstallable(ManagerFlavor),
    #[error("no home directory to install {0} into")]
    NoHomeDir(ManagerFlavor),
    #[error("could not create the {flavor} installation directory at {}", dir.display())]
    CreateInstallDir {
        flavor: ManagerFlavor,
        dir: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("could not remove the {flavor} installer at {}", path.display())]
    RemoveInstaller {
        flavor: ManagerFlavor,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("`{executable}` is neither on $PATH nor reachable through an activation script")]
    Unavailable { executable: &'static str },
    #[error(
        "the installed version of `{executable}` ({present}) is out of date, \
         at least {required} is required; upgrade or remove it manually"
    )]
    OutOfDate {
        executable: &'static str,
        present: Version,
        required: Version,
    },
    #[error(transparent)]
    ParseVersion(#[from] ParseVersionError),
    #[error("unexpected output from `{command}`")]
    ParseEnvironments {
        command: String,
        #[source]
        err: serde_json::Error,
    },
}

/// Appended to [`CondaError::AlreadyInstalled`] when the found manager is
/// installed but its shell hook is not, so the user knows why railup sees a
/// manager their shell does not.
fn shell_init_hint(found: ManagerFlavor, preinitialized: bool) -> String {
    if preinitialized {
        return String::new();
    }
    match found.activation_script() {
        Some(script) => format!(
            "\n`{}` is not on $PATH, but an activation script exists at {}. \
             Follow the {} instructions for initializing your shell, then \
             restart your terminal session.",
            found.executable(),
            script.display(),
            found,
        ),
        None => String::new(),
    }
}

/// A discovered or freshly bootstrapped environment manager, plus how its
/// commands have to be run.
#[derive(Debug, Clone, Copy)]
pub struct CondaProvider {
    flavor: ManagerFlavor,
    /// Whether the manager was found on `$PATH`, meaning its shell hook is
    /// installed. A manager found through its activation script only is not
    /// preinitialized, and some of its subcommands behave differently before
    /// the first shell restart.
    preinitialized: bool,
    runner: Runner,
}

#[derive(Debug, Deserialize)]
struct EnvList {
    envs: Vec<String>,
}

impl CondaProvider {
    /// Look for an installed manager, in discovery order. A manager counts as
    /// installed when its executable is on `$PATH` or its activation script
    /// exists in the user's home.
    pub fn discover(runner: Runner) -> Option<Self> {
        for flavor in ManagerFlavor::DISCOVERY_ORDER {
            let in_path = find_in_path(flavor.executable()).is_some();
            let script_exists = flavor
                .activation_script()
                .is_some_and(|script| script.exists());
            if in_path || script_exists {
                debug!(%flavor, preinitialized = in_path, "found environment manager");
                return Some(CondaProvider {
                    flavor,
                    preinitialized: in_path,
                    runner,
                });
            }
        }
        None
    }

    /// Download and run the bootstrap installer for `flavor`.
    ///
    /// The installer lands in the manager's own installation directory and is
    /// removed once it has run, mirroring the upstream install instructions.
    pub fn bootstrap(
        flavor: ManagerFlavor,
        platform: &Platform,
        fetcher: Fetcher,
        runner: Runner,
    ) -> Result<Self, CondaError> {
        let Some(link) = flavor.installer_link(platform) else {
            return Err(CondaError::NotInstallable(flavor));
        };
        let install_dir = flavor.home_dir().ok_or(CondaError::NoHomeDir(flavor))?;
        let installer = install_dir.join(format!("{flavor}-installer.sh"));

        if !runner.dry_run {
            std::fs::create_dir_all(&install_dir).map_err(|err| CondaError::CreateInstallDir {
                flavor,
                dir: install_dir.clone(),
                err,
            })?;
        }
        fetcher.fetch(&link, &installer, &runner)?;

        let mut command = Command::new("bash");
        command
            .arg(&installer)
            .args(flavor.installer_options())
            .arg(&install_dir);
        runner.run(&mut command)?;

        if !runner.dry_run {
            debug!(path = %installer.display(), "removing installer");
            std::fs::remove_file(&installer).map_err(|err| CondaError::RemoveInstaller {
                flavor,
                path: installer.clone(),
                err,
            })?;
        }

        Ok(CondaProvider {
            flavor,
            preinitialized: false,
            runner,
        })
    }

    pub fn flavor(&self) -> ManagerFlavor {
        self.flavor
    }

    pub fn preinitialized(&self) -> bool {
        self.preinitialized
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Build a command for the manager itself.
    ///
    /// With an activation script present the invocation is wrapped in a
    /// `bash -c '. {script} && ...'` subshell, which works whether or not the
    /// user's shell has been initialized. Micromamba has no script and is run
    /// directly from `$PATH`.
    fn manager_command(&self, program: &str, args: &[String]) -> Result<Command, CondaError> {
        if let Some(script) = self.flavor.activation_script() {
            let line = std::iter::once(program)
                .chain(args.iter().map(|arg| arg.as_str()))
                .map(|arg| shell_escape::escape(Cow::from(arg)))
                .join(" ");
            let mut command = Command::new("bash");
            command
                .arg("-c")
                .arg(format!(". {} && {line}", script.display()));
            return Ok(command);
        }

        if find_in_path(self.flavor.executable()).is_none() {
            return Err(CondaError::Unavailable {
                executable: self.flavor.executable(),
            });
        }
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }

    /// One-time preparation after discovery or bootstrap.
    ///
    /// conda has to accept the Anaconda channel terms of service before any
    /// solve, mamba installs its shell hook, micromamba needs nothing.
    pub fn initialize(&self) -> Result<(), CondaError> {
        match self.flavor.executable() {
            "conda" => {
                for channel in [
                    "https://repo.anaconda.com/pkgs/main",
                    "https://repo.anaconda.com/pkgs/r",
                ] {
                    let args: Vec<String> =
                        ["tos", "accept", "--override-channels", "--channel", channel]
                            .map(String::from)
                            .to_vec();
                    let mut command = self.manager_command("conda", &args)?;
                    self.runner.run_streaming(&mut command)?;
                }
            },
            "mamba" => {
                let shell = std::env::var("SHELL")
                    .ok()
                    .and_then(|sh| {
                        Path::new(&sh)
                            .file_stem()
                            .map(|stem| stem.to_string_lossy().into_owned())
                    })
                    .unwrap_or_else(|| "bash".to_string());
                let mut args: Vec<String> =
                    ["shell", "init", "--shell"].map(String::from).to_vec();
                args.push(shell);
                // `mamba shell init` understands --dry-run itself, but only
                // once the shell hook from a previous init is in place
                if self.runner.dry_run && self.preinitialized {
                    args.push("--dry-run".to_string());
                }
                let mut command = self.manager_command("mamba", &args)?;
                if self.runner.dry_run && !self.preinitialized {
                    self.runner.comment(&command);
                } else {
                    Runner::new(false, self.runner.verbose).run_streaming(&mut command)?;
                }
            },
            _ => {},
        }
        Ok(())
    }

    /// Check the manager's version against the oldest one that still works.
    ///
    /// Returns the version found, or `None` when a dry run installed the
    /// manager only on paper and there is nothing to probe.
    pub fn ensure_version(&self) -> Result<Option<Version>, CondaError> {
        let probe = self.flavor.version_probe();
        let Some((program, rest)) = probe.argv.split_first() else {
            return Ok(None);
        };
        let args: Vec<String> = rest.iter().map(ToString::to_string).collect();
        let mut command = self.manager_command(program, &args)?;

        if self.runner.dry_run && !self.preinitialized {
            self.runner.comment(&command);
            return Ok(None);
        }

        let stdout = self.runner.probe(&mut command)?;
        let present = probe.parse(&stdout)?;
        if present < probe.floor {
            return Err(CondaError::OutOfDate {
                executable: self.flavor.executable(),
                present,
                required: probe.floor,
            });
        }
        Ok(Some(present))
    }

    /// Names of existing environments, with the manager's base environment
    /// filtered out.
    ///
    /// Listing needs the manager's shell hook, so a manager that is not
    /// preinitialized reports no environments.
    pub fn environments(&self) -> Result<Vec<String>, CondaError> {
        if !self.preinitialized {
            return Ok(Vec::new());
        }
        let exe = self.flavor.executable();

        let list_args: Vec<String> = ["env", "list", "--json"].map(String::from).to_vec();
        let mut list_command = self.manager_command(exe, &list_args)?;
        let env_list = self.runner.probe(&mut list_command)?;

        let info_args: Vec<String> = ["info", "--base", "--json"].map(String::from).to_vec();
        let mut info_command = self.manager_command(exe, &info_args)?;
        let base_info = self.runner.probe(&mut info_command)?;

        parse_environments(&env_list, &base_info).map_err(|err| CondaError::ParseEnvironments {
            command: format!("{exe} env list --json"),
            err,
        })
    }

    fn create_env_args(&self, name: &str, spec: &EnvSpec) -> Vec<String> {
        let mut args: Vec<String> = ["env", "create", "--name"].map(String::from).to_vec();
        args.push(name.to_string());
        args.push("--file".to_string());
        args.push(spec.to_string());
        args.push("--yes".to_string());
        if self.runner.dry_run && self.preinitialized {
            args.push("--dry-run".to_string());
        }
        if !self.runner.verbose {
            args.push("--quiet".to_string());
        }
        args
    }

    /// Create the environment from a lockfile or the remote spec.
    ///
    /// In a dry run with a preinitialized manager the command still executes,
    /// with the manager's own `--dry-run` flag appended, so the solve is
    /// exercised without anything being written.
    pub fn create_env(&self, name: &str, spec: &EnvSpec) -> Result<(), CondaError> {
        let args = self.create_env_args(name, spec);
        let mut command = self.manager_command(self.flavor.executable(), &args)?;

        if self.runner.dry_run && !self.preinitialized {
            self.runner.comment(&command);
            return Ok(());
        }
        Runner::new(false, self.runner.verbose).run_streaming(&mut command)?;
        Ok(())
    }

    fn run_in_env_args(&self, env_name: &str, argv: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".to_string()];
        // conda buffers the child's output unless told not to
        if self.flavor.executable() == "conda" {
            args.push("--no-capture-output".to_string());
        }
        args.push("--name".to_string());
        args.push(env_name.to_string());
        args.extend(argv.iter().map(ToString::to_string));
        args
    }

    /// Run a command inside the named environment via `{manager} run`.
    pub fn run_in_env(&self, env_name: &str, argv: &[&str]) -> Result<(), CondaError> {
        let args = self.run_in_env_args(env_name, argv);
        let mut command = self.manager_command(self.flavor.executable(), &args)?;
        self.runner.run_streaming(&mut command)?;
        Ok(())
    }

    /// Drop the manager's package caches, which are worthless inside an
    /// environment that will not be modified again and cost gigabytes.
    pub fn clean_caches(&self, env_name: &str) -> Result<(), CondaError> {
        self.run_in_env(env_name, &["conda", "clean", "--all", "--yes"])
    }
}

fn parse_environments(env_list: &str, base_info: &str) -> Result<Vec<String>, serde_json::Error> {
    let list: EnvList = serde_json::from_str(env_list)?;
    let info: serde_json::Map<String, Value> = serde_json::from_str(base_info)?;
    let base_prefix = info.values().next().and_then(Value::as_str);

    Ok(list
        .envs
        .iter()
        .filter(|prefix| base_prefix != Some(prefix.as_str()))
        .filter_map(|prefix| Path::new(prefix).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::CommandExt;

    fn provider(flavor: ManagerFlavor, preinitialized: bool, runner: Runner) -> CondaProvider {
        CondaProvider {
            flavor,
            preinitialized,
            runner,
        }
    }

    #[test]
    fn discovery_walks_the_flavor_order() {
        let path_dir = tempfile::tempdir().unwrap();
        let home_dir = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("PATH", Some(path_dir.path().to_path_buf())),
                ("HOME", Some(home_dir.path().to_path_buf())),
            ],
            || {
                // nothing installed at all
                assert!(CondaProvider::discover(Runner::default()).is_none());

                // an activation script alone finds the manager, not preinitialized
                let script_dir = home_dir.path().join("miniforge3/bin");
                std::fs::create_dir_all(&script_dir).unwrap();
                std::fs::write(script_dir.join("activate"), "").unwrap();
                let found = CondaProvider::discover(Runner::default()).unwrap();
                assert_eq!(found.flavor(), ManagerFlavor::Mamba);
                assert!(!found.preinitialized());

                // an executable on $PATH outranks it and is preinitialized
                std::fs::write(path_dir.path().join("micromamba"), "").unwrap();
                let found = CondaProvider::discover(Runner::default()).unwrap();
                assert_eq!(found.flavor(), ManagerFlavor::Micromamba);
                assert!(found.preinitialized());
            },
        );
    }

    #[test]
    fn commands_are_wrapped_in_the_activation_script() {
        let home_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("HOME", Some(home_dir.path()), || {
            let provider = provider(ManagerFlavor::Mamba, true, Runner::default());
            let command = provider
                .manager_command("conda", &["--version".to_string()])
                .unwrap();
            assert_eq!(
                command.display().to_string(),
                format!(
                    "bash -c '. {}/miniforge3/bin/activate && conda --version'",
                    home_dir.path().display()
                )
            );
        });
    }

    #[test]
    fn micromamba_runs_bare_from_path() {
        let path_dir = tempfile::tempdir().unwrap();
        std::fs::write(path_dir.path().join("micromamba"), "").unwrap();
        temp_env::with_var("PATH", Some(path_dir.path()), || {
            let provider = provider(ManagerFlavor::Micromamba, true, Runner::default());
            let command = provider
                .manager_command("micromamba", &["--version".to_string()])
                .unwrap();
            assert_eq!(command.display().to_string(), "micromamba --version");
        });
    }

    #[test]
    fn micromamba_off_path_is_unavailable() {
        let path_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("PATH", Some(path_dir.path()), || {
            let provider = provider(ManagerFlavor::Micromamba, true, Runner::default());
            let err = provider.manager_command("micromamba", &[]).unwrap_err();
            assert!(matches!(err, CondaError::Unavailable {
                executable: "micromamba"
            }));
        });
    }

    #[test]
    fn create_env_flag_order_follows_the_manager_cli() {
        let spec = EnvSpec::Remote("https://example.com/environment.yml".to_string());

        let quiet = provider(ManagerFlavor::Miniconda, true, Runner::default());
        assert_eq!(quiet.create_env_args("rail", &spec), vec![
            "env",
            "create",
            "--name",
            "rail",
            "--file",
            "https://example.com/environment.yml",
            "--yes",
            "--quiet"
        ]);

        let dry = provider(ManagerFlavor::Miniconda, true, Runner::new(true, true));
        assert_eq!(dry.create_env_args("rail", &spec), vec![
            "env",
            "create",
            "--name",
            "rail",
            "--file",
            "https://example.com/environment.yml",
            "--yes",
            "--dry-run"
        ]);
    }

    #[test]
    fn only_conda_disables_output_capture_in_env_runs() {
        let conda = provider(ManagerFlavor::Anaconda, true, Runner::default());
        assert_eq!(conda.run_in_env_args("rail", &["pip", "install", "corner"]), vec![
            "run",
            "--no-capture-output",
            "--name",
            "rail",
            "pip",
            "install",
            "corner"
        ]);

        let mamba = provider(ManagerFlavor::Mamba, true, Runner::default());
        assert_eq!(mamba.run_in_env_args("rail", &["pip", "cache", "purge"]), vec![
            "run",
            "--name",
            "rail",
            "pip",
            "cache",
            "purge"
        ]);
    }

    #[test]
    fn base_environment_is_filtered_from_listings() {
        let env_list = r#"{"envs": [
            "/home/u/miniconda3",
            "/home/u/miniconda3/envs/rail",
            "/home/u/miniconda3/envs/scratch"
        ]}"#;
        let base_info = r#"{"root_prefix": "/home/u/miniconda3"}"#;
        assert_eq!(parse_environments(env_list, base_info).unwrap(), vec![
            "rail", "scratch"
        ]);
    }

    #[test]
    fn bootstrap_dry_run_touches_nothing() {
        let home_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("HOME", Some(home_dir.path()), || {
            let provider = CondaProvider::bootstrap(
                ManagerFlavor::Mamba,
                &Platform::LINUX_X86_64,
                Fetcher::Wget,
                Runner::new(true, false),
            )
            .unwrap();
            assert_eq!(provider.flavor(), ManagerFlavor::Mamba);
            assert!(!provider.preinitialized());
            assert!(!home_dir.path().join("miniforge3").exists());
        });
    }

    #[test]
    fn uninstallable_flavors_cannot_be_bootstrapped() {
        let err = CondaProvider::bootstrap(
            ManagerFlavor::Anaconda,
            &Platform::LINUX_X86_64,
            Fetcher::Wget,
            Runner::new(true, false),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CondaError::NotInstallable(ManagerFlavor::Anaconda)
        ));
    }

    #[test]
    fn already_installed_points_at_the_activation_script() {
        let home_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("HOME", Some(home_dir.path()), || {
            let err = CondaError::AlreadyInstalled {
                requested: ManagerFlavor::Miniconda,
                found: ManagerFlavor::Mamba,
                preinitialized: false,
            };
            let message = err.to_string();
            assert!(message.contains("requested installation of `miniconda`"));
            assert!(message.contains("`mamba` was already found"));
            assert!(message.contains("miniforge3/bin/activate"));

            let err = CondaError::AlreadyInstalled {
                requested: ManagerFlavor::Miniconda,
                found: ManagerFlavor::Mamba,
                preinitialized: true,
            };
            assert!(!err.to_string().contains("activation script"));
        });
    }
}
