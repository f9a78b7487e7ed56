use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bpaf::{Bpaf, Parser};
use indoc::formatdoc;
use itertools::Itertools;
use railup_sdk::models::lockfile::EnvSpec;
use railup_sdk::models::manager::ManagerFlavor;
use railup_sdk::models::packages::{
    ALGORITHM_PACKAGES, CORE_PACKAGE, DEVTOOL_PACKAGES, PackageSelection,
};
use railup_sdk::providers::conda::{CondaError, CondaProvider};
use railup_sdk::providers::fetcher::Fetcher;
use railup_sdk::providers::pip::Pip;
use railup_sdk::providers::{Runner, prereqs};
use railup_sdk::railup::Railup;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::utils::dialog::{Confirm, Dialog, Select, Spinner, Text};
use crate::utils::message;

// Install RAIL into a new virtual environment
#[derive(Bpaf, Clone, Debug)]
pub struct Install {
    /// Bootstrap this environment manager. 'mamba' or 'miniconda'.
    /// Errors if a manager is already present
    #[bpaf(long("install-manager"), argument("flavor"))]
    install_manager: Option<ManagerFlavor>,

    /// Name of the new virtual environment
    #[bpaf(long("env-name"), argument("name"))]
    env_name: Option<String>,

    /// RAIL algorithm packages to install on top of pz-rail.
    /// 'all', 'none', or a comma separated subset
    #[bpaf(argument("packages"))]
    packages: Option<PackageSelection>,

    #[bpaf(external(devtools_arg))]
    devtools: Option<bool>,

    /// Require the platform lockfile to exist locally
    /// instead of falling back to the remote spec
    #[bpaf(long("local-lockfiles"))]
    local_lockfiles: bool,

    /// Clear the conda and pip caches after installation, intended for image builds
    clean: bool,

    /// Make no changes to the system, print the commands that would run
    #[bpaf(long("dry-run"))]
    dry_run: bool,
}

fn devtools_arg() -> impl Parser<Option<bool>> {
    let yes = bpaf::long("devtools")
        .help("Install the devtools group (jupyter, seaborn, corner, matplotlib)")
        .req_flag(true);
    let no = bpaf::long("no-devtools")
        .help("Skip the devtools group")
        .req_flag(false);
    bpaf::construct!([yes, no]).optional()
}

impl Install {
    #[instrument(name = "install", skip_all)]
    pub async fn handle(self, config: Config, railup: Railup) -> Result<()> {
        let runner = Runner::new(self.dry_run, railup.verbosity >= 1);

        message::header("Checking installation requirements");
        railup.platform.ensure_supported()?;
        let fetcher = prereqs::check_requirements(&runner)?;
        debug!(%fetcher, "prerequisites satisfied");

        let conda = self.find_manager(&config, &railup, fetcher, runner).await?;

        message::header(format!("Initializing {}", conda.flavor().executable()));
        conda.initialize()?;

        message::header(format!("Verifying {} version", conda.flavor().executable()));
        match conda.ensure_version()? {
            Some(version) => message::plain(format!(
                "{} {version} is recent enough",
                conda.flavor().executable()
            )),
            None => debug!("version probe skipped, manager only installed on paper"),
        }

        let env_name = self.choose_env_name(&config, &conda).await?;

        message::header(format!(
            "Creating a new {} environment, this may take up to 10 minutes",
            conda.flavor().executable()
        ));
        let spec = EnvSpec::resolve(&env::current_dir()?, &railup.platform, self.local_lockfiles)?;
        debug!(%spec, "resolved environment spec");
        conda.create_env(&env_name, &spec)?;

        message::header("Adding RAIL packages to environment");
        self.pip_install(&config, &conda, &env_name).await?;

        if self.clean {
            conda.clean_caches(&env_name)?;
            Pip::new(&conda, &env_name).cache_purge()?;
        }

        message::header("Installation complete!");
        print_post_install(&conda, &env_name);

        Ok(())
    }

    /// Find an installed environment manager, or bootstrap one.
    ///
    /// Requesting a bootstrap while a manager is already present is an error;
    /// finding none triggers a selection prompt unless the flag or config
    /// named a flavor.
    async fn find_manager(
        &self,
        config: &Config,
        railup: &Railup,
        fetcher: Fetcher,
        runner: Runner,
    ) -> Result<CondaProvider> {
        message::header("Checking for a pre-installed Python virtual environment manager");

        if let Some(conda) = CondaProvider::discover(runner) {
            message::plain(format!(
                "Using {} ({})",
                conda.flavor(),
                conda.flavor().executable()
            ));
            if let Some(requested) = self.install_manager {
                return Err(CondaError::AlreadyInstalled {
                    requested,
                    found: conda.flavor(),
                    preinitialized: conda.preinitialized(),
                }
                .into());
            }
            return Ok(conda);
        }

        message::plain(format!(
            "Require one of {} to be present in $PATH.\nIf one of these is already installed, railup cannot find it.",
            ManagerFlavor::DISCOVERY_ORDER
                .iter()
                .map(|flavor| flavor.executable())
                .unique()
                .join("/"),
        ));

        let flavor = match self.install_manager.or(config.railup.default_manager) {
            Some(flavor) => flavor,
            None => {
                if !Dialog::can_prompt() {
                    return Err(noninteractive_error(
                        "Which environment manager should be installed?",
                    ));
                }
                Dialog {
                    message: "Which environment manager should be installed?",
                    help_message: None,
                    typed: Select {
                        options: ManagerFlavor::installable_flavors().to_vec(),
                    },
                }
                .prompt()
                .await
                .context("Could not read environment manager selection")?
            },
        };

        message::header(format!("Installing {flavor}"));
        if let Some(dir) = flavor.home_dir() {
            message::plain(format!(
                "Downloading the {flavor} installer and installing into {}, this may take up to 5 minutes",
                dir.display()
            ));
        }
        let conda = CondaProvider::bootstrap(flavor, &railup.platform, fetcher, runner)?;
        Ok(conda)
    }

    /// The name for the new environment, from the flag, the config, or a
    /// prompt. Names that already exist are rejected.
    async fn choose_env_name(&self, config: &Config, conda: &CondaProvider) -> Result<String> {
        message::header("Getting virtual environment name");

        // going through the activation script spawns a subshell per listing
        // call, slow enough to deserve a spinner
        let existing = Dialog {
            message: "Listing existing environments",
            help_message: None,
            typed: Spinner::new(|| conda.environments()),
        }
        .spin_with_delay(Duration::from_secs(1))?;
        if !existing.is_empty() {
            message::plain(format!(
                "Existing environments: {}",
                existing.iter().join(", ")
            ));
        }

        let supplied = self
            .env_name
            .clone()
            .or_else(|| config.railup.default_env_name.clone());
        if let Some(name) = supplied {
            if existing.contains(&name) {
                bail!("Supplied environment name '{name}' already exists");
            }
            message::plain(format!("Using supplied environment name {name}"));
            return Ok(name);
        }

        if !Dialog::can_prompt() {
            return Err(noninteractive_error(
                "Name of new virtual environment to install RAIL in:",
            ));
        }

        loop {
            let name = Dialog {
                message: "Name of new virtual environment to install RAIL in:",
                help_message: None,
                typed: Text { default: None },
            }
            .prompt()
            .await
            .context("Could not read environment name")?;

            if name.is_empty() {
                continue;
            }
            if existing.contains(&name) {
                message::warning(formatdoc! {"
                    An environment named {name} already exists.
                    Please choose another name, or exit, remove the environment, and try
                    again. See the documentation on removing environments at:
                    https://docs.conda.io/projects/conda/en/stable/commands/env/remove.html
                "});
                continue;
            }
            return Ok(name);
        }
    }

    /// The PyPI phase: pip itself, the devtools group in one invocation, the
    /// core package, then each selected algorithm individually.
    async fn pip_install(
        &self,
        config: &Config,
        conda: &CondaProvider,
        env_name: &str,
    ) -> Result<()> {
        let selection = self.choose_algorithms().await?;
        let devtools = self.choose_devtools(config).await?;

        message::plain("Installing `pip` packages");
        let pip = Pip::new(conda, env_name);
        pip.ensurepip()?;

        if devtools {
            pip.install(DEVTOOL_PACKAGES)?;
        }

        pip.install(&[CORE_PACKAGE])?;
        for package in selection.algorithm_packages() {
            pip.install(&[package.as_str()])?;
        }

        Ok(())
    }

    /// Which algorithm packages to install, from the flag or interactively.
    async fn choose_algorithms(&self) -> Result<PackageSelection> {
        if let Some(selection) = self.packages.clone() {
            return Ok(selection);
        }

        message::plain(format!(
            "Available RAIL algorithms:\n{}",
            textwrap::indent(&ALGORITHM_PACKAGES.join("\n"), "  ")
        ));

        if !Dialog::can_prompt() {
            return Err(noninteractive_error(
                "Which algorithms should be installed?",
            ));
        }

        let choice = Dialog {
            message: "Which algorithms should be installed?",
            help_message: None,
            typed: Select {
                options: vec!["all", "none", "select"],
            },
        }
        .prompt()
        .await
        .context("Could not read algorithm selection")?;

        match choice {
            "all" => Ok(PackageSelection::All),
            "none" => Ok(PackageSelection::None),
            _ => {
                let mut chosen = Vec::new();
                for package in ALGORITHM_PACKAGES {
                    let install = Dialog {
                        message: &format!("Install {package}?"),
                        help_message: None,
                        typed: Confirm { default: None },
                    }
                    .prompt()
                    .await
                    .context("Could not read package selection")?;
                    if install {
                        chosen.push(package.to_string());
                    }
                }
                Ok(PackageSelection::Subset(chosen))
            },
        }
    }

    /// Whether to install the devtools group, from the flag, the config, or a
    /// prompt.
    async fn choose_devtools(&self, config: &Config) -> Result<bool> {
        if let Some(devtools) = self.devtools.or(config.railup.devtools) {
            return Ok(devtools);
        }

        if !Dialog::can_prompt() {
            return Err(noninteractive_error("Install additional packages?"));
        }

        Dialog {
            message: &format!(
                "Install additional packages: {}?",
                DEVTOOL_PACKAGES.join(", ")
            ),
            help_message: None,
            typed: Confirm { default: None },
        }
        .prompt()
        .await
        .context("Could not read devtools selection")
    }
}

/// Refusal to prompt on a non-tty, so unattended runs fail with the missing
/// choice named instead of hanging.
fn noninteractive_error(prompt: &str) -> anyhow::Error {
    anyhow!(formatdoc! {"
        User input needed, but output device is not a tty. To run railup in an
        unattended mode, ensure all choices are given as command-line options.

        Input needed: {prompt}"
    })
}

/// The original installer's parting instructions.
fn print_post_install(conda: &CondaProvider, env_name: &str) {
    let exe = conda.flavor().executable();
    message::plain(formatdoc! {"
        To use the newly installed environment manager {exe}, restart your terminal
        session or activate your shell's init script (with `source ~/.bashrc` or similar).

        To enter the {env_name} virtual environment, run: `{exe} activate {env_name}`

        To install additional packages:
        - From conda-forge: `{exe} install <package name>`
        - From PyPI: `pip install <package name>`

        In the environment you also have access to the rail cli.
        Run `rail --help` and visit https://rail-hub.readthedocs.io/ for documentation.
    "});
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn devtools_flags_parse() {
        let args = install().to_options().run_inner(&["--devtools"][..]).unwrap();
        assert_eq!(args.devtools, Some(true));

        let args = install()
            .to_options()
            .run_inner(&["--no-devtools"][..])
            .unwrap();
        assert_eq!(args.devtools, Some(false));

        let args = install().to_options().run_inner(&[] as &[&str]).unwrap();
        assert_eq!(args.devtools, None);

        assert!(
            install()
                .to_options()
                .run_inner(&["--devtools", "--no-devtools"][..])
                .is_err()
        );
    }

    #[test]
    fn package_selections_parse() {
        let args = install()
            .to_options()
            .run_inner(&["--packages", "all"][..])
            .unwrap();
        assert_eq!(args.packages, Some(PackageSelection::All));

        let args = install()
            .to_options()
            .run_inner(&["--packages", "pz-rail-dnf,pz-rail-yaw"][..])
            .unwrap();
        assert_eq!(
            args.packages,
            Some(PackageSelection::Subset(vec![
                "pz-rail-dnf".to_string(),
                "pz-rail-yaw".to_string()
            ]))
        );

        assert!(
            install()
                .to_options()
                .run_inner(&["--packages", "numpy"][..])
                .is_err()
        );
    }

    #[test]
    fn unattended_refusals_name_the_missing_choice() {
        let err = noninteractive_error("Which algorithms should be installed?");
        assert!(err.to_string().contains("not a tty"));
        assert!(
            err.to_string()
                .contains("Input needed: Which algorithms should be installed?")
        );
    }
}
