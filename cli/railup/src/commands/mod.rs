mod check;
mod containerize;
mod envs;
mod general;
mod install;

use std::fmt;

use anyhow::{Result, anyhow};
use bpaf::{Args, Bpaf, ParseFailure, Parser};
use indoc::{formatdoc, indoc};
use railup_sdk::models::platform::Platform;
use railup_sdk::railup::Railup;
use tempfile::TempDir;
use tracing::debug;

use crate::utils::message;

pub const RAILUP_VERSION: &str = env!("CARGO_PKG_VERSION");

static RAILUP_DESCRIPTION: &'_ str = indoc! {"
    railup sets up RAIL, the Redshift Assessment Infrastructure Layers toolkit.\n\n

    It installs an anaconda-compatible environment manager if needed, creates a
    virtual environment from a pinned lockfile and installs the RAIL packages
    into it, either directly on this machine or inside a container image."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

fn vec_not_empty<T>(x: Vec<T>) -> bool {
    !x.is_empty()
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Verbosity {
    pub fn to_i32(self) -> i32 {
        match self {
            Verbosity::Quiet => -1,
            Verbosity::Verbose(n) => n
                .try_into()
                .expect("If you passed -v enough times to overflow an i32, I'm impressed"),
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(
    options,
    descr(RAILUP_DESCRIPTION),
    footer("Run 'railup <command> --help' for details on a command.")
)]
pub struct RailupCli(#[bpaf(external(railup_args))] pub RailupArgs);

/// Main railup args parser
///
/// This struct is used to parse the command line arguments
/// and allows to be composed with other parsers.
///
/// To parse the railup CLI, use [`RailupCli`] instead using [`railup_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)] // we don't want this struct to be interpreted as a group
pub struct RailupArgs {
    /// Verbose mode
    ///
    /// Invoke multiple times for increasing detail.
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Debug mode
    #[bpaf(long, req_flag(()), many, map(vec_not_empty), hide)]
    pub debug: bool,

    /// Print the version of the program
    #[allow(dead_code)] // fake arg, `--version` is checked for separately (see [Version])
    #[bpaf(long, short('V'))]
    version: bool,

    #[bpaf(external(commands), optional)]
    command: Option<Commands>,
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command")
    }
}

impl RailupArgs {
    pub async fn handle(self, config: crate::config::Config) -> Result<()> {
        // ensure xdg dirs exist
        tokio::fs::create_dir_all(&config.railup.config_dir).await?;
        tokio::fs::create_dir_all(&config.railup.data_dir).await?;

        // prepare a temp dir for the run:
        let process_dir = config.railup.cache_dir.join("process");
        tokio::fs::create_dir_all(&process_dir).await?;

        // `temp_dir` will automatically be removed from disk when the function returns
        let temp_dir = TempDir::new_in(process_dir)?;

        // Given no command, skip initialization and print welcome message
        if self.command.is_none() {
            print_welcome_message();
            return Ok(());
        }

        let platform = Platform::detect()?;
        debug!(%platform, "detected platform");

        let railup = Railup {
            config_dir: config.railup.config_dir.clone(),
            cache_dir: config.railup.cache_dir.clone(),
            data_dir: config.railup.data_dir.clone(),
            temp_dir: temp_dir.path().to_path_buf(),
            platform,
            verbosity: self.verbosity.to_i32(),
        };

        let signal_handler = async { tokio::signal::ctrl_c().await.unwrap() };

        let cli_worker = async move {
            // command handled above
            match self.command.unwrap() {
                Commands::Help(group) => {
                    group.handle();
                    Ok(())
                },
                Commands::Install(args) => args.handle(config, railup).await,
                Commands::Containerize(args) => args.handle(config, railup).await,
                Commands::Envs(args) => args.handle(railup),
                Commands::Check(args) => args.handle(railup),
                Commands::Config(args) => args.handle(config, railup).await,
            }
        };

        // Wait for either an interrupting signal or completion of the cli work
        tokio::task::LocalSet::new()
            .run_until(async {
                tokio::select! {
                    _ = tokio::task::spawn_local(signal_handler) => {
                        // Subprocesses inherit the railup process group and
                        // thus get ctrl_c signals in sync with railup itself.
                        Err(anyhow!("user interrupted process"))
                    }
                    result = tokio::task::spawn_local(cli_worker) => result?
                }
            })
            .await
    }
}

/// Print general welcome message with short usage instructions.
fn print_welcome_message() {
    let welcome_message = {
        let version = RAILUP_VERSION;
        formatdoc! {r#"
            railup version {version}

            Usage: railup OPTIONS (install|containerize|envs|check|config) [--help]

            Use 'railup --help' for full list of commands and more information
        "#}
    };

    message::plain(welcome_message);
    message::plain("First time? Set up the RAIL environment with 'railup install'\n");
}

#[derive(Bpaf, Clone)]
enum Commands {
    /// Prints help information
    #[bpaf(command, hide)]
    Help(#[bpaf(external(help))] Help),

    /// Install RAIL into a new virtual environment
    #[bpaf(command)]
    Install(#[bpaf(external(install::install))] install::Install),

    /// Write or build a container image recipe that runs the installer
    #[bpaf(command)]
    Containerize(#[bpaf(external(containerize::containerize))] containerize::Containerize),

    /// Show the environment manager's virtual environments
    #[bpaf(command)]
    Envs(#[bpaf(external(envs::envs))] envs::Envs),

    /// Check installation requirements without changing the system
    #[bpaf(command)]
    Check(#[bpaf(external(check::check))] check::Check),

    /// View and set configuration options
    #[bpaf(command)]
    Config(#[bpaf(external(general::config_args))] general::ConfigArgs),
}

#[derive(Debug, Bpaf, Clone)]
struct Help {
    /// Command to show help for
    #[bpaf(positional("cmd"))]
    cmd: Option<String>,
}

/// Force `--help` output for `railup` with a given command
pub fn display_help(cmd: Option<String>) {
    let mut args = Vec::from_iter(cmd.as_deref());
    args.push("--help");

    match railup_cli().run_inner(&*args) {
        Ok(_) => unreachable!(),
        Err(ParseFailure::Completion(comp)) => print!("{comp:80}"),
        Err(ParseFailure::Stdout(doc, _)) => message::plain(format!("{doc:80}")),
        Err(ParseFailure::Stderr(err)) => message::error(err),
    }
}

impl Help {
    fn handle(self) {
        display_help(self.cmd);
    }
}

/// Fake argument used to parse `--version` separately
///
/// bpaf allows `railup --invalid option --version`
/// (https://github.com/pacak/bpaf/issues/288) but common utilities,
/// such as git always require correct arguments even in the presence of
/// short circuiting flags such as `--version`
#[derive(Bpaf, Default)]
pub struct Version(#[bpaf(short('V'), long("version"))] bool);

impl Version {
    /// Parses to [Self] and extract the `--version` flag
    pub fn check() -> bool {
        bpaf::construct!(version(), railup_args())
            .to_options()
            .run_inner(Args::current_args())
            .map(|(v, _)| v)
            .unwrap_or_default()
            .0
    }
}
