use std::process::ExitCode;

use anyhow::Result;
use bpaf::{Args, Parser};
use commands::{RAILUP_VERSION, RailupArgs, RailupCli, Version};
use railup_sdk::providers::EXIT_NOT_FOUND;
use railup_sdk::providers::prereqs::PrereqError;
use tracing::debug;
use utils::errors::{exec_exit_code, format_error};
use utils::init::init_logger;
use utils::message;

mod commands;
mod config;
mod utils;

async fn run(args: RailupArgs) -> Result<()> {
    init_logger(Some(args.verbosity));
    let config = config::Config::parse()?;
    args.handle(config).await?;
    Ok(())
}

fn main() -> ExitCode {
    // initialize logger with "best guess" defaults
    // updating the logger conf is cheap, so we reinitialize whenever we get more information
    init_logger(None);

    // Quit early if `--version` is present
    if Version::check() {
        println!("Version: {RAILUP_VERSION}");
        return ExitCode::from(0);
    }

    // Parse verbosity flags to affect help message/parse errors
    let verbosity = {
        let verbosity_parser = commands::verbosity();
        let other_parser = bpaf::any("_", Some::<String>).many();

        bpaf::construct!(verbosity_parser, other_parser)
            .map(|(v, _)| v)
            .to_options()
            .run_inner(Args::current_args())
            .unwrap_or_default()
    };

    init_logger(Some(verbosity));

    // Run the argument parser
    //
    // Pass through Completion "failure"; in completion mode this needs to be
    // printed as is to work with the shell completion frontends
    //
    // Pass through Stdout failure; this represents `--help`
    let args = commands::railup_cli().run_inner(Args::current_args());

    if let Some(parse_err) = args.as_ref().err() {
        match parse_err {
            bpaf::ParseFailure::Stdout(m, _) => {
                print!("{m:80}");
                return ExitCode::from(0);
            },
            bpaf::ParseFailure::Stderr(m) => {
                message::error(format!("{m:80}"));
                return ExitCode::from(1);
            },
            bpaf::ParseFailure::Completion(c) => {
                print!("{c}");
                return ExitCode::from(0);
            },
        }
    }

    // Errors handled above
    let RailupCli(args) = args.unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();

    // Run railup. Print errors and exit nonzero on failure, passing through a
    // failed child's own exit status where one exists
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::from(0),

        Err(e) => {
            debug!("{:#}", e);

            if let Some(PrereqError::Missing(_)) = e.downcast_ref::<PrereqError>() {
                message::error(format_error(&e));
                return ExitCode::from(EXIT_NOT_FOUND as u8);
            }

            let code = exec_exit_code(&e)
                .and_then(|code| u8::try_from(code).ok())
                .filter(|&code| code != 0)
                .unwrap_or(1);

            message::error(format_error(&e));
            ExitCode::from(code)
        },
    }
}
