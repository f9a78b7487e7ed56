use anyhow::{Result, bail};
use bpaf::Bpaf;
use railup_sdk::providers::Runner;
use railup_sdk::providers::conda::CondaProvider;
use railup_sdk::providers::fetcher::Fetcher;
use railup_sdk::providers::prereqs::{self, PrereqError, REQUIRED_TOOLS};
use railup_sdk::railup::Railup;
use tracing::instrument;

use crate::utils::errors::display_chain;
use crate::utils::message;

/// Probe the system the way `railup install` would, without changing it.
#[derive(Bpaf, Debug, Clone)]
pub struct Check {}

impl Check {
    #[instrument(name = "check", skip_all)]
    pub fn handle(self, railup: Railup) -> Result<()> {
        let runner = Runner::new(false, railup.verbosity >= 1);
        let mut failures = 0;

        match railup.platform.ensure_supported() {
            Ok(()) => message::updated(format!("platform {} is supported", railup.platform)),
            Err(err) => {
                message::error(err);
                failures += 1;
            },
        }

        let missing = prereqs::missing_tools();
        if missing.is_empty() {
            message::updated(format!("build tools present ({})", REQUIRED_TOOLS.join(", ")));
        } else {
            message::error(PrereqError::Missing(missing));
            failures += 1;
        }

        match prereqs::clang_compilers(&runner) {
            Ok(offending) if offending.is_empty() => {
                message::updated("C compilers are GNU, not clang");
            },
            Ok(offending) => {
                for version_command in offending {
                    message::error(PrereqError::ClangCompiler(version_command));
                }
                failures += 1;
            },
            Err(err) => {
                message::warning(format!("could not probe compilers: {}", display_chain(&err)));
            },
        }

        if let Some(fetcher) = Fetcher::detect() {
            message::updated(format!("download tool `{fetcher}` available"));
        }

        match CondaProvider::discover(runner) {
            Some(provider) => match provider.ensure_version() {
                Ok(Some(version)) => message::updated(format!(
                    "environment manager `{}` {} is recent enough",
                    provider.flavor().executable(),
                    version
                )),
                Ok(None) => message::updated(format!(
                    "environment manager `{}` found",
                    provider.flavor().executable()
                )),
                Err(err) => {
                    message::error(display_chain(&err));
                    failures += 1;
                },
            },
            None => message::plain(
                "No environment manager found; `railup install` will offer to install one",
            ),
        }

        if failures > 0 {
            bail!("{failures} of the checks failed");
        }

        Ok(())
    }
}
