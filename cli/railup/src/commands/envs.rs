use anyhow::{Result, bail};
use bpaf::Bpaf;
use itertools::Itertools;
use railup_sdk::models::manager::ManagerFlavor;
use railup_sdk::providers::Runner;
use railup_sdk::providers::conda::CondaProvider;
use railup_sdk::railup::Railup;
use serde_json::json;
use tracing::instrument;

use crate::utils::message;

#[derive(Bpaf, Debug, Clone)]
pub struct Envs {
    /// Format output as JSON
    #[bpaf(long)]
    json: bool,
}

impl Envs {
    /// List the discovered manager's environments
    ///
    /// If `--json` is passed, print a JSON object naming the manager
    /// and its environments.
    #[instrument(name = "envs", skip_all)]
    pub fn handle(self, railup: Railup) -> Result<()> {
        let runner = Runner::new(false, railup.verbosity >= 1);

        let Some(provider) = CondaProvider::discover(runner) else {
            bail!(
                "no environment manager found, expected one of {} on $PATH",
                ManagerFlavor::DISCOVERY_ORDER
                    .iter()
                    .map(|flavor| flavor.executable())
                    .unique()
                    .join(", ")
            );
        };

        let environments = provider.environments()?;

        if self.json {
            println!(
                "{:#}",
                json!({
                    "manager": provider.flavor().to_string(),
                    "environments": environments,
                })
            );
            return Ok(());
        }

        if environments.is_empty() {
            message::plain(format!(
                "No environments created with {} yet",
                provider.flavor()
            ));
            return Ok(());
        }

        message::created(format!("Environments of {}:", provider.flavor()));
        println!("{}", textwrap::indent(&environments.join("\n"), "  "));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use railup_sdk::models::platform::Platform;

    use super::*;

    #[test]
    fn missing_manager_names_the_candidates() {
        let path_dir = tempfile::tempdir().unwrap();
        let home_dir = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("PATH", Some(path_dir.path().to_path_buf())),
                ("HOME", Some(home_dir.path().to_path_buf())),
            ],
            || {
                let railup = Railup {
                    config_dir: home_dir.path().join("config"),
                    cache_dir: home_dir.path().join("cache"),
                    data_dir: home_dir.path().join("data"),
                    temp_dir: home_dir.path().join("tmp"),
                    platform: Platform::LINUX_X86_64,
                    verbosity: 0,
                };
                let err = Envs { json: false }.handle(railup).unwrap_err();
                assert!(
                    err.to_string()
                        .contains("expected one of micromamba, mamba, conda")
                );
            },
        );
    }
}
