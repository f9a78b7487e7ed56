use std::io;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use railup_sdk::railup::Railup;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use toml_edit::{Key, TomlError};
use tracing::{debug, instrument};

use crate::config::{Config, RAILUP_CONFIG_FILE, ReadWriteError};
use crate::utils::message;

#[derive(Bpaf, Clone)]
#[bpaf(fallback(ConfigArgs::List))]
pub enum ConfigArgs {
    /// List the current values of all options
    #[bpaf(short, long)]
    List,
    /// Reset all options to their default values without further confirmation
    #[bpaf(short, long)]
    Reset,
    /// Set a config value
    Set(#[bpaf(external(config_set))] ConfigSet),
    /// Delete a config value
    Delete(#[bpaf(external(config_delete))] ConfigDelete),
}

impl ConfigArgs {
    /// handle config flags like commands
    #[instrument(name = "config", skip_all)]
    pub async fn handle(&self, config: Config, railup: Railup) -> Result<()> {
        match self {
            ConfigArgs::List => println!("{}", config.get(&[])?),
            ConfigArgs::Reset => {
                match fs::remove_file(&railup.config_dir.join(RAILUP_CONFIG_FILE)).await {
                    Err(err) if err.kind() != io::ErrorKind::NotFound => {
                        Err(err).context("Could not reset config file")?
                    },
                    _ => (),
                }
                message::deleted("Configuration reset to defaults");
            },
            ConfigArgs::Set(ConfigSet { key, value, .. }) => {
                let parsed_value = match Value::from_str(value) {
                    Ok(parsed) => {
                        debug!(supplied = value, ?parsed, "parsed config value");
                        parsed
                    },
                    Err(error) => {
                        debug!(
                            supplied = value,
                            ?error,
                            "failed to parse as JSON value, treating as unquoted string"
                        );
                        Value::String(value.clone())
                    },
                };

                update_config(
                    &railup.config_dir,
                    &railup.temp_dir,
                    key,
                    Some(parsed_value),
                )?
            },
            ConfigArgs::Delete(ConfigDelete { key, .. }) => {
                update_config::<()>(&railup.config_dir, &railup.temp_dir, key, None)?
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Bpaf)]
#[bpaf(adjacent)]
pub struct ConfigSet {
    /// set <key> to <string>
    #[allow(unused)]
    set: (),
    /// Configuration key
    #[bpaf(positional("key"))]
    key: String,
    /// Configuration value (string)
    #[bpaf(positional("string"))]
    value: String,
}

#[derive(Debug, Clone, Bpaf)]
#[allow(unused)]
pub struct ConfigDelete {
    /// Delete config key
    #[bpaf(long("delete"), argument("key"))]
    key: String,
}

/// wrapper around [Config::write_to_in]
fn update_config<V: Serialize>(
    config_dir: &Path,
    temp_dir: &Path,
    key: impl AsRef<str>,
    value: Option<V>,
) -> Result<()> {
    let query = parse_toml_key(key.as_ref()).context("Could not parse key")?;

    let config_file_path = config_dir.join(RAILUP_CONFIG_FILE);

    match Config::write_to_in(config_file_path, temp_dir, &query, value) {
        err @ Err(ReadWriteError::ReadConfig(_)) => err.context("Could not read current config file.\nPlease verify the format or reset using `railup config --reset`")?,
        err @ Err(_) => err?,
        Ok(()) => (),
    }
    Ok(())
}

/// Parse a TOML key from a string, quoting any segments where necessary, so
/// that a user doesn't need to understand the intricacies of TOML.
fn parse_toml_key(key: &str) -> Result<Vec<Key>, TomlError> {
    let normalized_key = key
        .split('.')
        .map(|segment| {
            let quoting_not_needed = segment
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            let contains_some_quotes = segment.contains('"') || segment.contains('\'');

            if quoting_not_needed || contains_some_quotes {
                segment.to_string()
            } else {
                format!("'{}'", segment)
            }
        })
        .collect::<Vec<_>>()
        .join(".");

    Key::parse(&normalized_key)
}
