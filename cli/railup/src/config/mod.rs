use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use itertools::Itertools;
use railup_sdk::models::manager::ManagerFlavor;
use railup_sdk::providers::runtime::ContainerRuntime;
use serde::{Deserialize, Serialize};
use tempfile::PersistError;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Key, Table, TableLike};
use tracing::{debug, trace};
use xdg::BaseDirectories;

/// Name of railup managed directories (config, data, cache)
const RAILUP_DIR_NAME: &str = "railup";
const RAILUP_CONFIG_DIR_VAR: &str = "RAILUP_CONFIG_DIR";
pub const RAILUP_CONFIG_FILE: &str = "railup.toml";

#[derive(Clone, Debug, Deserialize, Default, Serialize)]
pub struct Config {
    /// railup configuration options
    #[serde(default, flatten)]
    pub railup: RailupConfig,
}

/// User configurable settings, layered under command line flags
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct RailupConfig {
    /// Directory where railup should store ephemeral data (default:
    /// `$XDG_CACHE_HOME/railup`)
    pub cache_dir: PathBuf,
    /// Directory where railup should store persistent data (default:
    /// `$XDG_DATA_HOME/railup`)
    pub data_dir: PathBuf,
    /// Directory where railup should load its configuration file (default:
    /// `$XDG_CONFIG_HOME/railup`)
    pub config_dir: PathBuf,

    /// Environment manager to install when none is present,
    /// instead of asking
    pub default_manager: Option<ManagerFlavor>,

    /// Environment name to use instead of asking
    pub default_env_name: Option<String>,

    /// Whether to install the developer convenience packages
    /// (jupyter et al.) without asking
    pub devtools: Option<bool>,

    /// Base image for `railup containerize`
    pub base_image: Option<String>,

    /// Container runtime for `railup containerize`
    pub runtime: Option<ContainerRuntime>,
}

/// Error returned by [`Config::get()`] and the write path
#[derive(Debug, Error)]
pub enum ReadWriteError {
    #[error("Invalid config key: '{}'",
         _0.iter()
         .map(|key| key.display_repr()
         .into_owned())
         .collect_vec()
         .join("."))]
    InvalidKey(Vec<Key>),
    #[error("Config key '{}' not in user configuration", _0.iter().map(|key| key.display_repr().into_owned()).collect_vec().join("."))]
    NotAUserValue(Vec<Key>),
    #[error(transparent)]
    TomlEdit(#[from] toml_edit::TomlError),
    #[error(transparent)]
    TomlSer(#[from] toml_edit::ser::Error),
    #[error(transparent)]
    TomlDe(#[from] toml_edit::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Could not read config file: {0}")]
    ReadConfig(std::io::Error),
    #[error("Could not write config file: {0}")]
    WriteConfig(std::io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl Config {
    /// Assembles the layered raw config: defaults, `/etc`, the user config
    /// file, then `RAILUP_*` environment variables.
    fn raw_config() -> Result<HierarchicalConfig> {
        let railup_dirs = BaseDirectories::with_prefix(RAILUP_DIR_NAME);

        let cache_dir = railup_dirs
            .get_cache_home()
            .context("Could not determine cache directory")?;
        let data_dir = railup_dirs
            .get_data_home()
            .context("Could not determine data directory")?;

        let config_dir = match env::var(RAILUP_CONFIG_DIR_VAR) {
            Ok(v) => {
                debug!("`${RAILUP_CONFIG_DIR_VAR}` set: {v}");
                fs::create_dir_all(&v)
                    .context(format!("Could not create config directory: {v:?}"))?;
                v.into()
            },
            Err(_) => {
                let config_dir = railup_dirs
                    .get_config_home()
                    .context("Could not determine config directory")?;
                debug!("`${RAILUP_CONFIG_DIR_VAR}` not set, using {config_dir:?}");
                fs::create_dir_all(&config_dir)
                    .context(format!("Could not create config directory: {config_dir:?}"))?;
                config_dir
                    .canonicalize()
                    .context("Could not canonicalize config directory")?
            },
        };

        let mut builder = HierarchicalConfig::builder()
            .set_default("cache_dir", cache_dir.to_str().unwrap())?
            .set_default("data_dir", data_dir.to_str().unwrap())?
            // Config dir is added to the config for completeness;
            // the config file cannot change the config dir.
            .set_override("config_dir", config_dir.to_str().unwrap())?;

        // read from /etc
        builder = builder.add_source(
            config::File::from(PathBuf::from("/etc").join(RAILUP_CONFIG_FILE))
                .format(config::FileFormat::Toml)
                .required(false),
        );

        // then the user's config file
        builder = builder.add_source(
            config::File::from(config_dir.join(RAILUP_CONFIG_FILE))
                .format(config::FileFormat::Toml)
                .required(false),
        );

        // override via env variables
        let railup_envs = env::vars()
            .filter_map(|(k, v)| k.strip_prefix("RAILUP_").map(|k| (k.to_owned(), v)))
            .collect::<HashMap<_, _>>();

        let builder = builder.add_source(
            Environment::default()
                .source(Some(railup_envs))
                .try_parsing(true),
        );

        let final_config = builder.build()?;
        Ok(final_config)
    }

    /// Creates a [Config] from the environment and config files
    pub fn parse() -> Result<Config> {
        let final_config = Self::raw_config()?;
        let cli_config: Config = final_config
            .try_deserialize()
            .context("Could not parse config")?;
        Ok(cli_config)
    }

    /// get a value from the config
    ///
    /// **intended for human consumption/introspection of config only**
    ///
    /// Values in the context should be read from the [Config] type instead!
    pub fn get(&self, path: &[Key]) -> Result<String, ReadWriteError> {
        let document: toml_edit::DocumentMut = toml_edit::ser::to_document(self)?;

        if path.is_empty() {
            return Ok(document.to_string());
        }

        let mut cfg = document.as_table() as &dyn TableLike;

        let (key, parents) = path.split_last().unwrap();

        for (n, segment) in parents.iter().enumerate() {
            let maybe_value = cfg.get(segment).and_then(|item| item.as_table_like());

            match maybe_value {
                Some(v) => cfg = v,
                None => {
                    Err(ReadWriteError::InvalidKey(path[..=n].to_vec()))?;
                },
            }
        }

        let value = cfg
            .get(key.as_ref())
            .ok_or(ReadWriteError::InvalidKey(path.to_vec()))?;

        Ok(value.to_string())
    }

    /// Append or update a key value pair in the toml representation of a
    /// partial config
    ///
    /// Validate using [Self]
    pub fn write_to<V: Serialize>(
        config_file: Option<String>,
        path: &[Key],
        value: Option<V>,
    ) -> Result<String, ReadWriteError> {
        let mut validation_document = toml_edit::ser::to_document(&Config::default())?;

        let mut document = match config_file {
            Some(content) => content.parse::<DocumentMut>()?,
            None => DocumentMut::new(),
        };

        let (mut handle, mut validation) =
            (document.as_table_mut(), validation_document.as_table_mut());

        let (key, parents) = path.split_last().unwrap();

        for segment in parents {
            trace!("stepping into path segment {}", segment);

            if !handle.contains_table(segment) {
                handle.insert(segment, Item::Table(Table::new()));
            }
            if !validation.contains_table(segment) {
                validation.insert(segment, Item::Table(Table::new()));
            }

            handle = handle.get_mut(segment).unwrap().as_table_mut().unwrap();
            validation = validation.get_mut(segment).unwrap().as_table_mut().unwrap();
        }

        trace!("write value for key '{}'", key.display_repr());

        match value {
            None => {
                let _ = handle
                    .remove(key.as_ref())
                    .ok_or(ReadWriteError::NotAUserValue(path.to_vec()))?;
            },
            Some(ref value) => {
                for handle in [handle, validation] {
                    handle.insert(
                        key.as_ref(),
                        Item::Value(value.serialize(toml_edit::ser::ValueSerializer::default())?),
                    );
                }
                trace!("try parsing the new virtual config (validation)");
                let validation_config: Config = toml_edit::de::from_document(validation_document)?;

                validation_config.get(path)?;
            },
        }

        Ok(document.to_string())
    }

    pub fn write_to_in<V: Serialize>(
        config_file_path: impl AsRef<Path>,
        temp_dir: impl AsRef<Path>,
        query: &[Key],
        value: Option<V>,
    ) -> Result<(), ReadWriteError> {
        let config_file_contents = match fs::read_to_string(&config_file_path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No existing user config file found in {:?}, creating it now",
                    config_file_path.as_ref()
                );
                Ok(None)
            },
            Err(e) => Err(e),
        }
        .map_err(ReadWriteError::ReadConfig)?;

        let config_file_contents = Self::write_to(config_file_contents, query, value)?;

        let tempfile = tempfile::Builder::new().tempfile_in(temp_dir)?;
        fs::write(&tempfile, config_file_contents).map_err(ReadWriteError::WriteConfig)?;
        tempfile.persist(config_file_path)?;

        Ok(())
    }
}
