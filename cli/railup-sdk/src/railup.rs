use std::path::PathBuf;

use crate::models::platform::Platform;

/// The main context struct for a railup invocation.
///
/// A [Railup] instance is built once per CLI run from config and arguments
/// and handed to every command handler. It carries the resolved directories,
/// the detected platform, and the effective verbosity, so providers never
/// consult the process environment themselves.
#[derive(Debug, Clone)]
pub struct Railup {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,

    pub platform: Platform,

    pub verbosity: i32,
}
