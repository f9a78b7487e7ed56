use std::io::Stderr;
use std::sync::{LazyLock, Mutex};

pub mod colors;
pub mod dialog;
pub mod errors;
pub mod init;
pub mod message;

/// Explicit mutex for stderr.
///
/// Use this instead of [std::io::stderr] where the lock needs to be shared
/// between the logger and interactive dialogs, so that log lines do not tear
/// through an active prompt.
pub static TERMINAL_STDERR: LazyLock<Mutex<Stderr>> =
    LazyLock::new(|| Mutex::new(std::io::stderr()));
