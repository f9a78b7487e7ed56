use std::sync::OnceLock;

use tracing::{debug, error};
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::Verbosity;
use crate::utils::TERMINAL_STDERR;

struct LockingTerminalStderr;
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LockingTerminalStderr {
    type Writer = LockingTerminalStderr;

    fn make_writer(&'a self) -> Self::Writer {
        LockingTerminalStderr
    }
}

impl std::io::Write for LockingTerminalStderr {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let buf_vec = buf.to_vec();
        if let Ok(mut guard) = TERMINAL_STDERR.lock() {
            guard.write_all(buf_vec.as_slice())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut guard) = TERMINAL_STDERR.lock() {
            guard.flush()?
        }
        Ok(())
    }
}

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

pub(crate) fn init_logger(verbosity: Option<Verbosity>) {
    let verbosity = verbosity.unwrap_or_default();

    let log_filter = match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,railup=error",
        // Only show warnings
        Verbosity::Verbose(0) => "off,railup=warn",
        // Show our own info logs
        Verbosity::Verbose(1) => "off,railup=info",
        // Also show debug from our libraries
        Verbosity::Verbose(2) => "off,railup=debug,railup_sdk=debug",
        // Also show trace from our libraries
        Verbosity::Verbose(3) => "off,railup=trace,railup_sdk=trace",
        // Also show debug from everything else
        Verbosity::Verbose(4) => "debug,railup=trace,railup_sdk=trace",
        Verbosity::Verbose(_) => "trace",
    };

    let filter_handle = LOGGER_HANDLE.get_or_init(init_registry);

    update_filters(filter_handle, log_filter);
}

pub fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => {
                error!("Updating logger filter failed: {}", err);
            },
        };
    });
    if let Err(err) = result {
        error!("Updating logger filter failed: {}", err);
    }
}

/// Install the global subscriber and return a handle for swapping its filter
/// once the actual verbosity is known.
fn init_registry() -> Handle<EnvFilter, Registry> {
    debug!("Initializing logger (how are you seeing this?)");
    // The first filter set here establishes an upper boundary for `log` crate
    // verbosity, so start at `trace` and immediately modify to the actual
    // level via the reload handle.
    let filter = tracing_subscriber::filter::EnvFilter::try_new("trace").unwrap();
    let (filter, filter_reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(LockingTerminalStderr)
        .event_format(tracing_subscriber::fmt::format())
        .with_filter(filter);

    tracing_subscriber::registry().with(log_layer).init();

    filter_reload_handle
}
