use indoc::indoc;
use railup_sdk::providers::{EXIT_NOT_FOUND, ExecError};

/// Printed after command failures that may be caused by underpowered hardware.
/// Resolving Python environments is memory hungry and the error messages
/// produced when the resolver is killed are rarely actionable on their own.
const HARDWARE_NOTE: &str = indoc! {"
    If this error occurred while creating or installing into a Python virtual environment,
    and the error message is vague, this may be related to hardware specifications. Please
    visit the RAIL documentation on minimum requirements.

    Working with the RAIL virtual environment requires at least 4GiB of RAM, and 5GiB of free storage.
"};

/// Returns a String representation of an error chain, e.g.
/// "failed to do x: tried y: but z was not found"
///
/// Use this for **top level** error formatting,
/// as it includes the Display representation of the error itself.
pub fn display_chain(mut err: &dyn std::error::Error) -> String {
    let mut fmt = err.to_string();
    while let Some(source) = err.source() {
        fmt = format!("{fmt}: {source}");
        err = source;
    }

    fmt
}

/// Format an [anyhow::Error] for the user, including all its causes.
///
/// When the chain contains a command that exited nonzero (other than the
/// exit code signalling a missing executable), the hardware requirements
/// note is appended.
pub fn format_error(err: &anyhow::Error) -> String {
    let message = err
        .chain()
        .skip(1)
        .fold(err.to_string(), |acc, cause| format!("{acc}: {cause}"));

    match exec_exit_code(err) {
        Some(code) if code != EXIT_NOT_FOUND => format!("{message}\n\n{HARDWARE_NOTE}"),
        _ => message,
    }
}

/// The exit code of the failed command in the chain of `err`, if any.
pub fn exec_exit_code(err: &anyhow::Error) -> Option<i32> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ExecError>())
        .and_then(ExecError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    #[test]
    fn chain_includes_all_causes() {
        let err = anyhow::Error::from(Inner).context("outer failure");
        assert_eq!(format_error(&err), "outer failure: inner failure");
    }

    #[test]
    fn hardware_note_appended_for_nonzero_exit() {
        let err = anyhow::Error::from(ExecError::Status {
            command: "conda create".to_string(),
            code: 137,
        });
        let formatted = format_error(&err);
        assert!(formatted.contains("hardware specifications"));
        assert_eq!(exec_exit_code(&err), Some(137));
    }

    #[test]
    fn hardware_note_skipped_for_missing_executable() {
        let err = anyhow::Error::from(ExecError::Status {
            command: "bash".to_string(),
            code: EXIT_NOT_FOUND,
        })
        .context("checking requirements");
        let formatted = format_error(&err);
        assert!(!formatted.contains("hardware specifications"));
    }
}
