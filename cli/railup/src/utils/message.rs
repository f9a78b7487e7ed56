//! Prints messages that are meant for the user to stderr.
//! Use these instead of println! or eprintln!.
//!
//! In tests messages are also recorded in a thread local [History],
//! so assertions can be made about what the user would have seen.

use std::fmt::Display;

fn print_message(v: impl Display) {
    #[cfg(test)]
    history::History::global().push_message(v.to_string());

    eprintln!("{v}");
}

pub(crate) fn plain(v: impl Display) {
    print_message(v);
}

/// Print a message in a distinct section header format.
pub(crate) fn header(v: impl Display) {
    let message = v.to_string();
    let width = message.chars().count().min(textwrap::termwidth());
    print_message(std::format_args!("\n\n{message}\n{}", "-".repeat(width)));
}

pub(crate) fn error(v: impl Display) {
    print_message(std::format_args!("❌ ERROR: {v}"));
}

pub(crate) fn created(v: impl Display) {
    print_message(std::format_args!("✨ {v}"));
}

/// double width character, add an additional space for alignment
pub(crate) fn deleted(v: impl Display) {
    print_message(std::format_args!("🗑️  {v}"));
}

pub(crate) fn updated(v: impl Display) {
    print_message(std::format_args!("✅ {v}"));
}

/// double width character, add an additional space for alignment
pub(crate) fn warning(v: impl Display) {
    print_message(std::format_args!("⚠️  {v}"));
}
