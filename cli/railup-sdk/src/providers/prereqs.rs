use std::process::Command;

use thiserror::Error;

use super::fetcher::Fetcher;
use super::{ExecError, Runner};
use crate::utils::find_in_path;

/// Tools the installer shells out to; all of them have to be present.
pub const REQUIRED_TOOLS: &[&str] = &["bash", "gcc", "gfortran", "g++", "make"];

#[derive(Debug, Error)]
pub enum PrereqError {
    #[error("missing prerequisite(s): {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("`{0}` reports an LLVM (clang) compiler, only GNU compilers are supported")]
    ClangCompiler(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// All required tools that are not on `$PATH`, batched so the user sees the
/// whole list at once. The download tool counts as missing only when neither
/// curl nor wget is present.
pub fn missing_tools() -> Vec<String> {
    let mut missing: Vec<String> = REQUIRED_TOOLS
        .iter()
        .filter(|tool| find_in_path(tool).is_none())
        .map(ToString::to_string)
        .collect();
    if Fetcher::detect().is_none() {
        missing.push("curl or wget".to_string());
    }
    missing
}

/// The compiler a `$CC`-style variable points at, with its default.
fn compiler_from_env(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// `--version` invocations of `$CC`/`$CXX` that turned out to be clang in
/// disguise. Apple aliases `gcc` to clang, which cannot build the Fortran
/// dependencies.
pub fn clang_compilers(runner: &Runner) -> Result<Vec<String>, ExecError> {
    let mut offending = Vec::new();
    for (var, default) in [("CC", "gcc"), ("CXX", "g++")] {
        let compiler = compiler_from_env(var, default);
        let mut command = Command::new(&compiler);
        command.arg("--version");
        let stdout = runner.probe(&mut command)?;
        if stdout.contains("clang") {
            offending.push(format!("{compiler} --version"));
        }
    }
    Ok(offending)
}

/// Run the full prerequisite check and return the download tool to use.
pub fn check_requirements(runner: &Runner) -> Result<Fetcher, PrereqError> {
    let missing = missing_tools();
    if !missing.is_empty() {
        return Err(PrereqError::Missing(missing));
    }

    if let Some(version_command) = clang_compilers(runner)?.into_iter().next() {
        return Err(PrereqError::ClangCompiler(version_command));
    }

    Fetcher::detect().ok_or_else(|| PrereqError::Missing(vec!["curl or wget".to_string()]))
}
