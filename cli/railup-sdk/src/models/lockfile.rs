use std::fmt::Display;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::platform::{Platform, UnameStyle};

/// The upstream environment spec, used when no local lockfile is available.
/// Resolving from it is slower since the manager has to run its solver.
pub const REMOTE_ENVIRONMENT_SPEC: &str =
    "https://raw.githubusercontent.com/LSSTDESC/rail/refs/heads/main/environment.yml";

/// Directory searched for platform lockfiles, relative to the working dir.
pub const LOCKFILE_DIR: &str = "lockfiles";

/// `conda-lock render` output name for this platform,
/// e.g. `conda-linux-64.lock`.
pub fn lockfile_name(platform: &Platform) -> String {
    let (kernel, arch) = platform.render(UnameStyle::CondaLock);
    format!("conda-{kernel}-{arch}.lock")
}

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("lockfile `{}` not found", .0.display())]
    Missing(PathBuf),
}

/// What `env create --file` is pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSpec {
    /// A local lockfile with solved, pinned packages.
    Lockfile(PathBuf),
    /// A URL the environment manager fetches and solves itself.
    Remote(String),
}

impl EnvSpec {
    /// Pick the environment spec for `platform`.
    ///
    /// A lockfile under `{base_dir}/lockfiles/` wins when present. Otherwise
    /// fall back to the remote spec, unless `require_local` is set, in which
    /// case the missing lockfile is an error. Container builds stage
    /// lockfiles into the image precisely so the build does not depend on
    /// the network, so they must not fall back silently.
    pub fn resolve(
        base_dir: &Path,
        platform: &Platform,
        require_local: bool,
    ) -> Result<Self, LockfileError> {
        let lockfile = base_dir.join(LOCKFILE_DIR).join(lockfile_name(platform));
        if lockfile.exists() {
            return Ok(EnvSpec::Lockfile(lockfile));
        }
        if require_local {
            return Err(LockfileError::Missing(lockfile));
        }
        Ok(EnvSpec::Remote(REMOTE_ENVIRONMENT_SPEC.to_string()))
    }
}

impl Display for EnvSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvSpec::Lockfile(path) => write!(f, "{}", path.display()),
            EnvSpec::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lockfile_names_cover_both_platforms() {
        assert_eq!(lockfile_name(&Platform::LINUX_X86_64), "conda-linux-64.lock");
        assert_eq!(lockfile_name(&Platform::DARWIN_ARM64), "conda-osx-arm64.lock");
    }

    #[test]
    fn local_lockfile_wins() {
        let dir = tempfile::tempdir().unwrap();
        let lockfile_dir = dir.path().join(LOCKFILE_DIR);
        std::fs::create_dir(&lockfile_dir).unwrap();
        let lockfile = lockfile_dir.join("conda-linux-64.lock");
        std::fs::write(&lockfile, "# locked").unwrap();

        let resolved = EnvSpec::resolve(dir.path(), &Platform::LINUX_X86_64, false).unwrap();
        assert_eq!(resolved, EnvSpec::Lockfile(lockfile));
    }

    #[test]
    fn falls_back_to_the_remote_spec() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = EnvSpec::resolve(dir.path(), &Platform::LINUX_X86_64, false).unwrap();
        assert_eq!(
            resolved,
            EnvSpec::Remote(REMOTE_ENVIRONMENT_SPEC.to_string())
        );
    }

    #[test]
    fn missing_lockfile_is_an_error_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let err = EnvSpec::resolve(dir.path(), &Platform::DARWIN_ARM64, true).unwrap_err();
        assert!(err.to_string().contains("conda-osx-arm64.lock"));
    }
}
