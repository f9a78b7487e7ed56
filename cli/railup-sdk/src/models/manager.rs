use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::platform::{Platform, UnameStyle};

/// The conda-compatible environment managers railup knows how to drive.
///
/// Declaration order is discovery order: when several managers are present,
/// the first one found wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerFlavor {
    Micromamba,
    Mamba,
    Miniconda,
    Anaconda,
}

impl ManagerFlavor {
    pub const DISCOVERY_ORDER: [ManagerFlavor; 4] = [
        ManagerFlavor::Micromamba,
        ManagerFlavor::Mamba,
        ManagerFlavor::Miniconda,
        ManagerFlavor::Anaconda,
    ];

    /// The executable looked up on `$PATH`.
    ///
    /// Miniconda and Anaconda are distributions of the same `conda` tool.
    pub fn executable(&self) -> &'static str {
        match self {
            ManagerFlavor::Micromamba => "micromamba",
            ManagerFlavor::Mamba => "mamba",
            ManagerFlavor::Miniconda | ManagerFlavor::Anaconda => "conda",
        }
    }

    /// Name of the directory a user-level installation lives in, under the
    /// user's home. Micromamba has no fixed installation directory.
    pub fn home_dir_name(&self) -> Option<&'static str> {
        match self {
            ManagerFlavor::Micromamba => None,
            ManagerFlavor::Mamba => Some("miniforge3"),
            ManagerFlavor::Miniconda => Some("miniconda3"),
            ManagerFlavor::Anaconda => Some("anaconda3"),
        }
    }

    /// Directory of a user-level installation, if the flavor has a fixed one.
    pub fn home_dir(&self) -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(self.home_dir_name()?))
    }

    /// The script that puts the manager on `$PATH` when its shell hook has
    /// not been installed.
    pub fn activation_script(&self) -> Option<PathBuf> {
        Some(self.home_dir()?.join("bin").join("activate"))
    }

    /// Whether railup can bootstrap this manager itself.
    pub fn installable(&self) -> bool {
        matches!(self, ManagerFlavor::Mamba | ManagerFlavor::Miniconda)
    }

    pub fn installable_flavors() -> [ManagerFlavor; 2] {
        [ManagerFlavor::Mamba, ManagerFlavor::Miniconda]
    }

    /// Download URL of the bootstrap installer for this platform.
    pub fn installer_link(&self, platform: &Platform) -> Option<String> {
        match self {
            ManagerFlavor::Mamba => {
                let (kernel, arch) = platform.render(UnameStyle::Mamba);
                Some(format!(
                    "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-{kernel}-{arch}.sh"
                ))
            },
            ManagerFlavor::Miniconda => {
                let (kernel, arch) = platform.render(UnameStyle::Conda);
                Some(format!(
                    "https://repo.anaconda.com/miniconda/Miniconda3-latest-{kernel}-{arch}.sh"
                ))
            },
            _ => None,
        }
    }

    /// Flags passed to the bootstrap installer, followed by the target dir.
    pub fn installer_options(&self) -> &'static [&'static str] {
        match self {
            ManagerFlavor::Mamba => &["-b", "-u", "-p"],
            ManagerFlavor::Miniconda => &["-b", "-u", "-c", "-p"],
            _ => &[],
        }
    }

    /// How to ask this manager for its version, and the oldest version that
    /// still works.
    ///
    /// mamba reports through `conda --version`: Miniforge ships conda
    /// alongside mamba and the two are versioned together.
    pub fn version_probe(&self) -> VersionProbe {
        match self.executable() {
            "micromamba" => VersionProbe {
                argv: &["micromamba", "--version"],
                output: VersionOutput::Bare,
                floor: Version::new(1, 5, 8),
            },
            _ => VersionProbe {
                argv: &["conda", "--version"],
                output: VersionOutput::LastWord,
                floor: Version::new(23, 5, 0),
            },
        }
    }
}

impl Display for ManagerFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ManagerFlavor::Micromamba => "micromamba",
            ManagerFlavor::Mamba => "mamba",
            ManagerFlavor::Miniconda => "miniconda",
            ManagerFlavor::Anaconda => "anaconda",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown environment manager `{0}`, expected one of micromamba, mamba, miniconda, anaconda")]
pub struct ParseFlavorError(String);

impl FromStr for ManagerFlavor {
    type Err = ParseFlavorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "micromamba" => Ok(ManagerFlavor::Micromamba),
            "mamba" => Ok(ManagerFlavor::Mamba),
            "miniconda" => Ok(ManagerFlavor::Miniconda),
            "anaconda" => Ok(ManagerFlavor::Anaconda),
            other => Err(ParseFlavorError(other.to_string())),
        }
    }
}

/// Shape of a manager's `--version` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOutput {
    /// The bare version string, e.g. `1.5.8`.
    Bare,
    /// `<tool> <version>`, e.g. `conda 23.5.2`.
    LastWord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProbe {
    pub argv: &'static [&'static str],
    pub output: VersionOutput,
    pub floor: Version,
}

impl VersionProbe {
    /// Extract the version from the probe command's stdout.
    pub fn parse(&self, stdout: &str) -> Result<Version, ParseVersionError> {
        let raw = match self.output {
            VersionOutput::Bare => stdout.trim(),
            VersionOutput::LastWord => stdout
                .trim()
                .rsplit(' ')
                .next()
                .unwrap_or_default(),
        };
        Version::parse(raw).map_err(|err| ParseVersionError {
            raw: raw.to_string(),
            err,
        })
    }
}

#[derive(Debug, Error)]
#[error("could not parse version from `{raw}`: {err}")]
pub struct ParseVersionError {
    raw: String,
    #[source]
    err: semver::Error,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn flavors_parse_from_their_names() {
        for flavor in ManagerFlavor::DISCOVERY_ORDER {
            assert_eq!(flavor.to_string().parse(), Ok(flavor));
        }
        assert_eq!(
            "condaaa".parse::<ManagerFlavor>(),
            Err(ParseFlavorError("condaaa".to_string()))
        );
    }

    #[test]
    fn only_mamba_and_miniconda_are_installable() {
        let installable: Vec<_> = ManagerFlavor::DISCOVERY_ORDER
            .into_iter()
            .filter(ManagerFlavor::installable)
            .collect();
        assert_eq!(installable, vec![
            ManagerFlavor::Mamba,
            ManagerFlavor::Miniconda
        ]);
    }

    #[test]
    fn installer_links_follow_asset_naming() {
        assert_eq!(
            ManagerFlavor::Mamba
                .installer_link(&Platform::LINUX_X86_64)
                .unwrap(),
            "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-Linux-x86_64.sh"
        );
        assert_eq!(
            ManagerFlavor::Mamba
                .installer_link(&Platform::DARWIN_ARM64)
                .unwrap(),
            "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-Darwin-arm64.sh"
        );
        assert_eq!(
            ManagerFlavor::Miniconda
                .installer_link(&Platform::DARWIN_ARM64)
                .unwrap(),
            "https://repo.anaconda.com/miniconda/Miniconda3-latest-MacOSX-arm64.sh"
        );
        assert_eq!(
            ManagerFlavor::Micromamba.installer_link(&Platform::LINUX_X86_64),
            None
        );
    }

    #[test]
    fn version_probe_parses_conda_style_output() {
        let probe = ManagerFlavor::Miniconda.version_probe();
        assert_eq!(
            probe.parse("conda 23.5.2\n").unwrap(),
            Version::new(23, 5, 2)
        );
    }

    #[test]
    fn version_probe_parses_bare_output() {
        let probe = ManagerFlavor::Micromamba.version_probe();
        assert_eq!(probe.parse("1.5.8\n").unwrap(), Version::new(1, 5, 8));
    }

    #[test]
    fn mamba_shares_the_conda_probe() {
        let probe = ManagerFlavor::Mamba.version_probe();
        assert_eq!(probe.argv, &["conda", "--version"]);
        assert_eq!(probe.floor, Version::new(23, 5, 0));
    }
}
