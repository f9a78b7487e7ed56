use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlatformError {
    #[error("Windows is not supported. Please use WSL.")]
    Windows,
    #[error("unrecognized operating system `{0}`")]
    UnknownKernel(String),
    #[error("unrecognized CPU architecture `{0}`")]
    UnknownArch(String),
    #[error("Intel macs are not supported.")]
    IntelMac,
    #[error("non-x86 Linux is not supported.")]
    ArmLinux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Linux,
    Darwin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Arm64,
}

/// How a `(kernel, arch)` pair is spelled for a particular consumer.
///
/// Every tool in the conda family picked its own naming scheme for release
/// assets and lockfiles, so the same machine goes by several names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnameStyle {
    /// Anaconda installer assets: `Linux`/`MacOSX`, architecture verbatim.
    Conda,
    /// Miniforge installer assets: `Linux`/`Darwin`, architecture verbatim.
    Mamba,
    /// Micromamba release naming: `linux`/`osx`, `64` for x86_64.
    Micromamba,
    /// `conda-lock render` output naming, same scheme as micromamba.
    CondaLock,
}

/// The kernel/architecture pair of the machine an environment is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub kernel: Kernel,
    pub arch: Arch,
}

impl Platform {
    pub const LINUX_X86_64: Platform = Platform {
        kernel: Kernel::Linux,
        arch: Arch::X86_64,
    };
    pub const DARWIN_ARM64: Platform = Platform {
        kernel: Kernel::Darwin,
        arch: Arch::Arm64,
    };

    /// Determine the platform of the running system.
    ///
    /// Fails on systems that have no representation here at all; combinations
    /// that are representable but unsupported (Intel macs, arm Linux) are
    /// rejected later by [Platform::ensure_supported] so that callers can
    /// report them precisely.
    pub fn detect() -> Result<Self, PlatformError> {
        let kernel = match std::env::consts::OS {
            "linux" => Kernel::Linux,
            "macos" => Kernel::Darwin,
            "windows" => return Err(PlatformError::Windows),
            other => return Err(PlatformError::UnknownKernel(other.to_string())),
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Arm64,
            other => return Err(PlatformError::UnknownArch(other.to_string())),
        };
        Ok(Platform { kernel, arch })
    }

    /// Environments can only be built for Linux/x86_64 and macOS/arm64.
    ///
    /// Some of the compiled scientific dependencies have no builds for the
    /// other combinations.
    pub fn ensure_supported(&self) -> Result<(), PlatformError> {
        match (self.kernel, self.arch) {
            (Kernel::Linux, Arch::X86_64) | (Kernel::Darwin, Arch::Arm64) => Ok(()),
            (Kernel::Darwin, Arch::X86_64) => Err(PlatformError::IntelMac),
            (Kernel::Linux, Arch::Arm64) => Err(PlatformError::ArmLinux),
        }
    }

    /// Spell the platform the way `style`'s consumer expects it.
    pub fn render(&self, style: UnameStyle) -> (&'static str, &'static str) {
        let kernel = match (style, self.kernel) {
            (UnameStyle::Conda, Kernel::Linux) => "Linux",
            (UnameStyle::Conda, Kernel::Darwin) => "MacOSX",
            (UnameStyle::Mamba, Kernel::Linux) => "Linux",
            (UnameStyle::Mamba, Kernel::Darwin) => "Darwin",
            (UnameStyle::Micromamba | UnameStyle::CondaLock, Kernel::Linux) => "linux",
            (UnameStyle::Micromamba | UnameStyle::CondaLock, Kernel::Darwin) => "osx",
        };

        // uname reports the same arm chip as `arm64` on macOS and `aarch64`
        // on Linux; the verbatim styles expect exactly those spellings.
        let arch = match (style, self.arch) {
            (UnameStyle::Conda | UnameStyle::Mamba, Arch::X86_64) => "x86_64",
            (UnameStyle::Conda | UnameStyle::Mamba, Arch::Arm64) => match self.kernel {
                Kernel::Linux => "aarch64",
                Kernel::Darwin => "arm64",
            },
            (UnameStyle::Micromamba | UnameStyle::CondaLock, Arch::X86_64) => "64",
            (UnameStyle::Micromamba | UnameStyle::CondaLock, Arch::Arm64) => "arm64",
        };

        (kernel, arch)
    }
}

impl Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kernel::Linux => write!(f, "linux"),
            Kernel::Darwin => write!(f, "darwin"),
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X86_64 => write!(f, "x86_64"),
            Arch::Arm64 => write!(f, "arm64"),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kernel, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn supported_platforms_pass_the_gate() {
        assert_eq!(Platform::LINUX_X86_64.ensure_supported(), Ok(()));
        assert_eq!(Platform::DARWIN_ARM64.ensure_supported(), Ok(()));
    }

    #[test]
    fn unsupported_platforms_are_rejected() {
        let intel_mac = Platform {
            kernel: Kernel::Darwin,
            arch: Arch::X86_64,
        };
        assert_eq!(
            intel_mac.ensure_supported(),
            Err(PlatformError::IntelMac)
        );

        let arm_linux = Platform {
            kernel: Kernel::Linux,
            arch: Arch::Arm64,
        };
        assert_eq!(
            arm_linux.ensure_supported(),
            Err(PlatformError::ArmLinux)
        );
    }

    #[test]
    fn conda_spelling() {
        assert_eq!(
            Platform::LINUX_X86_64.render(UnameStyle::Conda),
            ("Linux", "x86_64")
        );
        assert_eq!(
            Platform::DARWIN_ARM64.render(UnameStyle::Conda),
            ("MacOSX", "arm64")
        );
    }

    #[test]
    fn mamba_spelling() {
        assert_eq!(
            Platform::LINUX_X86_64.render(UnameStyle::Mamba),
            ("Linux", "x86_64")
        );
        assert_eq!(
            Platform::DARWIN_ARM64.render(UnameStyle::Mamba),
            ("Darwin", "arm64")
        );
        let arm_linux = Platform {
            kernel: Kernel::Linux,
            arch: Arch::Arm64,
        };
        assert_eq!(arm_linux.render(UnameStyle::Mamba), ("Linux", "aarch64"));
    }

    #[test]
    fn lockfile_spelling() {
        assert_eq!(
            Platform::LINUX_X86_64.render(UnameStyle::CondaLock),
            ("linux", "64")
        );
        assert_eq!(
            Platform::DARWIN_ARM64.render(UnameStyle::CondaLock),
            ("osx", "arm64")
        );
    }
}
