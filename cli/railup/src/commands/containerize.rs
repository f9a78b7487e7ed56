use std::convert::Infallible;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use anyhow::{Context, Result, bail};
use bpaf::Bpaf;
use indoc::formatdoc;
use railup_sdk::models::lockfile::{LOCKFILE_DIR, lockfile_name};
use railup_sdk::models::manager::ManagerFlavor;
use railup_sdk::models::packages::PackageSelection;
use railup_sdk::models::platform::{Kernel, Platform};
use railup_sdk::models::recipe::{EntryPoint, INSTALLER_NAME, InstallerSource, Recipe};
use railup_sdk::providers::Runner;
use railup_sdk::providers::runtime::ContainerRuntime;
use railup_sdk::railup::Railup;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::utils::message;

// Render the container recipe or build it into an image
#[derive(Bpaf, Clone, Debug)]
pub struct Containerize {
    /// Base image to build upon, defaults to 'ubuntu:22.04'
    #[bpaf(long("base-image"), argument("image"))]
    base_image: Option<String>,

    /// Unprivileged user created in the image, defaults to 'rail'
    #[bpaf(argument("name"))]
    user: Option<String>,

    /// Group of the unprivileged user, defaults to 'rail'
    #[bpaf(argument("name"))]
    group: Option<String>,

    /// Numeric id of the user, defaults to 1000
    #[bpaf(argument("uid"))]
    uid: Option<u32>,

    /// Numeric id of the group, defaults to 1000
    #[bpaf(argument("gid"))]
    gid: Option<u32>,

    /// Environment manager bootstrapped in the image. 'mamba' or 'miniconda'
    #[bpaf(argument("flavor"))]
    flavor: Option<ManagerFlavor>,

    /// Name of the environment created in the image, defaults to 'rail'
    #[bpaf(long("env-name"), argument("name"))]
    env_name: Option<String>,

    /// RAIL algorithm packages installed into the image.
    /// 'all', 'none', or a comma separated subset
    #[bpaf(argument("packages"))]
    packages: Option<PackageSelection>,

    /// Serve Jupyter on port 8888 instead of starting a login shell
    notebook: bool,

    /// Let the build solve the environment from the remote spec
    /// instead of staging local lockfiles
    #[bpaf(long("remote-lockfiles"))]
    remote_lockfiles: bool,

    #[bpaf(external(installer_arg), optional)]
    installer: Option<InstallerArg>,

    /// Output to write the recipe to.
    /// Defaults to building an image if docker or podman is present
    /// or otherwise writes to a file 'Dockerfile'
    #[bpaf(external(output_target), optional)]
    output: Option<OutputTarget>,

    /// Tag to apply to the image, defaults to 'railup-{env_name}:latest'
    #[bpaf(short, long, argument("tag"))]
    tag: Option<String>,
}

impl Containerize {
    #[instrument(name = "containerize", skip_all)]
    pub async fn handle(self, config: Config, railup: Railup) -> Result<()> {
        let recipe = self.recipe(&config);
        let rendered = recipe.render()?;

        let output = self
            .output
            .clone()
            .or(config.railup.runtime.map(OutputTarget::Runtime))
            .unwrap_or_else(OutputTarget::detect_or_default);

        match &output {
            OutputTarget::File(target) => {
                target.write(&rendered)?;
                message::created(format!("Recipe written to {output}"));
                if recipe.installer == InstallerSource::Copy {
                    message::plain(format!(
                        "Stage the installer as '{INSTALLER_NAME}' next to the recipe before building"
                    ));
                }
            },
            OutputTarget::Runtime(runtime) => {
                let tag = self
                    .tag
                    .unwrap_or_else(|| format!("railup-{}:latest", recipe.env_name));
                let installer = match self.installer {
                    Some(InstallerArg::Copy(path)) => Some(path),
                    Some(InstallerArg::Fetch(_)) => None,
                    None => {
                        if let Some(warning) = non_linux_host_warning(&railup.platform) {
                            message::warning(warning);
                        }
                        Some(
                            env::current_exe()
                                .context("Could not locate the running railup executable")?,
                        )
                    },
                };
                let context = stage_context(
                    &railup.temp_dir,
                    &rendered,
                    installer.as_deref(),
                    recipe.local_lockfiles,
                )?;
                let runner = Runner::new(false, railup.verbosity >= 1);
                runtime.build(&context, &tag, &runner)?;
                message::created(format!("Image '{tag}' built with {output}"));
            },
        }

        Ok(())
    }

    /// Resolve recipe fields from flags, config, and the built-in defaults,
    /// in that order.
    fn recipe(&self, config: &Config) -> Recipe {
        let defaults = Recipe::default();
        Recipe {
            base_image: self
                .base_image
                .clone()
                .or_else(|| config.railup.base_image.clone())
                .unwrap_or(defaults.base_image),
            system_packages: defaults.system_packages,
            group: self.group.clone().unwrap_or(defaults.group),
            gid: self.gid.unwrap_or(defaults.gid),
            user: self.user.clone().unwrap_or(defaults.user),
            uid: self.uid.unwrap_or(defaults.uid),
            flavor: self
                .flavor
                .or(config.railup.default_manager)
                .unwrap_or(defaults.flavor),
            env_name: self
                .env_name
                .clone()
                .or_else(|| config.railup.default_env_name.clone())
                .unwrap_or(defaults.env_name),
            packages: self.packages.clone().unwrap_or(defaults.packages),
            devtools: config.railup.devtools.unwrap_or(defaults.devtools),
            clean: defaults.clean,
            verbose: defaults.verbose,
            installer: match &self.installer {
                Some(InstallerArg::Fetch(url)) => InstallerSource::Fetch { url: url.clone() },
                _ => InstallerSource::Copy,
            },
            local_lockfiles: !self.remote_lockfiles,
            entry: if self.notebook {
                EntryPoint::Notebook
            } else {
                EntryPoint::Shell
            },
        }
    }
}

/// Assemble the build context in a temp dir: the rendered recipe, the staged
/// installer, and the lockfiles the in-image installer reads.
fn stage_context(
    temp_dir: &Path,
    rendered: &str,
    installer: Option<&Path>,
    local_lockfiles: bool,
) -> Result<PathBuf> {
    let context = temp_dir.join("container");
    fs::create_dir_all(&context).context("Could not create the build context directory")?;
    fs::write(context.join("Dockerfile"), rendered)
        .context("Could not write the recipe into the build context")?;

    if let Some(installer) = installer {
        let staged = context.join(INSTALLER_NAME);
        fs::copy(installer, &staged)
            .with_context(|| format!("Could not stage installer '{}'", installer.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))
                .context("Could not mark the staged installer executable")?;
        }
    }

    if local_lockfiles {
        stage_lockfiles(&env::current_dir()?.join(LOCKFILE_DIR), &context)?;
    }

    Ok(context)
}

/// Copy `*.lock` files from `source_dir` into the context. Images are Linux,
/// so the Linux lockfile must be among them.
fn stage_lockfiles(source_dir: &Path, context: &Path) -> Result<()> {
    let staged_dir = context.join(LOCKFILE_DIR);
    fs::create_dir_all(&staged_dir).context("Could not create the lockfile staging directory")?;

    if source_dir.is_dir() {
        for entry in fs::read_dir(source_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "lock") {
                fs::copy(&path, staged_dir.join(entry.file_name()))?;
            }
        }
    }

    let required = lockfile_name(&Platform::LINUX_X86_64);
    if !staged_dir.join(&required).exists() {
        bail!(
            "lockfile `{}` not found, pass '--remote-lockfiles' to let the build solve the environment itself",
            source_dir.join(&required).display()
        );
    }
    debug!(dir = %staged_dir.display(), "staged lockfiles into the build context");

    Ok(())
}

/// Images are Linux, so defaulting the staged installer to the running
/// executable only produces a runnable image when the host is Linux too.
fn non_linux_host_warning(platform: &Platform) -> Option<String> {
    if platform.kernel == Kernel::Linux {
        return None;
    }
    Some(formatdoc! {"
        Staging the running railup executable as the in-image installer, but this
        host is not Linux, so the staged binary cannot run inside the image.
        Pass '--installer <path>' with a Linux build of railup, or
        '--fetch-installer <url>' to have the build download one."})
}

/// Where the in-image installer comes from.
#[derive(Debug, Clone, PartialEq, Eq, Bpaf)]
enum InstallerArg {
    Copy(
        #[bpaf(
            long("installer"),
            argument("path"),
            help("Installer executable to stage into the build context, defaults to the running railup")
        )]
        PathBuf,
    ),
    Fetch(
        #[bpaf(
            long("fetch-installer"),
            argument("url"),
            help("Fetch the installer from this URL during the build instead of staging it")
        )]
        String,
    ),
}

#[derive(Debug, Clone, PartialEq, Eq, Bpaf)]
enum OutputTarget {
    File(
        #[bpaf(
            long("file"),
            short('f'),
            argument("file"),
            help("File to write the recipe to. '-' to write to stdout.")
        )]
        FileOrStdout,
    ),
    Runtime(
        #[bpaf(
            long("runtime"),
            argument("runtime"),
            help("Container runtime to build the image with. 'docker' or 'podman'")
        )]
        ContainerRuntime,
    ),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOrStdout {
    File(PathBuf),
    Stdout,
}

impl FromStr for FileOrStdout {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "-" {
            Ok(FileOrStdout::Stdout)
        } else {
            Ok(FileOrStdout::File(PathBuf::from(s)))
        }
    }
}

impl FileOrStdout {
    fn write(&self, rendered: &str) -> Result<()> {
        match self {
            FileOrStdout::File(path) => {
                fs::write(path, rendered).context("Could not write the recipe file")?
            },
            FileOrStdout::Stdout => io::stdout()
                .write_all(rendered.as_bytes())
                .context("Could not write the recipe to stdout")?,
        }
        Ok(())
    }
}

impl OutputTarget {
    /// A present container runtime wins; otherwise write a 'Dockerfile'.
    fn detect_or_default() -> Self {
        let Some(runtime) = ContainerRuntime::detect() else {
            debug!("No container runtime found in PATH, defaulting to file");
            return OutputTarget::File(FileOrStdout::File(PathBuf::from("Dockerfile")));
        };

        OutputTarget::Runtime(runtime)
    }
}

impl Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::File(FileOrStdout::File(path)) => write!(f, "file '{}'", path.display()),
            OutputTarget::File(FileOrStdout::Stdout) => write!(f, "stdout"),
            OutputTarget::Runtime(runtime) => write!(f, "the {runtime} runtime"),
        }
    }
}
