use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

use super::lockfile::LOCKFILE_DIR;
use super::manager::ManagerFlavor;
use super::packages::PackageSelection;

/// Name under which the installer artifact is staged in the build context
/// and addressed inside the image.
pub const INSTALLER_NAME: &str = "railup";

/// The notebook server's fixed port. Only the notebook entry point exposes it.
pub const NOTEBOOK_PORT: u16 = 8888;

pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";
pub const DEFAULT_USER: &str = "rail";
pub const DEFAULT_GROUP: &str = "rail";
pub const DEFAULT_UID: u32 = 1000;
pub const DEFAULT_GID: u32 = 1000;
pub const DEFAULT_ENV_NAME: &str = "rail";

/// Toolchain and network/version-control clients the installer's
/// prerequisite check expects to find in the image.
pub const DEFAULT_SYSTEM_PACKAGES: &[&str] = &[
    "build-essential",
    "ca-certificates",
    "curl",
    "gfortran",
    "git",
    "wget",
];

/// How the installer gets into the image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallerSource {
    /// `COPY` an artifact staged next to the Dockerfile into the image.
    #[default]
    Copy,
    /// Fetch the installer from a URL during the build.
    Fetch { url: String },
}

/// The container's default command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPoint {
    /// An interactive login shell that lands inside the environment.
    #[default]
    Shell,
    /// A Jupyter server bound to [NOTEBOOK_PORT].
    Notebook,
}

#[derive(Debug, Error, PartialEq)]
pub enum RecipeError {
    #[error("`{0}` cannot be bootstrapped inside an image, use mamba or miniconda")]
    FlavorNotInstallable(ManagerFlavor),
}

/// A parameterized container build recipe.
///
/// One recipe covers both deployment modes of the image: where the installer
/// comes from ([InstallerSource]) and what the container does when started
/// ([EntryPoint]) are fields, everything else renders identically. The build
/// steps are strictly ordered; nothing runs as root after the unprivileged
/// user exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub base_image: String,
    pub system_packages: Vec<String>,
    pub group: String,
    pub gid: u32,
    pub user: String,
    pub uid: u32,
    pub flavor: ManagerFlavor,
    pub env_name: String,
    pub packages: PackageSelection,
    pub devtools: bool,
    pub clean: bool,
    pub verbose: bool,
    pub installer: InstallerSource,
    pub local_lockfiles: bool,
    pub entry: EntryPoint,
}

impl Default for Recipe {
    fn default() -> Self {
        Recipe {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            system_packages: DEFAULT_SYSTEM_PACKAGES
                .iter()
                .map(ToString::to_string)
                .collect(),
            group: DEFAULT_GROUP.to_string(),
            gid: DEFAULT_GID,
            user: DEFAULT_USER.to_string(),
            uid: DEFAULT_UID,
            flavor: ManagerFlavor::Mamba,
            env_name: DEFAULT_ENV_NAME.to_string(),
            packages: PackageSelection::All,
            devtools: true,
            clean: true,
            verbose: true,
            installer: InstallerSource::default(),
            local_lockfiles: true,
            entry: EntryPoint::default(),
        }
    }
}

impl Recipe {
    /// Render the recipe as Dockerfile text.
    ///
    /// Rendering is deterministic: equal recipes produce byte-identical
    /// output (system packages are sorted, nothing else varies).
    pub fn render(&self) -> Result<String, RecipeError> {
        if !self.flavor.installable() {
            return Err(RecipeError::FlavorNotInstallable(self.flavor));
        }
        let manager_dir = self
            .flavor
            .home_dir_name()
            .ok_or(RecipeError::FlavorNotInstallable(self.flavor))?;

        let mut blocks = Vec::new();

        blocks.push(format!("FROM {}", self.base_image));
        blocks.push(self.apt_block());
        blocks.push(continuation(&[
            format!("RUN groupadd --gid {} {}", self.gid, self.group),
            format!(
                "    && useradd --create-home --uid {} --gid {} {}",
                self.uid, self.gid, self.user
            ),
        ]));
        blocks.push(format!(
            "USER {}\nWORKDIR /home/{}",
            self.user, self.user
        ));

        if let Some(staging) = self.staging_block() {
            blocks.push(staging);
        }

        blocks.push(self.install_block());
        blocks.push(self.profile_block(manager_dir));

        if self.entry == EntryPoint::Notebook {
            blocks.push(format!("EXPOSE {NOTEBOOK_PORT}"));
        }
        blocks.push(self.cmd_block(manager_dir));

        Ok(blocks.join("\n\n") + "\n")
    }

    fn apt_block(&self) -> String {
        let mut packages = self.system_packages.clone();
        packages.sort();

        let mut lines = vec![
            "RUN apt-get update".to_string(),
            "    && apt-get install --yes --no-install-recommends".to_string(),
        ];
        lines.extend(packages.iter().map(|package| format!("        {package}")));
        lines.push("    && rm -rf /var/lib/apt/lists/*".to_string());
        continuation(&lines)
    }

    /// `COPY` lines for the installer and the lockfiles, when either is
    /// staged into the build context.
    fn staging_block(&self) -> Option<String> {
        let chown = format!("--chown={}:{}", self.user, self.group);
        let mut lines = Vec::new();
        if self.installer == InstallerSource::Copy {
            lines.push(format!("COPY {chown} {INSTALLER_NAME} ./{INSTALLER_NAME}"));
        }
        if self.local_lockfiles {
            lines.push(format!("COPY {chown} {LOCKFILE_DIR}/ ./{LOCKFILE_DIR}/"));
        }
        if lines.is_empty() {
            return None;
        }
        Some(lines.join("\n"))
    }

    /// The one `RUN` with real behavior: stage the installer if it is
    /// fetched, invoke it, and remove installer and lockfiles again. Removal
    /// shares the `RUN` so the artifacts never survive into the final layer.
    fn install_block(&self) -> String {
        let verbose = if self.verbose { " -v" } else { "" };
        let invocation = format!("./{INSTALLER_NAME}{verbose} install");

        let mut lines = Vec::new();
        match &self.installer {
            InstallerSource::Copy => {
                lines.push(format!("RUN {invocation}"));
            },
            InstallerSource::Fetch { url } => {
                lines.push(format!(
                    "RUN curl -fsSL {} -o {INSTALLER_NAME}",
                    shell_escape(url)
                ));
                lines.push(format!("    && chmod +x {INSTALLER_NAME}"));
                lines.push(format!("    && {invocation}"));
            },
        }
        lines.extend(
            self.install_flags()
                .iter()
                .map(|flag| format!("        {flag}")),
        );

        let mut removed = vec![INSTALLER_NAME];
        if self.local_lockfiles {
            removed.push(LOCKFILE_DIR);
        }
        lines.push(format!("    && rm -rf {}", removed.join(" ")));

        continuation(&lines)
    }

    /// Flags of the installer invocation. Every choice is passed explicitly
    /// so the build never prompts.
    fn install_flags(&self) -> Vec<String> {
        let mut flags = vec![
            format!("--install-manager {}", self.flavor),
            format!("--env-name {}", shell_escape(&self.env_name)),
            format!("--packages {}", self.packages),
            if self.devtools {
                "--devtools".to_string()
            } else {
                "--no-devtools".to_string()
            },
        ];
        if self.local_lockfiles {
            flags.push("--local-lockfiles".to_string());
        }
        if self.clean {
            flags.push("--clean".to_string());
        }
        flags
    }

    fn profile_block(&self, manager_dir: &str) -> String {
        let activate = format!(". \"$HOME/{manager_dir}/bin/activate\"");
        let enter_env = shell_escape(&format!("conda activate {}", self.env_name));
        continuation(&[
            format!("RUN echo '{activate}' >> \"$HOME/.bashrc\""),
            format!("    && echo {enter_env} >> \"$HOME/.bashrc\""),
        ])
    }

    /// The exec-form `CMD`. Docker parses the array as JSON, so every
    /// element is a JSON string, not a shell word.
    fn cmd_block(&self, manager_dir: &str) -> String {
        let argv: Vec<String> = match self.entry {
            EntryPoint::Shell => vec!["bash".to_string(), "-l".to_string()],
            EntryPoint::Notebook => vec![
                format!("/home/{}/{}/bin/conda", self.user, manager_dir),
                "run".to_string(),
                "--no-capture-output".to_string(),
                "--name".to_string(),
                self.env_name.clone(),
                "jupyter".to_string(),
                "lab".to_string(),
                "--ip=0.0.0.0".to_string(),
                format!("--port={NOTEBOOK_PORT}"),
                "--no-browser".to_string(),
            ],
        };
        let quoted: Vec<String> = argv
            .into_iter()
            .map(|arg| Value::String(arg).to_string())
            .collect();
        format!("CMD [{}]", quoted.join(", "))
    }
}

/// Join instruction lines with Dockerfile line continuations.
fn continuation(lines: &[String]) -> String {
    lines.join(" \\\n")
}

fn shell_escape(s: &str) -> String {
    ::shell_escape::escape(Cow::from(s)).into_owned()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    /// The apt instruction of a rendered recipe.
    fn apt_lines(rendered: &str) -> String {
        rendered
            .split("\n\n")
            .find(|block| block.contains("apt-get install"))
            .unwrap()
            .to_string()
    }

    #[test]
    fn default_recipe_renders_verbatim() {
        let rendered = Recipe::default().render().unwrap();
        let expected = indoc! {r#"
            FROM ubuntu:22.04

            RUN apt-get update \
                && apt-get install --yes --no-install-recommends \
                    build-essential \
                    ca-certificates \
                    curl \
                    gfortran \
                    git \
                    wget \
                && rm -rf /var/lib/apt/lists/*

            RUN groupadd --gid 1000 rail \
                && useradd --create-home --uid 1000 --gid 1000 rail

            USER rail
            WORKDIR /home/rail

            COPY --chown=rail:rail railup ./railup
            COPY --chown=rail:rail lockfiles/ ./lockfiles/

            RUN ./railup -v install \
                    --install-manager mamba \
                    --env-name rail \
                    --packages all \
                    --devtools \
                    --local-lockfiles \
                    --clean \
                && rm -rf railup lockfiles

            RUN echo '. "$HOME/miniforge3/bin/activate"' >> "$HOME/.bashrc" \
                && echo 'conda activate rail' >> "$HOME/.bashrc"

            CMD ["bash", "-l"]
        "#};
        assert_eq!(rendered, expected);
    }

    #[test]
    fn rendering_is_deterministic() {
        let recipe = Recipe {
            entry: EntryPoint::Notebook,
            ..Recipe::default()
        };
        assert_eq!(recipe.render().unwrap(), recipe.render().unwrap());
    }

    #[test]
    fn user_exists_before_anything_runs_as_it() {
        let rendered = Recipe::default().render().unwrap();
        let useradd = rendered.find("useradd").unwrap();
        let switch = rendered.find("USER rail").unwrap();
        let install = rendered.find("./railup").unwrap();
        assert!(useradd < switch);
        assert!(switch < install);
    }

    #[test]
    fn installer_and_lockfiles_are_removed_in_the_install_layer() {
        let rendered = Recipe::default().render().unwrap();
        let install_block = rendered
            .split("\n\n")
            .find(|block| block.contains("./railup"))
            .unwrap();
        assert!(install_block.contains("rm -rf railup lockfiles"));
    }

    #[test]
    fn only_the_notebook_variant_exposes_a_port() {
        let shell = Recipe::default().render().unwrap();
        let notebook = Recipe {
            entry: EntryPoint::Notebook,
            ..Recipe::default()
        }
        .render()
        .unwrap();

        assert!(!shell.contains("EXPOSE"));
        assert!(notebook.contains("EXPOSE 8888"));
        assert!(notebook.contains(
            r#"CMD ["/home/rail/miniforge3/bin/conda", "run", "--no-capture-output", "--name", "rail", "jupyter", "lab", "--ip=0.0.0.0", "--port=8888", "--no-browser"]"#
        ));
    }

    #[test]
    fn cmd_remains_valid_json_for_awkward_env_names() {
        let recipe = Recipe {
            env_name: "rail\n\"demo\"".to_string(),
            entry: EntryPoint::Notebook,
            ..Recipe::default()
        };
        let rendered = recipe.render().unwrap();

        let cmd = rendered
            .lines()
            .find_map(|line| line.strip_prefix("CMD "))
            .unwrap();
        let argv: Vec<String> = serde_json::from_str(cmd).unwrap();
        assert!(argv.contains(&"rail\n\"demo\"".to_string()));
    }

    #[test]
    fn both_entry_points_install_the_same_toolchain() {
        let shell = Recipe::default().render().unwrap();
        let notebook = Recipe {
            entry: EntryPoint::Notebook,
            ..Recipe::default()
        }
        .render()
        .unwrap();
        assert_eq!(apt_lines(&shell), apt_lines(&notebook));
    }

    #[test]
    fn fetch_mode_downloads_and_removes_the_installer() {
        let recipe = Recipe {
            installer: InstallerSource::Fetch {
                url: "https://example.org/railup".to_string(),
            },
            ..Recipe::default()
        };
        let rendered = recipe.render().unwrap();

        assert!(!rendered.contains("COPY --chown=rail:rail railup"));
        assert!(rendered.contains("RUN curl -fsSL 'https://example.org/railup' -o railup \\"));
        assert!(rendered.contains("&& chmod +x railup"));
        assert!(rendered.contains("&& rm -rf railup lockfiles"));
    }

    #[test]
    fn remote_lockfiles_render_no_copy_and_no_flag() {
        let recipe = Recipe {
            local_lockfiles: false,
            ..Recipe::default()
        };
        let rendered = recipe.render().unwrap();

        assert!(!rendered.contains("COPY --chown=rail:rail lockfiles/"));
        assert!(!rendered.contains("--local-lockfiles"));
        assert!(rendered.contains("&& rm -rf railup\n"));
    }

    #[test]
    fn uninstallable_flavors_are_rejected() {
        let recipe = Recipe {
            flavor: ManagerFlavor::Micromamba,
            ..Recipe::default()
        };
        assert_eq!(
            recipe.render(),
            Err(RecipeError::FlavorNotInstallable(ManagerFlavor::Micromamba))
        );

        let recipe = Recipe {
            flavor: ManagerFlavor::Anaconda,
            ..Recipe::default()
        };
        assert!(recipe.render().is_err());
    }
}
