use super::conda::{CondaError, CondaProvider};

/// pip driven through `{manager} run` inside a named environment.
///
/// The RAIL packages come from PyPI rather than conda channels, so after the
/// environment is created pip does the rest.
#[derive(Debug, Clone, Copy)]
pub struct Pip<'a> {
    conda: &'a CondaProvider,
    env_name: &'a str,
}

fn install_argv<'p>(verbose: bool, packages: &[&'p str]) -> Vec<&'p str> {
    let mut argv = vec!["pip", "install"];
    argv.extend_from_slice(packages);
    if !verbose {
        argv.push("--quiet");
    }
    argv
}

impl<'a> Pip<'a> {
    pub fn new(conda: &'a CondaProvider, env_name: &'a str) -> Self {
        Pip { conda, env_name }
    }

    /// Environments created from a lockfile do not necessarily ship pip.
    pub fn ensurepip(&self) -> Result<(), CondaError> {
        self.conda
            .run_in_env(self.env_name, &["python", "-m", "ensurepip", "--upgrade"])
    }

    /// One `pip install` invocation covering all of `packages`.
    pub fn install(&self, packages: &[&str]) -> Result<(), CondaError> {
        let argv = install_argv(self.conda.runner().verbose, packages);
        self.conda.run_in_env(self.env_name, &argv)
    }

    pub fn cache_purge(&self) -> Result<(), CondaError> {
        self.conda.run_in_env(self.env_name, &["pip", "cache", "purge"])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn installs_are_quiet_unless_verbose() {
        assert_eq!(install_argv(false, &["pz-rail"]), vec![
            "pip", "install", "pz-rail", "--quiet"
        ]);
        assert_eq!(install_argv(true, &["jupyter", "seaborn"]), vec![
            "pip", "install", "jupyter", "seaborn"
        ]);
    }
}
