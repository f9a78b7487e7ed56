use std::fmt::Display;
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

/// The umbrella package, installed unconditionally.
pub const CORE_PACKAGE: &str = "pz-rail";

/// The RAIL estimation algorithm family on PyPI.
pub const ALGORITHM_PACKAGES: &[&str] = &[
    "pz-rail-astro-tools",
    "pz-rail-bpz",
    "pz-rail-cmnn",
    "pz-rail-dnf",
    "pz-rail-dsps",
    "pz-rail-flexzboost",
    "pz-rail-fsps",
    "pz-rail-gpz-v1",
    "pz-rail-pzflow",
    "pz-rail-sklearn",
    "pz-rail-som",
    "pz-rail-yaw",
    "pz-rail-lephare",
];

/// Optional tools for working in the environment, installed as one group.
pub const DEVTOOL_PACKAGES: &[&str] = &["jupyter", "seaborn", "corner", "matplotlib"];

/// Which algorithm packages to install on top of [CORE_PACKAGE].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSelection {
    All,
    None,
    Subset(Vec<String>),
}

impl PackageSelection {
    pub fn algorithm_packages(&self) -> Vec<String> {
        match self {
            PackageSelection::All => {
                ALGORITHM_PACKAGES.iter().map(ToString::to_string).collect()
            },
            PackageSelection::None => Vec::new(),
            PackageSelection::Subset(packages) => packages.clone(),
        }
    }
}

impl Display for PackageSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageSelection::All => write!(f, "all"),
            PackageSelection::None => write!(f, "none"),
            PackageSelection::Subset(packages) => write!(f, "{}", packages.iter().join(",")),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error(
    "invalid RAIL package selection `{selection}`, expected `all`, `none`, or a comma separated subset of:\n{}",
    ALGORITHM_PACKAGES.iter().map(|package| format!("  {package}")).join("\n")
)]
pub struct ParseSelectionError {
    selection: String,
}

impl FromStr for PackageSelection {
    type Err = ParseSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => return Ok(PackageSelection::All),
            "none" => return Ok(PackageSelection::None),
            _ => {},
        }

        let packages: Vec<String> = s
            .split(',')
            .map(|package| package.trim().to_string())
            .filter(|package| !package.is_empty())
            .collect();

        let valid = !packages.is_empty()
            && packages
                .iter()
                .all(|package| ALGORITHM_PACKAGES.contains(&package.as_str()));
        if !valid {
            return Err(ParseSelectionError {
                selection: s.to_string(),
            });
        }

        Ok(PackageSelection::Subset(packages))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_keywords() {
        assert_eq!("all".parse(), Ok(PackageSelection::All));
        assert_eq!("none".parse(), Ok(PackageSelection::None));
    }

    #[test]
    fn parses_subsets() {
        assert_eq!(
            "pz-rail-dnf,pz-rail-yaw".parse(),
            Ok(PackageSelection::Subset(vec![
                "pz-rail-dnf".to_string(),
                "pz-rail-yaw".to_string()
            ]))
        );
    }

    #[test]
    fn rejects_unknown_packages() {
        let err = "pz-rail-dnf,numpy".parse::<PackageSelection>().unwrap_err();
        assert!(err.to_string().contains("numpy"));
        assert!(err.to_string().contains("pz-rail-som"));
    }

    #[test]
    fn rejects_empty_selections() {
        assert!("".parse::<PackageSelection>().is_err());
        assert!(",".parse::<PackageSelection>().is_err());
    }

    #[test]
    fn all_resolves_to_every_algorithm() {
        assert_eq!(
            PackageSelection::All.algorithm_packages().len(),
            ALGORITHM_PACKAGES.len()
        );
        assert_eq!(PackageSelection::None.algorithm_packages(), Vec::<String>::new());
    }
}
