use std::fmt;

use serde::{Deserialize, Serialize};

/// The registry namespace a package was resolved through.
///
/// Each registry installs its modules into its own container folder so
/// that ancestor-walking resolution only ever sees packages from the
/// matching ecosystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryName {
    #[default]
    Npm,
    Bower,
}

impl RegistryName {
    /// Name of the folder modules from this registry are placed in.
    pub fn folder(self) -> &'static str {
        match self {
            RegistryName::Npm => "node_modules",
            RegistryName::Bower => "bower_components",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistryName::Npm => "npm",
            RegistryName::Bower => "bower",
        }
    }
}

impl fmt::Display for RegistryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistryName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(RegistryName::Npm),
            "bower" => Ok(RegistryName::Bower),
            other => Err(format!("unknown registry '{other}'")),
        }
    }
}
