//! Target platform selection.
//!
//! A platform is written `os/architecture[/variant]`, e.g. `linux/amd64`.

use serde::{Deserialize, Serialize};

use crate::error::BunnyError;

/// Operating system and architecture pair for graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// The default execution platform.
    pub fn linux_amd64() -> Self {
        Self::new("linux", "amd64")
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::linux_amd64()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(ref variant) = self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Platform {
    type Err = BunnyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(BunnyError::Config(format!(
                "invalid platform '{}' (expected os/arch[/variant])",
                s
            )));
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self::new(*os, *arch)),
            [os, arch, variant] => Ok(Self {
                variant: Some(variant.to_string()),
                ..Self::new(*os, *arch)
            }),
            _ => Err(BunnyError::Config(format!(
                "invalid platform '{}' (expected os/arch[/variant])",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = BunnyError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}
