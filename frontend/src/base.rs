//! Base image selection.
//!
//! Classifies the descriptor's `FROM` reference into one of three roots.
//! Images from the unikernel catalog are published under a platform that
//! never matches the host, so they always carry a fixed override.

use bunny_core::Platform;

/// Reference that selects an empty root filesystem.
pub const SCRATCH: &str = "scratch";

/// Registry prefix of the unikernel image catalog.
pub const CATALOG_REGISTRY: &str = "unikraft.org/";

/// How the graph's root state is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseSelection {
    /// Empty root, no content and no metadata fetch
    EmptyRoot,
    /// Catalog image pulled for the catalog's own platform
    CatalogImage { reference: String },
    /// Any other image, pulled for the default platform
    GenericImage { reference: String },
}

impl BaseSelection {
    /// Platform forced onto the pull, if this selection has one.
    pub fn platform_override(&self) -> Option<Platform> {
        match self {
            Self::CatalogImage { .. } => Some(Platform::new("qemu", "amd64")),
            Self::EmptyRoot | Self::GenericImage { .. } => None,
        }
    }

    /// Image reference to pull, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::EmptyRoot => None,
            Self::CatalogImage { reference } | Self::GenericImage { reference } => Some(reference),
        }
    }
}

/// Classify a base reference. Callers must not pass an empty reference.
pub fn resolve_base(reference: &str) -> BaseSelection {
    if reference == SCRATCH {
        BaseSelection::EmptyRoot
    } else if reference.starts_with(CATALOG_REGISTRY) {
        BaseSelection::CatalogImage {
            reference: reference.to_string(),
        }
    } else {
        BaseSelection::GenericImage {
            reference: reference.to_string(),
        }
    }
}
