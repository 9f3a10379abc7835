//! Image reference normalization.
//!
//! Expands short references like `nginx` into the fully-qualified form the
//! engine's `docker-image://` source expects.

use bunny_core::error::{BunnyError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "unikraft.org", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "nubificus/hello")
    pub repository: String,
    /// Tag (e.g., "latest", "1.15")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `unikraft.org/nginx:1.15` → unikraft.org/nginx:1.15
    /// - `registry:5000/img` → registry:5000/img:latest
    /// - `img@sha256:abc` → docker.io/library/img@sha256:abc
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BunnyError::Compile("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(BunnyError::Compile(format!(
                        "Invalid digest format in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag colon can only appear after the last slash; a colon before
        // it belongs to a registry port.
        let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(colon) => {
                let colon = last_segment_start + colon;
                (&name_tag[..colon], Some(name_tag[colon + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        if tag.as_deref() == Some("") {
            return Err(BunnyError::Compile(format!(
                "Empty tag in reference '{}'",
                reference
            )));
        }

        let (registry, repository) = Self::split_registry_repository(name)?;

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Parse and return the fully-qualified form in one step.
    pub fn normalize(reference: &str) -> Result<String> {
        Ok(Self::parse(reference)?.to_string())
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        // First component is a registry if it looks like a hostname
        if let Some((first, repo)) = name.split_once('/') {
            if first.contains('.') || first.contains(':') || first == "localhost" {
                if repo.is_empty() {
                    return Err(BunnyError::Compile(format!(
                        "Empty repository in reference '{}'",
                        name
                    )));
                }
                return Ok((first.to_string(), repo.to_string()));
            }
        }

        if name.is_empty() {
            return Err(BunnyError::Compile("Empty repository name".to_string()));
        }

        let repository = if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{}", name)
        };

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
