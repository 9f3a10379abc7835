//! Graph compilation.
//!
//! Turns a [`PackageDescriptor`] into an [`llb::Graph`]: the base root, one
//! copy per descriptor entry and a final write of the metadata file that
//! urunc reads at container start.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bunny_core::error::{BunnyError, Result};
use bunny_core::{FrontendConfig, Platform};

use crate::base::{resolve_base, BaseSelection};
use crate::descriptor::PackageDescriptor;
use crate::llb::{Graph, Root};
use crate::reference::ImageReference;

/// Annotation naming the unikernel binary; becomes the image entrypoint.
pub const UNIKERNEL_BINARY_ANNOTATION: &str = "com.urunc.unikernel.binary";

/// Inputs of a compilation that do not come from the descriptor.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub context_name: String,
    pub target_platform: Platform,
    pub metadata_path: String,
    pub metadata_mode: u32,
    pub session_id: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::from(&FrontendConfig::default())
    }
}

impl From<&FrontendConfig> for CompileOptions {
    fn from(config: &FrontendConfig) -> Self {
        Self {
            context_name: config.context_name.clone(),
            target_platform: config.target_platform.clone(),
            metadata_path: config.metadata_path.clone(),
            metadata_mode: config.metadata_mode,
            session_id: None,
        }
    }
}

impl CompileOptions {
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Compile a descriptor into a build graph. Performs no I/O.
pub fn compile(descriptor: &PackageDescriptor, options: &CompileOptions) -> Result<Graph> {
    let payload = metadata_payload(&descriptor.annotations)?;

    if descriptor.base.is_empty() {
        return Err(BunnyError::MissingBase);
    }

    let selection = resolve_base(&descriptor.base);
    let root = match selection {
        BaseSelection::EmptyRoot => Root::Scratch,
        ref image => {
            let reference = image.reference().unwrap_or(&descriptor.base);
            Root::Image {
                reference: ImageReference::normalize(reference)?,
                platform: image.platform_override(),
            }
        }
    };
    tracing::debug!(base = %descriptor.base, root = ?root, "Resolved base");

    let mut graph = Graph::new(root, options.target_platform.clone())
        .with_session(options.session_id.clone());

    for entry in &descriptor.copies {
        tracing::debug!(source = %entry.source, dest = %entry.dest, "Adding copy");
        graph.copy(&options.context_name, &entry.source, &entry.dest);
    }

    graph.mkfile(&options.metadata_path, options.metadata_mode, payload);

    Ok(graph)
}

/// JSON object of annotation keys to base64-encoded values.
pub fn metadata_payload(annotations: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let encoded: BTreeMap<&str, String> = annotations
        .iter()
        .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
        .collect();
    serde_json::to_vec(&encoded).map_err(|e| BunnyError::MetadataEncoding(e.to_string()))
}

/// OCI image config attached to the solved result.
///
/// Labels carry the raw annotation values, unlike the metadata file.
pub fn image_config(descriptor: &PackageDescriptor, config: &FrontendConfig) -> Result<Vec<u8>> {
    let mut image_config = serde_json::json!({
        "WorkingDir": config.working_dir,
        "Labels": descriptor.annotations,
    });
    if let Some(binary) = descriptor.annotations.get(UNIKERNEL_BINARY_ANNOTATION) {
        image_config["Entrypoint"] = serde_json::json!([binary]);
    }

    let mut image = serde_json::json!({
        "architecture": config.target_platform.architecture,
        "os": config.target_platform.os,
        "config": image_config,
        "rootfs": {
            "type": "layers",
            "diff_ids": []
        }
    });
    if let Some(ref variant) = config.target_platform.variant {
        image["variant"] = serde_json::json!(variant);
    }

    Ok(serde_json::to_vec(&image)?)
}
