//! Package descriptor extraction.
//!
//! Folds the descriptor's instructions, in order, into a [`PackageDescriptor`]:
//! one base, an ordered list of copies and a map of annotations.

use std::collections::BTreeMap;

use bunny_core::error::{BunnyError, Result};

use crate::dockerfile::{Dockerfile, Instruction, Node};

/// A single `COPY` from the build context into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    pub source: String,
    pub dest: String,
}

/// Normalized description of a unikernel package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Base reference; empty until a FROM is seen
    pub base: String,
    /// Copies in declaration order
    pub copies: Vec<CopyEntry>,
    /// Annotation key to raw value
    pub annotations: BTreeMap<String, String>,
}

impl PackageDescriptor {
    /// Extract a descriptor from a parsed descriptor file.
    pub fn from_dockerfile(dockerfile: &Dockerfile) -> Result<Self> {
        extract(&dockerfile.nodes)
    }
}

/// Walk the nodes in order and build the descriptor.
///
/// The first malformed node, a `COPY` before any `FROM`, or a second `FROM`
/// aborts extraction.
pub fn extract(nodes: &[Node]) -> Result<PackageDescriptor> {
    let mut descriptor = PackageDescriptor::default();

    for node in nodes {
        match Instruction::from_node(node)? {
            Instruction::From { image, alias } => {
                if !descriptor.base.is_empty() {
                    return Err(BunnyError::MultiStageUnsupported { line: node.line });
                }
                if let Some(alias) = alias {
                    tracing::debug!(line = node.line, alias = %alias, "Ignoring stage name");
                }
                descriptor.base = image;
            }
            Instruction::Copy {
                mut sources,
                dest,
                flags,
            } => {
                if descriptor.base.is_empty() {
                    return Err(BunnyError::MissingBase);
                }
                if !flags.is_empty() {
                    tracing::warn!(line = node.line, flags = ?flags, "Ignoring COPY flags");
                }
                if sources.len() > 1 {
                    tracing::warn!(
                        line = node.line,
                        ignored = ?&sources[1..],
                        "COPY with multiple sources, only the first is used"
                    );
                }
                sources.truncate(1);
                let source = sources.pop().unwrap_or_default();
                descriptor.copies.push(CopyEntry { source, dest });
            }
            Instruction::Label { pairs } => {
                for (key, value) in pairs {
                    descriptor
                        .annotations
                        .insert(strip_quotes(&key).to_string(), strip_quotes(&value).to_string());
                }
            }
            Instruction::Unsupported { keyword } => {
                tracing::warn!(
                    line = node.line,
                    instruction = keyword.as_str(),
                    "Unsupported instruction, skipping"
                );
            }
        }
    }

    Ok(descriptor)
}

/// Remove one pair of surrounding double quotes, if present.
fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}
