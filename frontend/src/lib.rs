//! Bunny Frontend - Unikernel package compiler.
//!
//! This module turns Dockerfile-syntax packaging descriptors into BuildKit
//! LLB graphs, either printed for `buildctl` or solved through the engine's
//! gateway when running as a frontend image.

#![allow(clippy::result_large_err)]

pub mod base;
pub mod compile;
pub mod descriptor;
pub mod dockerfile;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod llb;
pub mod reference;
pub mod service;

// Re-export common types
pub use base::{resolve_base, BaseSelection};
pub use compile::{compile, image_config, metadata_payload, CompileOptions};
pub use descriptor::{extract, CopyEntry, PackageDescriptor};
pub use dockerfile::{Dockerfile, Instruction, Node};
pub use fetch::ContextFetcher;
pub use gateway::{FrontendOpts, GrpcBridge, LlbBridge};
pub use llb::{FileStep, Graph, Root};
pub use reference::ImageReference;
pub use service::{BuildOutput, Frontend};

/// Bunny Frontend version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
