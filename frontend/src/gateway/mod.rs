//! BuildKit gateway integration.
//!
//! The engine runs a gateway frontend as a child process and talks to it
//! over gRPC. [`LlbBridge`] is the seam the handler uses, so the service
//! logic can run against an in-memory fake.

mod client;
pub mod pb;

pub use client::{GrpcBridge, StdioStream};

use std::collections::BTreeMap;

use async_trait::async_trait;
use bunny_core::error::Result;

use crate::llb::pb::Definition;
use self::pb::ReturnRequest;

/// Environment prefix of frontend options passed by the engine.
pub const FRONTEND_OPT_PREFIX: &str = "BUILDKIT_FRONTEND_OPT_";

/// Environment variable carrying the client session id.
pub const SESSION_ID_ENV: &str = "BUILDKIT_SESSION_ID";

/// Engine operations the frontend needs.
#[async_trait]
pub trait LlbBridge: Send + Sync {
    /// Solve a definition and return the reference of its result.
    async fn solve(&self, definition: Definition) -> Result<String>;

    /// Read a file out of a solved reference.
    async fn read_file(&self, reference: &str, path: &str) -> Result<Vec<u8>>;

    /// Report the final result or error to the engine.
    async fn return_result(&self, request: ReturnRequest) -> Result<()>;
}

/// Build options handed to the frontend by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontendOpts {
    pub options: BTreeMap<String, String>,
    pub session_id: Option<String>,
}

impl FrontendOpts {
    /// Collect options from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Collect options from `(name, value)` pairs.
    ///
    /// `BUILDKIT_FRONTEND_OPT_<n>=key=value` becomes `key → value`; an entry
    /// without `=` becomes a key with an empty value.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut opts = Self::default();
        for (name, value) in vars {
            if name == SESSION_ID_ENV {
                if !value.is_empty() {
                    opts.session_id = Some(value);
                }
            } else if name.starts_with(FRONTEND_OPT_PREFIX) {
                let (key, val) = value.split_once('=').unwrap_or((value.as_str(), ""));
                opts.options.insert(key.to_string(), val.to_string());
            }
        }
        opts
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
