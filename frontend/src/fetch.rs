//! Fetching a single file out of the caller's build context.

use bunny_core::error::{BunnyError, FetchPhase, Result};
use bunny_core::Platform;

use crate::gateway::LlbBridge;
use crate::llb::{Graph, Root};

/// Two-step reader of build-context files through the engine.
pub struct ContextFetcher<'a> {
    bridge: &'a dyn LlbBridge,
    context_name: &'a str,
    platform: Platform,
    session_id: Option<String>,
}

impl<'a> ContextFetcher<'a> {
    pub fn new(bridge: &'a dyn LlbBridge, context_name: &'a str, platform: Platform) -> Self {
        Self {
            bridge,
            context_name,
            platform,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Solve a sub-graph holding only `name` from the context.
    pub async fn resolve_context_file(&self, name: &str) -> Result<String> {
        let graph = Graph::new(
            Root::Local {
                name: self.context_name.to_string(),
                follow_paths: vec![name.to_string()],
            },
            self.platform.clone(),
        )
        .with_session(self.session_id.clone());

        let definition = graph
            .marshal()
            .map_err(|e| BunnyError::fetch(FetchPhase::Resolve, name, e))?;

        self.bridge
            .solve(definition)
            .await
            .map_err(|e| BunnyError::fetch(FetchPhase::Resolve, name, e))
    }

    /// Read `name` back from a resolved reference.
    pub async fn read_file(&self, reference: &str, name: &str) -> Result<Vec<u8>> {
        self.bridge
            .read_file(reference, name)
            .await
            .map_err(|e| BunnyError::fetch(FetchPhase::Read, name, e))
    }

    /// Resolve then read.
    pub async fn fetch_context_file(&self, name: &str) -> Result<Vec<u8>> {
        let reference = self.resolve_context_file(name).await?;
        tracing::debug!(file = name, reference = %reference, "Resolved context file");
        let data = self.read_file(&reference, name).await?;
        tracing::debug!(file = name, bytes = data.len(), "Read context file");
        Ok(data)
    }
}
