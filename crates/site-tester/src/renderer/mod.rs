//! Renderer abstraction for building documents from fetched markup.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide).

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of loading markup into a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    /// Document location after the load event.
    pub final_url: String,
    /// Time from navigation start to the load event, in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new, private browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) that renders one document.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Register a script that runs in every new document before the
    /// document's own scripts.
    async fn add_init_script(&mut self, source: &str) -> Result<()>;
    /// Serve `markup` as the document at `url`, executing its scripts and
    /// fetching its sub-resources. Resolves once the load event has fired.
    async fn load(&mut self, url: &str, markup: &str) -> Result<LoadResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full serialized DOM.
    async fn get_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when Chromium is unavailable.
///
/// API checks still work; every site check fails at the rendering stage.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
