//! Where tools live. The session only sees a [`ToolProvider`]; whether the
//! scrapers run in this process or in an MCP child over stdio is decided by
//! the [`Launcher`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::agent::tools::{ToolCatalog, ToolDescriptor, ToolOutcome};

pub mod mcp;

pub const PROVIDER_NAME: &str = "price-scout-tools";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
}

impl ProviderInfo {
    pub fn current() -> Self {
        Self { name: PROVIDER_NAME.to_string(), version: env!("CARGO_PKG_VERSION").to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider reported: {0}")]
    Remote(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("channel closed")]
    Closed,
    #[error(transparent)]
    Service(#[from] rmcp::ServiceError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad message: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn initialize(&self) -> Result<ProviderInfo, ProviderError>;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError>;
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolOutcome, ProviderError>;
    /// Release the channel. Calling it twice is harmless.
    async fn shutdown(&self) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ToolProvider>, ProviderError>;
}

/// Tools served from this process.
pub struct LocalProvider {
    catalog: Arc<ToolCatalog>,
}

impl LocalProvider {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self { Self { catalog } }
}

#[async_trait]
impl ToolProvider for LocalProvider {
    async fn initialize(&self) -> Result<ProviderInfo, ProviderError> { Ok(ProviderInfo::current()) }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> { Ok(self.catalog.descriptors()) }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolOutcome, ProviderError> {
        self.catalog.invoke(name, arguments).await.map_err(|e| ProviderError::Remote(e.to_string()))
    }

    async fn shutdown(&self) -> Result<(), ProviderError> { Ok(()) }
}

pub struct LocalLauncher {
    catalog: Arc<ToolCatalog>,
}

impl LocalLauncher {
    pub fn new(catalog: ToolCatalog) -> Self { Self { catalog: Arc::new(catalog) } }
}

#[async_trait]
impl Launcher for LocalLauncher {
    async fn launch(&self) -> Result<Box<dyn ToolProvider>, ProviderError> {
        Ok(Box::new(LocalProvider::new(self.catalog.clone())))
    }
}
