use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::tools::{ToolDescriptor, ToolOutcome};
use crate::error::ScoutError;
use crate::provider::{ProviderInfo, ToolProvider};

/// Session-side view of a connected provider: the tools it announced at
/// connect time and a name-checked way to call them.
pub struct ToolRegistry {
    provider: Box<dyn ToolProvider>,
    info: ProviderInfo,
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub async fn connect(provider: Box<dyn ToolProvider>) -> Result<Self, ScoutError> {
        let info = provider.initialize().await.map_err(|e| ScoutError::transport("initialize", e))?;
        let descriptors = provider.list_tools().await.map_err(|e| ScoutError::transport("list_tools", e))?;
        let mut names = HashSet::new();
        for d in &descriptors {
            if !names.insert(d.name.as_str()) {
                return Err(ScoutError::ProtocolViolation(format!("provider announced tool {} twice", d.name)));
            }
        }
        info!(provider = %info.name, version = %info.version, tools = ?names, "connected to tool provider");
        Ok(Self { provider, info, descriptors })
    }

    pub fn describe(&self) -> &[ToolDescriptor] { &self.descriptors }

    pub fn provider_info(&self) -> &ProviderInfo { &self.info }

    /// Unknown names are a contract violation; a source that fails or does
    /// not answer in time comes back as [`ToolOutcome::Unavailable`].
    pub async fn invoke(&self, name: &str, arguments: &Map<String, Value>, timeout: Duration) -> Result<ToolOutcome, ScoutError> {
        if !self.descriptors.iter().any(|d| d.name == name) {
            return Err(ScoutError::ProtocolViolation(format!("model requested unknown tool {name}")));
        }
        match tokio::time::timeout(timeout, self.provider.call_tool(name, arguments)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(ScoutError::transport("call_tool", e)),
            Err(_) => {
                warn!(tool = name, ?timeout, "tool call timed out");
                Ok(ToolOutcome::unavailable(format!("{name} did not answer within {}s", timeout.as_secs_f32())))
            }
        }
    }

    pub async fn close(self) -> Result<(), ScoutError> {
        self.provider.shutdown().await.map_err(|e| ScoutError::transport("shutdown", e))
    }
}
