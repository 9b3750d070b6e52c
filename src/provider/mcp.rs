//! The tool catalog over the Model Context Protocol. `serve-tools` runs a
//! [`ToolServer`] on stdin/stdout; the session side spawns that mode as a
//! child and talks to it through [`McpProvider`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorData, Implementation, ListToolsResult, PaginatedRequestParam,
    ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleClient, RoleServer, RunningService};
use rmcp::transport::{IntoTransport, TokioChildProcess};
use rmcp::{ServerHandler, ServiceExt};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Launcher, ProviderError, ProviderInfo, ToolProvider, PROVIDER_NAME};
use crate::agent::tools::{ToolCatalog, ToolDescriptor, ToolOutcome};

/// MCP server face of a [`ToolCatalog`].
#[derive(Clone)]
pub struct ToolServer {
    catalog: Arc<ToolCatalog>,
}

impl ToolServer {
    pub fn new(catalog: ToolCatalog) -> Self { Self { catalog: Arc::new(catalog) } }
}

fn to_mcp_tool(d: ToolDescriptor) -> Tool {
    let schema = match d.input_schema {
        Value::Object(schema) => schema,
        _ => Map::new(),
    };
    Tool::new(d.name, d.description, schema)
}

fn from_mcp_tool(t: Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: t.name.to_string(),
        description: t.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema: Value::Object(t.input_schema.as_ref().clone()),
    }
}

impl ServerHandler for ToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: PROVIDER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some("Product search tools for Pakistani online stores. Each takes a {query} string.".to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self.catalog.descriptors().into_iter().map(to_mcp_tool).collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        info!(tool = %request.name, "call_tool");
        let outcome = self
            .catalog
            .invoke(&request.name, &arguments)
            .await
            .map_err(|e| ErrorData::invalid_params(e.to_string(), None))?;
        let value = serde_json::to_value(&outcome).map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::structured(value))
    }
}

/// Serve the catalog on this process's stdin/stdout until the client leaves.
pub async fn serve_stdio(catalog: ToolCatalog) -> anyhow::Result<()> {
    info!(tools = catalog.descriptors().len(), "serving tools over stdio");
    let service = ToolServer::new(catalog).serve((tokio::io::stdin(), tokio::io::stdout())).await?;
    let reason = service.waiting().await?;
    info!(?reason, "tool server stopped");
    Ok(())
}

/// Client end of an MCP connection. The handshake is done by the time one exists.
pub struct McpProvider {
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpProvider {
    pub async fn connect<T, E, A>(transport: T) -> Result<Self, ProviderError>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = ().serve(transport).await.map_err(|e| ProviderError::Handshake(e.to_string()))?;
        Ok(Self { service: Mutex::new(Some(service)) })
    }
}

#[async_trait]
impl ToolProvider for McpProvider {
    async fn initialize(&self) -> Result<ProviderInfo, ProviderError> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(ProviderError::Closed)?;
        let info = service.peer_info().ok_or_else(|| ProviderError::Handshake("server sent no info".into()))?;
        Ok(ProviderInfo { name: info.server_info.name.clone(), version: info.server_info.version.clone() })
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(ProviderError::Closed)?;
        let tools = service.list_all_tools().await?;
        Ok(tools.into_iter().map(from_mcp_tool).collect())
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolOutcome, ProviderError> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(ProviderError::Closed)?;
        let result = service
            .call_tool(CallToolRequestParam { name: name.to_string().into(), arguments: Some(arguments.clone()) })
            .await?;
        let content = result
            .structured_content
            .ok_or_else(|| ProviderError::Remote(format!("{name} returned no structured content")))?;
        Ok(serde_json::from_value(content)?)
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        let Some(service) = self.service.lock().await.take() else { return Ok(()) };
        match service.cancel().await {
            Ok(reason) => debug!(?reason, "mcp client stopped"),
            Err(e) => debug!(error = %e, "mcp client task ended abnormally"),
        }
        Ok(())
    }
}

/// Starts this binary's `serve-tools` mode as a child process.
pub struct StdioLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl StdioLauncher {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self { Self { program, args } }
}

#[async_trait]
impl Launcher for StdioLauncher {
    async fn launch(&self) -> Result<Box<dyn ToolProvider>, ProviderError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        let transport = TokioChildProcess::new(command)?;
        info!(program = %self.program.display(), "spawned tool provider");
        Ok(Box::new(McpProvider::connect(transport).await?))
    }
}
