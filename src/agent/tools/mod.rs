use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::sources::{Listing, ProductSource};

pub mod product_search;

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn product_search(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Product to search for, e.g. \"iPhone 13\""}
                },
                "required": ["query"]
            }),
        }
    }
}

/// Result of one tool call as the model will see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { listings: Vec<Listing> },
    Unavailable { reason: String },
}

impl ToolOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self { Self::Unavailable { reason: reason.into() } }

    /// JSON text placed in the tool-result message.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({"status": "unavailable", "reason": format!("could not encode result: {e}")}).to_string()
        })
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Ok { listings } => format!("{} listings", listings.len()),
            Self::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }

    pub fn is_ok(&self) -> bool { matches!(self, Self::Ok { .. }) }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tool {0}")]
pub struct UnknownTool(pub String);

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn descriptor(&self) -> ToolDescriptor;
    /// Never fails outright: problems are reported as [`ToolOutcome::Unavailable`].
    async fn run(&self, args: &Map<String, Value>) -> ToolOutcome;
}

/// The provider-side set of callable tools.
#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self { Self { tools: Vec::new() } }

    pub fn with_sources(sources: Vec<std::sync::Arc<dyn ProductSource>>) -> Self {
        let mut c = Self::new();
        for source in sources {
            c.register(Box::new(product_search::ProductSearchTool::new(source)));
        }
        c
    }

    /// Later registrations with a taken name are ignored.
    pub fn register(&mut self, t: Box<dyn Tool>) {
        if self.get(t.name()).is_none() {
            self.tools.push(t);
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<ToolOutcome, UnknownTool> {
        let tool = self.get(name).ok_or_else(|| UnknownTool(name.to_string()))?;
        let outcome = tool.run(args).await;
        metrics::counter!("price_scout_tool_calls_total", "tool" => tool.name(), "outcome" => if outcome.is_ok() { "ok" } else { "unavailable" }).increment(1);
        Ok(outcome)
    }
}
