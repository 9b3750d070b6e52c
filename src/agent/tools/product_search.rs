use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Tool, ToolDescriptor, ToolOutcome};
use crate::sources::{ProductSource, Query};

/// Exposes one product source as a `{query}` tool.
pub struct ProductSearchTool {
    source: Arc<dyn ProductSource>,
}

impl ProductSearchTool {
    pub fn new(source: Arc<dyn ProductSource>) -> Self { Self { source } }
}

#[async_trait]
impl Tool for ProductSearchTool {
    fn name(&self) -> &'static str { self.source.name() }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::product_search(self.source.name(), self.source.description())
    }

    async fn run(&self, args: &Map<String, Value>) -> ToolOutcome {
        let Some(raw) = args.get("query").and_then(|v| v.as_str()) else {
            return ToolOutcome::unavailable("missing required string argument 'query'");
        };
        let query = match Query::parse(raw) {
            Ok(q) => q,
            Err(e) => return ToolOutcome::unavailable(e.to_string()),
        };
        match self.source.extract(&query).await {
            Ok(listings) => ToolOutcome::Ok { listings },
            Err(e) => ToolOutcome::unavailable(format!("{} is unavailable: {e}", self.source.name())),
        }
    }
}
