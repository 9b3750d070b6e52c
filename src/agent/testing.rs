use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map};

use super::registry::ToolRegistry;
use super::tools::{ToolCatalog, ToolDescriptor};
use crate::models::{AiMessage, ChatMessage, LanguageModel, ModelError, ToolCall};
use crate::provider::{LocalLauncher, LocalProvider};
use crate::sources::testing::StaticSource;
use crate::sources::ProductSource;

/// Replays canned replies in order and remembers every prompt it was shown.
/// Once the script runs out each call fails with a network error.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AiMessage, ModelError>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<AiMessage>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<AiMessage, ModelError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) }
    }

    pub fn seen(&self) -> Vec<Vec<ChatMessage>> { self.seen.lock().unwrap().clone() }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], _tools: &[ToolDescriptor]) -> Result<AiMessage, ModelError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Err(ModelError::Network("script exhausted".into())))
    }
}

pub fn call(id: &str, tool: &str, query: &str) -> ToolCall {
    let mut arguments = Map::new();
    arguments.insert("query".into(), json!(query));
    ToolCall { id: id.into(), name: tool.into(), arguments }
}

fn catalog(sources: Vec<Arc<StaticSource>>) -> ToolCatalog {
    ToolCatalog::with_sources(sources.into_iter().map(|s| s as Arc<dyn ProductSource>).collect())
}

pub async fn local_registry(sources: Vec<Arc<StaticSource>>) -> ToolRegistry {
    let provider = LocalProvider::new(Arc::new(catalog(sources)));
    ToolRegistry::connect(Box::new(provider)).await.unwrap()
}

pub fn local_launcher(sources: Vec<Arc<StaticSource>>) -> Arc<LocalLauncher> {
    Arc::new(LocalLauncher::new(catalog(sources)))
}
