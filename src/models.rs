use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::agent::tools::ToolDescriptor;
use crate::settings::{EffectiveSettings, ModelParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// A model reply: either a final answer or a batch of tool calls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AiMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    #[cfg(test)]
    pub fn calling(tool_calls: Vec<ToolCall>) -> Self {
        Self { content: String::new(), tool_calls }
    }

    pub fn is_final(&self) -> bool { self.tool_calls.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    System { content: String },
    Human { content: String },
    Ai(AiMessage),
    ToolResult { tool_call_id: String, content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self::System { content: content.into() } }
    pub fn human(content: impl Into<String>) -> Self { Self::Human { content: content.into() } }
    pub fn ai(content: impl Into<String>) -> Self { Self::Ai(AiMessage::text(content)) }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unparsable response: {0}")]
    Parse(String),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolDescriptor]) -> Result<AiMessage, ModelError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint, including
/// Gemini's compatibility layer.
#[derive(Clone)]
pub struct OpenAICompatible {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub params: ModelParams,
    http: reqwest::Client,
}

impl OpenAICompatible {
    pub fn from_settings(settings: &EffectiveSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            params: settings.model_params.clone(),
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")] tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")] temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")] max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")] top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice { message: OaiMessage }

#[derive(Debug, Deserialize)]
struct OaiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OaiToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OaiFunction,
}

#[derive(Debug, Deserialize)]
struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

fn to_wire(msg: &ChatMessage) -> Value {
    match msg {
        ChatMessage::System { content } => json!({"role": "system", "content": content}),
        ChatMessage::Human { content } => json!({"role": "user", "content": content}),
        ChatMessage::Ai(ai) if ai.tool_calls.is_empty() => json!({"role": "assistant", "content": ai.content}),
        ChatMessage::Ai(ai) => {
            let calls: Vec<Value> = ai
                .tool_calls
                .iter()
                .map(|c| json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": Value::Object(c.arguments.clone()).to_string()},
                }))
                .collect();
            let content = if ai.content.is_empty() { Value::Null } else { Value::String(ai.content.clone()) };
            json!({"role": "assistant", "content": content, "tool_calls": calls})
        }
        ChatMessage::ToolResult { tool_call_id, content } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
    }
}

fn tool_to_wire(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {"name": tool.name, "description": tool.description, "parameters": tool.input_schema},
    })
}

fn parse_reply(resp: OaiChatResponse) -> Result<AiMessage, ModelError> {
    let message = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ModelError::Parse("no choices in response".into()))?;
    let mut tool_calls = Vec::new();
    for call in message.tool_calls.unwrap_or_default() {
        let raw = call.function.arguments.unwrap_or_default();
        let arguments = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => return Err(ModelError::Parse(format!("arguments for {} are not an object: {other}", call.function.name))),
                Err(e) => return Err(ModelError::Parse(format!("arguments for {}: {e}", call.function.name))),
            }
        };
        let id = call.id.filter(|id| !id.is_empty()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tool_calls.push(ToolCall { id, name: call.function.name, arguments });
    }
    Ok(AiMessage { content: message.content.unwrap_or_default(), tool_calls })
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolDescriptor]) -> Result<AiMessage, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = OaiChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools: tools.iter().map(tool_to_wire).collect(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            top_p: self.params.top_p,
        };
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion request");
        let mut rb = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await.map_err(|e| ModelError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status: status.as_u16(), body: text });
        }
        let v: OaiChatResponse = resp.json().await.map_err(|e| ModelError::Parse(e.to_string()))?;
        parse_reply(v)
    }
}
