use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::engine::{run_turn, AgentContext};
use crate::agent::memory::ConversationMemory;
use crate::agent::registry::ToolRegistry;
use crate::agent::tools::{ToolDescriptor, ToolOutcome};
use crate::error::ScoutError;
use crate::models::{ChatMessage, LanguageModel};
use crate::provider::{Launcher, ProviderInfo};
use crate::settings::LoopLimits;
use crate::sources::Query;

const TOOL_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub id: Uuid,
    pub tool: String,
    pub summary: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ToolEvent {
    pub fn record(tool: &str, outcome: &ToolOutcome) -> Self {
        let (status, error) = match outcome {
            ToolOutcome::Ok { .. } => ("ok", None),
            ToolOutcome::Unavailable { reason } => ("error", Some(reason.clone())),
        };
        Self {
            id: Uuid::new_v4(),
            tool: tool.to_string(),
            summary: outcome.summary(),
            status: status.to_string(),
            error,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }
}

/// Holds the session in `Connecting` and puts it back to `Disconnected` on
/// drop unless committed, so a connect future dropped mid-flight cannot wedge it.
struct ConnectAttempt<'a> {
    state: &'a mut SessionState,
    committed: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(state: &'a mut SessionState) -> Self {
        *state = SessionState::Connecting;
        Self { state, committed: false }
    }

    fn commit(mut self) {
        *self.state = SessionState::Ready;
        self.committed = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *self.state = SessionState::Disconnected;
        }
    }
}

/// One conversation with the price assistant. Owns the tool provider
/// connection and the bounded memory of earlier turns.
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    state: SessionState,
    launcher: Arc<dyn Launcher>,
    model: Arc<dyn LanguageModel>,
    limits: LoopLimits,
    registry: Option<ToolRegistry>,
    memory: ConversationMemory,
    tool_history: VecDeque<ToolEvent>,
}

impl Session {
    pub fn new(launcher: Arc<dyn Launcher>, model: Arc<dyn LanguageModel>, limits: LoopLimits) -> Self {
        let memory = ConversationMemory::with_limit(limits.history_limit);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: SessionState::Disconnected,
            launcher,
            model,
            limits,
            registry: None,
            memory,
            tool_history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState { self.state }

    /// Launch the provider and learn its tools. A no-op once ready; a failed
    /// or abandoned attempt leaves the session disconnected so it can be retried.
    pub async fn connect(&mut self) -> Result<(), ScoutError> {
        match self.state {
            SessionState::Ready => return Ok(()),
            SessionState::Closed | SessionState::Connecting => {
                return Err(ScoutError::SessionState { state: self.state.name() });
            }
            SessionState::Disconnected => {}
        }
        let attempt = ConnectAttempt::begin(&mut self.state);
        let connected = match self.launcher.launch().await {
            Ok(provider) => ToolRegistry::connect(provider).await,
            Err(e) => Err(ScoutError::transport("launch", e)),
        };
        match connected {
            Ok(registry) => {
                info!(
                    session = %self.id,
                    provider = %registry.provider_info().name,
                    tools = registry.describe().len(),
                    "session ready"
                );
                self.registry = Some(registry);
                attempt.commit();
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Answer one query. Memory only changes when the turn succeeds.
    pub async fn run(&mut self, query: &Query) -> Result<String, ScoutError> {
        let registry = match (&self.state, &self.registry) {
            (SessionState::Ready, Some(registry)) => registry,
            _ => return Err(ScoutError::SessionState { state: self.state.name() }),
        };
        let ctx = AgentContext { model: self.model.as_ref(), tools: registry, limits: &self.limits };
        let outcome = run_turn(ctx, self.memory.snapshot(), query).await?;
        self.memory.append_turn(query.as_str(), outcome.answer.as_str());
        info!(session = %self.id, rounds = outcome.rounds, remembered = self.memory.len(), "turn recorded");
        for event in outcome.tool_events {
            if self.tool_history.len() == TOOL_HISTORY_LIMIT {
                self.tool_history.pop_front();
            }
            self.tool_history.push_back(event);
        }
        Ok(outcome.answer)
    }

    /// Validate the query, connect on first use, then run the turn.
    pub async fn ask(&mut self, raw: &str) -> Result<String, ScoutError> {
        let query = Query::parse(raw)?;
        if self.state == SessionState::Disconnected {
            self.connect().await?;
        }
        self.run(&query).await
    }

    pub async fn close(&mut self) -> Result<(), ScoutError> {
        self.state = SessionState::Closed;
        match self.registry.take() {
            Some(registry) => {
                info!(session = %self.id, "closing session");
                registry.close().await
            }
            None => Ok(()),
        }
    }

    pub fn history(&self) -> Vec<ChatMessage> { self.memory.snapshot() }

    pub fn tool_history(&self) -> Vec<ToolEvent> { self.tool_history.iter().cloned().collect() }

    pub fn provider(&self) -> Option<&ProviderInfo> { self.registry.as_ref().map(|r| r.provider_info()) }

    pub fn tools(&self) -> &[ToolDescriptor] {
        self.registry.as_ref().map(|r| r.describe()).unwrap_or(&[])
    }
}
