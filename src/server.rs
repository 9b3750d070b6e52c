use axum::http::StatusCode;
use axum::{routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::tools::ToolDescriptor;
use crate::error::ScoutError;
use crate::models::ChatMessage;
use crate::provider::ProviderInfo;
use crate::session::{Session, SessionState, ToolEvent};

/// Requests are answered one at a time against a single session.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(session: Session) -> Self { Self { session: Arc::new(Mutex::new(session)) } }
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: ScoutError) -> ApiError {
    let status = match &e {
        ScoutError::EmptyQuery => StatusCode::BAD_REQUEST,
        ScoutError::ModelInvocation { .. } => StatusCode::BAD_GATEWAY,
        ScoutError::SessionState { .. } => StatusCode::CONFLICT,
        ScoutError::ProtocolViolation(_) | ScoutError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%status, error = %e, "query failed");
    (status, Json(ErrorResponse { error: e.to_string() }))
}

async fn query(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let answer = session.ask(&body.query).await.map_err(api_error)?;
    Ok(Json(QueryResponse { answer }))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub tool_events: Vec<ToolEvent>,
}

async fn history(axum::extract::State(state): axum::extract::State<AppState>) -> Json<HistoryResponse> {
    let session = state.session.lock().await;
    Json(HistoryResponse { session_id: session.id, created_at: session.created_at, messages: session.history(), tool_events: session.tool_history() })
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub provider: Option<ProviderInfo>,
    pub tools: Vec<ToolDescriptor>,
}

async fn tools(axum::extract::State(state): axum::extract::State<AppState>) -> Result<Json<ToolsResponse>, ApiError> {
    let mut session = state.session.lock().await;
    if session.state() == SessionState::Disconnected {
        session.connect().await.map_err(api_error)?;
    }
    Ok(Json(ToolsResponse { provider: session.provider().cloned(), tools: session.tools().to_vec() }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/query", post(query))
        .route("/v1/history", get(history))
        .route("/v1/tools", get(tools))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    state.session.lock().await.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{call, local_launcher, ScriptedModel};
    use crate::models::AiMessage;
    use crate::settings::LoopLimits;
    use crate::sources::testing::{listing, StaticSource};
    use axum::extract::State;

    fn state(replies: Vec<AiMessage>) -> AppState {
        let source = Arc::new(StaticSource::new("get_ishopping_products", vec![listing("Redmi Note 13", 52999.0)]));
        AppState::new(Session::new(local_launcher(vec![source]), Arc::new(ScriptedModel::new(replies)), LoopLimits::default()))
    }

    #[tokio::test]
    async fn query_returns_the_answer_and_updates_history() {
        let state = state(vec![
            AiMessage::calling(vec![call("t1", "get_ishopping_products", "redmi note 13")]),
            AiMessage::text("Redmi Note 13 for Rs. 52,999 at iShopping"),
        ]);
        let Json(resp) = query(State(state.clone()), Json(QueryBody { query: "redmi note 13".into() })).await.unwrap();
        assert_eq!(resp.answer, "Redmi Note 13 for Rs. 52,999 at iShopping");

        let Json(h) = history(State(state)).await;
        assert_eq!(h.messages.len(), 2);
        assert_eq!(h.tool_events.len(), 1);
        assert!(h.created_at <= Utc::now());
    }

    #[tokio::test]
    async fn blank_query_is_a_bad_request() {
        let state = state(vec![]);
        let (status, Json(body)) = query(State(state), Json(QueryBody { query: " ".into() })).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("empty"));
    }

    #[tokio::test]
    async fn model_failure_is_a_bad_gateway() {
        let state = state(vec![]);
        let (status, _) = query(State(state), Json(QueryBody { query: "anything".into() })).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn tools_are_listed_after_lazy_connect() {
        let Json(resp) = tools(State(state(vec![]))).await.unwrap();
        let names: Vec<_> = resp.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_ishopping_products"]);
        assert_eq!(resp.provider.unwrap().name, crate::provider::PROVIDER_NAME);
    }
}
