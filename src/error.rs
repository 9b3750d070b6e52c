use thiserror::Error;

use crate::models::ModelError;

/// Errors that abort a turn. Source failures never show up here: they are
/// turned into tool results the model can read.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("model invocation failed at round {round}: {source}")]
    ModelInvocation {
        round: usize,
        #[source]
        source: ModelError,
    },
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("session is {state}; run() requires a ready session")]
    SessionState { state: &'static str },
    #[error("tool provider channel failed during {step}: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ScoutError {
    pub fn transport(step: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Transport { step, source: source.into() }
    }
}
