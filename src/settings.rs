use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoopPolicies {
    pub max_tool_rounds: Option<usize>,
    pub model_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SourcePolicies {
    pub settle_delay_ms: Option<u64>,
    pub ready_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

/// Contents of the optional `--config` JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub model_params: Option<ModelParams>,
    pub loop_policies: Option<LoopPolicies>,
    pub source_policies: Option<SourcePolicies>,
}

impl GlobalConfigDefaults {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            model: non_empty("SCOUT_MODEL"),
            base_url: non_empty("SCOUT_BASE_URL"),
            api_key: non_empty("GOOGLE_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub model_params: Option<ModelParams>,
    pub loop_policies: Option<LoopPolicies>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_tool_rounds: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    /// Messages of conversation memory carried into each turn.
    pub history_limit: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(45),
            history_limit: crate::agent::memory::MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Fixed wait for sites that render client-side.
    pub settle_delay: Duration,
    /// Upper bound on waiting for result items to appear.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_params: ModelParams,
    pub limits: LoopLimits,
    pub sources: SourceSettings,
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    env: &EnvConfig,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| env.model.clone())
        .or_else(|| global.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let base_url = request
        .base_url
        .clone()
        .or_else(|| env.base_url.clone())
        .or_else(|| global.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let model_params = ModelParams {
        temperature: request
            .model_params
            .as_ref()
            .and_then(|p| p.temperature)
            .or_else(|| global.model_params.as_ref().and_then(|p| p.temperature))
            .or(Some(0.5)),
        max_tokens: request
            .model_params
            .as_ref()
            .and_then(|p| p.max_tokens)
            .or_else(|| global.model_params.as_ref().and_then(|p| p.max_tokens)),
        top_p: request
            .model_params
            .as_ref()
            .and_then(|p| p.top_p)
            .or_else(|| global.model_params.as_ref().and_then(|p| p.top_p)),
    };

    let loop_policy = |f: fn(&LoopPolicies) -> Option<u64>| {
        request
            .loop_policies
            .as_ref()
            .and_then(f)
            .or_else(|| global.loop_policies.as_ref().and_then(f))
    };
    let defaults = LoopLimits::default();
    let limits = LoopLimits {
        max_tool_rounds: loop_policy(|p| p.max_tool_rounds.map(|n| n as u64))
            .map(|n| n as usize)
            .unwrap_or(defaults.max_tool_rounds),
        model_timeout: loop_policy(|p| p.model_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.model_timeout),
        tool_timeout: loop_policy(|p| p.tool_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.tool_timeout),
        history_limit: loop_policy(|p| p.history_limit.map(|n| n as u64))
            .map(|n| n as usize)
            .unwrap_or(defaults.history_limit),
    };

    let source_defaults = SourceSettings::default();
    let sp = global.source_policies.clone().unwrap_or_default();
    let sources = SourceSettings {
        settle_delay: sp.settle_delay_ms.map(Duration::from_millis).unwrap_or(source_defaults.settle_delay),
        ready_timeout: sp.ready_timeout_ms.map(Duration::from_millis).unwrap_or(source_defaults.ready_timeout),
        poll_interval: sp.poll_interval_ms.map(Duration::from_millis).unwrap_or(source_defaults.poll_interval),
        request_timeout: sp.request_timeout_secs.map(Duration::from_secs).unwrap_or(source_defaults.request_timeout),
        user_agent: sp.user_agent.unwrap_or(source_defaults.user_agent),
    };

    EffectiveSettings {
        model,
        base_url,
        api_key: env.api_key.clone(),
        model_params,
        limits,
        sources,
    }
}
