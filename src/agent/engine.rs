use std::collections::HashSet;

use tracing::{debug, info};

use super::registry::ToolRegistry;
use crate::error::ScoutError;
use crate::models::{AiMessage, ChatMessage, LanguageModel};
use crate::session::ToolEvent;
use crate::settings::LoopLimits;
use crate::sources::Query;

pub const SYSTEM_PROMPT: &str = "You are an intelligent assistant that helps find the minimum priced product \
from Pakistani e-commerce sites using the available tools.\n\
Your goal is to find the **original product** the user is searching for, not an accessory, fake, or unrelated item.\n\
Use the tools to query product listings and return the product with the lowest price that matches the **actual product name** \
(e.g. if the user asks for 'iPhone 13', don't return cases or chargers).\n\
If the tools return irrelevant items, ignore them. If a tool reports that a source is unavailable, continue with the others.\n\
Answer with the product title, its price in PKR, the store, and the link.";

pub struct AgentContext<'a> {
    pub model: &'a dyn LanguageModel,
    pub tools: &'a ToolRegistry,
    pub limits: &'a LoopLimits,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub answer: String,
    pub tool_events: Vec<ToolEvent>,
    pub rounds: usize,
}

/// Drive the model until it stops asking for tools. Tool calls are made one at
/// a time in the order the model listed them.
pub async fn run_turn(ctx: AgentContext<'_>, history: Vec<ChatMessage>, query: &Query) -> Result<TurnOutcome, ScoutError> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history);
    messages.push(ChatMessage::human(query.as_str()));

    let mut tool_events = Vec::new();
    let mut call_ids = HashSet::new();
    let mut rounds = 0;
    loop {
        let reply = call_model(&ctx, &messages, rounds).await?;
        if reply.is_final() {
            info!(query = %query, rounds, messages = messages.len() + 1, "turn complete");
            return Ok(TurnOutcome { answer: reply.content, tool_events, rounds });
        }

        rounds += 1;
        if rounds > ctx.limits.max_tool_rounds {
            return Err(ScoutError::ProtocolViolation(format!(
                "model still requesting tools after {} rounds",
                ctx.limits.max_tool_rounds
            )));
        }
        let calls = reply.tool_calls.clone();
        messages.push(ChatMessage::Ai(reply));
        for call in calls {
            if !call_ids.insert(call.id.clone()) {
                return Err(ScoutError::ProtocolViolation(format!("tool call id {} reused within a turn", call.id)));
            }
            info!(tool = %call.name, id = %call.id, args = ?call.arguments, "calling tool");
            let outcome = ctx.tools.invoke(&call.name, &call.arguments, ctx.limits.tool_timeout).await?;
            debug!(tool = %call.name, summary = %outcome.summary(), "tool answered");
            tool_events.push(ToolEvent::record(&call.name, &outcome));
            messages.push(ChatMessage::ToolResult { tool_call_id: call.id, content: outcome.to_content() });
        }
    }
}

async fn call_model(ctx: &AgentContext<'_>, messages: &[ChatMessage], round: usize) -> Result<AiMessage, ScoutError> {
    metrics::counter!("price_scout_model_calls_total").increment(1);
    let limit = ctx.limits.model_timeout;
    match tokio::time::timeout(limit, ctx.model.complete(messages, ctx.tools.describe())).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(source)) => Err(ScoutError::ModelInvocation { round, source }),
        Err(_) => Err(ScoutError::ModelInvocation { round, source: crate::models::ModelError::Timeout(limit) }),
    }
}
