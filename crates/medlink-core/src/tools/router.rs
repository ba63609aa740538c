use std::sync::Arc;

use medlink_llm::prompts::make_router_messages;
use medlink_llm::{normalize, ChatMessage, CompletionApi, CompletionRequest, LlmError, Normalized};
use serde_json::{Map, Value};
use tracing::debug;

use super::{ToolInvocation, ToolName};
use crate::error::CapabilityResult;
use crate::models::HistoryTurn;

/// Classifies a request into one tool invocation.
pub struct ToolRouter {
    completion: Arc<dyn CompletionApi>,
    /// Trailing history turns shown to the model.
    history_window: usize,
}

impl ToolRouter {
    pub fn new(completion: Arc<dyn CompletionApi>, history_window: usize) -> Self {
        Self {
            completion,
            history_window,
        }
    }

    pub async fn route(&self, query: &str, history: &[HistoryTurn]) -> CapabilityResult<ToolInvocation> {
        let start = history.len().saturating_sub(self.history_window);
        let history: Vec<ChatMessage> = history[start..].iter().map(ChatMessage::from).collect();

        let request = CompletionRequest::new(make_router_messages(query, &history)).json();
        let raw = self.completion.complete(request).await?;
        let invocation = parse_invocation(&raw)?;
        debug!(tool = %invocation.tool(), "routed request");
        Ok(invocation)
    }
}

/// Interpret router output. Unparseable text is treated as the model
/// answering directly; an unknown tool becomes a direct reply carrying
/// whatever reply text the model supplied.
pub(crate) fn parse_invocation(raw: &str) -> CapabilityResult<ToolInvocation> {
    if raw.trim().is_empty() {
        return Err(LlmError::Empty("tool router").into());
    }
    match normalize::<Value>(raw, Value::Null) {
        Normalized::UpstreamError { fault, .. } => Err(LlmError::from(fault).into()),
        Normalized::Fallback(_) => Ok(ToolInvocation::direct_reply(raw.trim())),
        Normalized::Structured(Value::String(text)) => Ok(ToolInvocation::direct_reply(text)),
        Normalized::Structured(Value::Object(mut obj)) => {
            let label = ["tool", "name", "action"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            let args = ["args", "arguments", "parameters"]
                .iter()
                .find_map(|k| match obj.remove(*k) {
                    Some(Value::Object(args)) => Some(args),
                    _ => None,
                })
                .unwrap_or_default();

            match label.as_deref().and_then(ToolName::parse) {
                Some(tool) => Ok(ToolInvocation::new(tool, args)),
                None => {
                    debug!(tool = ?label, "unknown tool, treating as direct reply");
                    let mut reply_args = Map::new();
                    if let Some(reply) = args
                        .get("reply")
                        .or_else(|| obj.get("reply"))
                        .or_else(|| args.get("message"))
                    {
                        reply_args.insert("reply".to_string(), reply.clone());
                    }
                    Ok(ToolInvocation::new(ToolName::DirectReply, reply_args))
                }
            }
        }
        Normalized::Structured(_) => Err(LlmError::Validation(
            "tool router returned neither an object nor text".into(),
        )
        .into()),
    }
}
