//! Claude-backed game master.
//!
//! Runs the tool-use loop for one exchange: every tool call is parsed into
//! an action and resolved, and the loop stops at the first output tool that
//! succeeds or when the model stops asking for tools.

use super::tools::{parse_tool_call, GameTools};
use super::{Completion, CompletionError, CompletionRequest, CompletionService, TurnOutcome};
use crate::actions::ActionResolver;
use crate::config::GameConfig;
use crate::history::{EntryKind, LogEntry, Part, PartKind};
use async_trait::async_trait;
use claude::{Claude, ContentBlock, Message, Request, Role, StopReason, ToolResult};
use serde_json::json;
use tracing::{debug, warn};

/// Upper bound on model calls in one exchange.
const MAX_TOOL_ROUNDS: usize = 12;

/// The production [`CompletionService`].
pub struct ClaudeGameMaster {
    client: Claude,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl ClaudeGameMaster {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            max_tokens: 4096,
            temperature: Some(0.8),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, CompletionError> {
        Ok(Self::new(Claude::from_env()?))
    }

    /// Apply model, token and temperature settings.
    pub fn with_config(mut self, config: &GameConfig) -> Self {
        if let Some(ref model) = config.model {
            self.client = self.client.with_model(model);
        }
        self.max_tokens = config.max_tokens;
        self.temperature = config.temperature;
        self
    }

    fn request(&self, messages: Vec<Message>, system: &str) -> Request {
        let mut request = Request::new(messages)
            .with_system(system)
            .with_max_tokens(self.max_tokens);
        if let Some(temp) = self.temperature {
            request = request.with_temperature(temp);
        }
        request
    }
}

#[async_trait]
impl CompletionService for ClaudeGameMaster {
    async fn complete(
        &self,
        request: CompletionRequest,
        actions: &ActionResolver,
    ) -> Result<Completion, CompletionError> {
        let ctx = request.context;
        let mut messages = to_messages(&request.history);
        messages.push(Message::user(&request.user_message));

        let mut new_entries = vec![LogEntry::user_input(&request.user_message)];
        let mut narrative = String::new();
        let mut outcome = None;

        for round in 0..MAX_TOOL_ROUNDS {
            let api_request = self
                .request(messages.clone(), &request.system_prompt)
                .with_tools(GameTools::for_track(ctx.track));
            let response = self.client.complete(api_request).await?;
            debug!(
                session = %ctx.session_id,
                round,
                stop = ?response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "game master response"
            );

            let mut parts = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } => {
                        if !narrative.is_empty() {
                            narrative.push('\n');
                        }
                        narrative.push_str(text);
                        parts.push(Part::new(PartKind::ModelText, text.as_str()));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        let call = json!({ "id": id, "name": name, "input": input });
                        parts.push(Part::new(PartKind::ToolInvocation, call.to_string()));
                    }
                    _ => {}
                }
            }
            if !parts.is_empty() {
                new_entries.push(LogEntry::response(parts));
            }

            let tool_uses = response.tool_uses();
            if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
                break;
            }

            messages.push(Message {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            let mut blocks = Vec::new();
            let mut result_parts = Vec::new();
            for tool_use in tool_uses {
                let result = match parse_tool_call(&tool_use.name, &tool_use.input) {
                    Some(action) => {
                        let is_output = action.is_output();
                        match actions.resolve(&ctx, action) {
                            Ok(resolution) => {
                                if is_output && outcome.is_none() {
                                    outcome = resolution.outcome;
                                }
                                ToolResult::success(resolution.message)
                            }
                            Err(e) => {
                                debug!(tool = %tool_use.name, error = %e, "tool failed");
                                ToolResult::error(e.to_string())
                            }
                        }
                    }
                    None => ToolResult::error(format!(
                        "Unknown tool or invalid input for {}",
                        tool_use.name
                    )),
                };

                let content = if result.is_error {
                    format!("error: {}", result.content)
                } else {
                    result.content.clone()
                };
                result_parts.push(Part::new(PartKind::ToolResult, content));
                blocks.push(result.into_block(tool_use.id));
            }

            new_entries.push(LogEntry::request(result_parts));
            messages.push(Message {
                role: Role::User,
                content: blocks,
            });

            if outcome.is_some() {
                break;
            }
            if round + 1 == MAX_TOOL_ROUNDS {
                warn!(session = %ctx.session_id, "tool loop limit reached");
            }
        }

        if narrative.trim().is_empty() && outcome.is_none() {
            return Err(CompletionError::Empty);
        }
        let outcome = outcome.unwrap_or(TurnOutcome::Continue { text: narrative });
        Ok(Completion::new(outcome, request.history, new_entries))
    }

    async fn summarize(
        &self,
        instruction: &str,
        transcript: &str,
    ) -> Result<String, CompletionError> {
        let request = self.request(vec![Message::user(transcript)], instruction);
        let text = self.client.complete(request).await?.text();
        if text.trim().is_empty() {
            Err(CompletionError::Empty)
        } else {
            Ok(text)
        }
    }
}

/// Rebuild a conversation from a stored model log.
///
/// Tool traffic from earlier exchanges is replayed as plain text, so the
/// log can be cut anywhere without leaving a tool result orphaned.
/// Consecutive entries from the same side are merged, and the conversation
/// always opens with a user turn.
pub(crate) fn to_messages(history: &[LogEntry]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for entry in history {
        let text = entry
            .parts
            .iter()
            .filter(|p| !p.content.trim().is_empty())
            .map(|p| match p.kind {
                PartKind::UserInput | PartKind::ModelText => p.content.clone(),
                PartKind::ToolInvocation => format!("[tool call] {}", p.content),
                PartKind::ToolResult => format!("[tool result] {}", p.content),
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            continue;
        }

        let role = match entry.kind {
            EntryKind::Request => Role::User,
            EntryKind::Response => Role::Assistant,
        };
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push(ContentBlock::Text { text });
            }
            _ => messages.push(Message {
                role,
                content: vec![ContentBlock::Text { text }],
            }),
        }
    }

    if messages.first().is_some_and(|m| m.role == Role::Assistant) {
        messages.insert(0, Message::user("(The story so far.)"));
    }
    messages
}
