//! Message domain types.
//!
//! A conversation is an ordered list of [`Message`]s. Each message is a
//! tagged union over its role, so an assistant message can never carry a
//! final answer and tool requests at the same time.

use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// A single entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// Fixed instructions. At most once, always first.
    System { content: String },

    /// User-authored text.
    Human { content: String },

    /// Model-authored reply.
    Assistant { body: AssistantBody },

    /// Outcome of one tool call.
    Tool {
        call_id: String,
        tool_name: String,
        success: bool,
        content: String,
    },
}

/// What an assistant message carries: an answer or a batch of tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantBody {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

/// Role discriminant, handy for logging and provider wire conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a human message.
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
        }
    }

    /// Create an assistant message carrying a final answer.
    pub fn answer(content: impl Into<String>) -> Self {
        Self::Assistant {
            body: AssistantBody::Answer(content.into()),
        }
    }

    /// Create an assistant message requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            body: AssistantBody::ToolCalls(calls),
        }
    }

    /// Wrap a normalized tool result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self::Tool {
            call_id: result.call_id,
            tool_name: result.tool_name,
            success: result.success,
            content: result.output,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::Human { .. } => Role::Human,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content of the message. Tool requests have none.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::Human { content } => Some(content),
            Message::Assistant {
                body: AssistantBody::Answer(content),
            } => Some(content),
            Message::Assistant {
                body: AssistantBody::ToolCalls(_),
            } => None,
            Message::Tool { content, .. } => Some(content),
        }
    }

    /// Tool calls requested by this message, empty for everything but a
    /// tool-requesting assistant message.
    pub fn requested_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant {
                body: AssistantBody::ToolCalls(calls),
            } => calls,
            _ => &[],
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        match self {
            Message::Assistant {
                body: AssistantBody::ToolCalls(calls),
            } => calls
                .iter()
                .map(|c| (c.name.len() + c.arguments.to_string().len()) / 4)
                .sum(),
            other => other.text().map(|t| t.len() / 4).unwrap_or(0),
        }
    }
}
