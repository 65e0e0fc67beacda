// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

// ─── Conversation wire types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message as sent to the provider.  The session's block-structured
/// history is flattened into this shape right before each completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        name: String,
        /// JSON-encoded arguments, verbatim as the model produced them.
        arguments: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Tool definition forwarded to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

// ─── Stream events ───────────────────────────────────────────────────────────

/// The kind of a streamed content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Thinking,
    Text,
}

/// Ordered events yielded by a provider stream.
///
/// The contract the turn engine relies on:
/// - `ContentDelta(kind, _)` arrives between matching `ContentStart(kind)`
///   and `ContentEnd(kind)` markers,
/// - `ToolUse` fragments for one call share an `index` and concatenate into
///   the JSON argument string,
/// - exactly one `MessageEnd` terminates a successful stream; `Usage` may
///   arrive at any point before it.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    ContentStart(ContentKind),
    ContentDelta(ContentKind, String),
    ContentEnd(ContentKind),
    ToolUse {
        /// Parallel-tool-call index from the provider.  Providers that never
        /// interleave always use 0.
        index: u32,
        id: String,
        name: String,
        input_fragment: String,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        cache_read_tokens: u64,
    },
    MessageEnd,
}

/// Accumulates interleaved [`StreamEvent::ToolUse`] fragments into complete
/// calls, ordered by provider index.
#[derive(Debug, Default)]
pub struct ToolUseAccumulator {
    pending: std::collections::BTreeMap<u32, PendingToolUse>,
}

#[derive(Debug, Default)]
struct PendingToolUse {
    id: String,
    name: String,
    input_buf: String,
}

/// A fully assembled tool invocation from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUseAccumulator {
    pub fn push(&mut self, index: u32, id: &str, name: &str, fragment: &str) {
        let entry = self.pending.entry(index).or_default();
        if !id.is_empty() {
            entry.id = id.to_string();
        }
        if !name.is_empty() {
            entry.name = name.to_string();
        }
        entry.input_buf.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain accumulated calls in index order.
    ///
    /// Calls with an empty name cannot be dispatched and are dropped; an
    /// empty id gets a synthetic one so the result pairing stays intact.
    /// Unparseable argument JSON falls back to `{}` — the tool reports the
    /// missing fields, which the model can correct on the next round.
    pub fn finish(self) -> Vec<CompletedToolUse> {
        let mut out = Vec::with_capacity(self.pending.len());
        for (i, (_, p)) in self.pending.into_iter().enumerate() {
            if p.name.is_empty() {
                tracing::warn!(tool_call_id = %p.id, "dropping tool call with empty name");
                continue;
            }
            let id = if p.id.is_empty() {
                format!("call_synthetic_{i}")
            } else {
                p.id
            };
            let input = if p.input_buf.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&p.input_buf).unwrap_or_else(|e| {
                    tracing::warn!(tool = %p.name, error = %e, "invalid tool argument JSON, substituting {{}}");
                    serde_json::Value::Object(Default::default())
                })
            };
            out.push(CompletedToolUse {
                id,
                name: p.name,
                input,
            });
        }
        out
    }
}

/// Token usage totals for one completed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accumulator_concatenates_fragments() {
        let mut acc = ToolUseAccumulator::default();
        acc.push(0, "c1", "read_file", "{\"path\":");
        acc.push(0, "", "", "\"a.txt\"}");
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].input, json!({"path": "a.txt"}));
    }

    #[test]
    fn accumulator_orders_by_index() {
        let mut acc = ToolUseAccumulator::default();
        acc.push(1, "b", "second", "{}");
        acc.push(0, "a", "first", "{}");
        let calls = acc.finish();
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn empty_name_is_dropped() {
        let mut acc = ToolUseAccumulator::default();
        acc.push(0, "c1", "", "{}");
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn empty_id_gets_synthetic_fallback() {
        let mut acc = ToolUseAccumulator::default();
        acc.push(0, "", "bash", "{}");
        let calls = acc.finish();
        assert_eq!(calls[0].id, "call_synthetic_0");
    }

    #[test]
    fn broken_json_becomes_empty_object() {
        let mut acc = ToolUseAccumulator::default();
        acc.push(0, "c1", "bash", "{\"cmd\": ");
        let calls = acc.finish();
        assert_eq!(calls[0].input, json!({}));
    }

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool_result("t", "r").role, Role::Tool);
    }
}
