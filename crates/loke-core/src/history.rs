// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Block-structured conversation history.
//!
//! This is the persisted form: a user message is text plus optional images,
//! an assistant message is an ordered block list (thinking, text, tool use,
//! tool result).  Replay walks these blocks; model requests flatten them
//! into the provider wire shape.

use serde::{Deserialize, Serialize};

use loke_model::Message as WireMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        images: Vec<String>,
    },
    Assistant {
        blocks: Vec<AssistantBlock>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistantBlock {
    Thinking {
        text: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        content: String,
        success: bool,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// Flatten block history into provider messages.
///
/// Thinking blocks are not resent (they were the model's own scratch work);
/// tool_use and tool_result blocks become paired assistant/tool messages in
/// block order, which is exactly the shape providers expect.
pub fn to_wire(history: &[ChatMessage]) -> Vec<WireMessage> {
    let mut out = Vec::new();
    for msg in history {
        match msg {
            ChatMessage::User { text, .. } => out.push(WireMessage::user(text.clone())),
            ChatMessage::Assistant { blocks } => {
                for block in blocks {
                    match block {
                        AssistantBlock::Thinking { .. } => {}
                        AssistantBlock::Text { text } => {
                            out.push(WireMessage::assistant(text.clone()))
                        }
                        AssistantBlock::ToolUse { id, name, input } => {
                            out.push(WireMessage::tool_call(id, name, input.to_string()))
                        }
                        AssistantBlock::ToolResult { id, content, .. } => {
                            out.push(WireMessage::tool_result(id, content.clone()))
                        }
                    }
                }
            }
        }
    }
    out
}

/// Check the tool_use / tool_result pairing invariant over a history.
///
/// Returns the ids of unpaired tool_use blocks.  Used by tests and by the
/// turn engine's cancel path to know which synthetic failures to append.
pub fn unpaired_tool_uses(history: &[ChatMessage]) -> Vec<String> {
    let mut open: Vec<String> = Vec::new();
    for msg in history {
        if let ChatMessage::Assistant { blocks } = msg {
            for block in blocks {
                match block {
                    AssistantBlock::ToolUse { id, .. } => open.push(id.clone()),
                    AssistantBlock::ToolResult { id, .. } => {
                        open.retain(|o| o != id);
                    }
                    _ => {}
                }
            }
        }
    }
    open
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use loke_model::{MessageContent, Role};
    use serde_json::json;

    fn sample() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("read the file"),
            ChatMessage::Assistant {
                blocks: vec![
                    AssistantBlock::Thinking {
                        text: "need to read it".into(),
                    },
                    AssistantBlock::ToolUse {
                        id: "c1".into(),
                        name: "read_file".into(),
                        input: json!({"path": "a.txt"}),
                    },
                    AssistantBlock::ToolResult {
                        id: "c1".into(),
                        content: "contents".into(),
                        success: true,
                    },
                    AssistantBlock::Text {
                        text: "The file says: contents".into(),
                    },
                ],
            },
        ]
    }

    #[test]
    fn wire_flattening_skips_thinking() {
        let wire = to_wire(&sample());
        assert_eq!(wire.len(), 4); // user, tool_call, tool_result, assistant text
        assert!(matches!(wire[0].role, Role::User));
        assert!(matches!(
            wire[1].content,
            MessageContent::ToolCall { .. }
        ));
        assert!(matches!(
            wire[2].content,
            MessageContent::ToolResult { .. }
        ));
    }

    #[test]
    fn pairing_detects_missing_result() {
        let mut history = sample();
        if let ChatMessage::Assistant { blocks } = &mut history[1] {
            blocks.push(AssistantBlock::ToolUse {
                id: "c2".into(),
                name: "bash".into(),
                input: json!({}),
            });
        }
        assert_eq!(unpaired_tool_uses(&history), vec!["c2".to_string()]);
    }

    #[test]
    fn pairing_is_clean_on_sample() {
        assert!(unpaired_tool_uses(&sample()).is_empty());
    }

    #[test]
    fn history_round_trips_json() {
        let text = serde_json::to_string(&sample()).unwrap();
        let back: Vec<ChatMessage> = serde_json::from_str(&text).unwrap();
        assert_eq!(to_wire(&back).len(), 4);
    }
}
