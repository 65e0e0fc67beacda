// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Reconnect replay: re-emit persisted history as `replay_*` events.
//!
//! The sequence mirrors the live stream exactly, modulo the `replay_`
//! prefix, so the client can rebuild its transcript with the same renderer
//! it uses for live events.

use crate::events::{
    Event, PlanData, ReplayStateData, ToolCallData, ToolResultData,
};
use crate::history::{AssistantBlock, ChatMessage};
use crate::session::SessionState;

/// Produce the full replay sequence for a freshly bound client: history in
/// order, `replay_done`, then `replay_state` when an interactive decision is
/// pending.  The caller emits `init` before and `resumed` after.
pub fn replay_events(state: &SessionState) -> Vec<Event> {
    let mut out = Vec::new();
    for msg in &state.history {
        match msg {
            ChatMessage::User { text, .. } => out.push(Event::ReplayUser {
                content: text.clone(),
            }),
            ChatMessage::Assistant { blocks } => {
                for block in blocks {
                    out.push(match block {
                        AssistantBlock::Thinking { text } => Event::ReplayThinking {
                            content: text.clone(),
                        },
                        AssistantBlock::Text { text } => Event::ReplayText {
                            content: text.clone(),
                        },
                        AssistantBlock::ToolUse { id, name, input } => Event::ReplayToolCall {
                            data: ToolCallData {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            },
                        },
                        AssistantBlock::ToolResult { id, content, success } => {
                            Event::ReplayToolResult {
                                data: ToolResultData {
                                    tool_use_id: id.clone(),
                                    success: *success,
                                    exit_code: None,
                                    duration_ms: None,
                                },
                                content: content.clone(),
                            }
                        }
                    });
                }
            }
        }
    }
    out.push(Event::ReplayDone);

    let awaiting_build = state.pending_plan.is_some();
    let awaiting_keep_revert = !state.pending_diffs.is_empty();
    if awaiting_build || awaiting_keep_revert || !state.todos.is_empty() {
        out.push(Event::ReplayState {
            data: ReplayStateData {
                pending_plan: state.pending_plan.as_ref().map(PlanData::from),
                awaiting_build,
                awaiting_keep_revert,
                diffs: state.pending_diffs.clone(),
                todos: state.todos.clone(),
            },
        });
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
