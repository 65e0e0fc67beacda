// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolCtx;
use crate::events::{TodoItem, TodoStatus, ToolEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the session's task list.\n\n\
         ## Statuses\n\
         - pending: not yet started\n\
         - in_progress: currently being worked on (only ONE at a time)\n\
         - completed: finished\n\n\
         Use proactively for multi-step work; skip it for trivial single-step \
         tasks. Mark items completed IMMEDIATELY after finishing them. \
         Calling todo_write replaces the entire list, not a patch."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The full todo list (replaces the existing one)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                        },
                        "required": ["id", "content", "status"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(raw) = call.args.get("todos").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "missing 'todos' array");
        };
        let mut items = Vec::with_capacity(raw.len());
        for item in raw {
            let id = match item.get("id").and_then(|v| v.as_str()) {
                Some(s) => s.to_string(),
                None => return ToolOutput::err(&call.id, "todo item missing 'id'"),
            };
            let content = match item.get("content").and_then(|v| v.as_str()) {
                Some(s) => s.to_string(),
                None => {
                    return ToolOutput::err(&call.id, format!("todo '{id}' missing 'content'"))
                }
            };
            let status = match item.get("status").and_then(|v| v.as_str()) {
                Some("pending") => TodoStatus::Pending,
                Some("in_progress") => TodoStatus::InProgress,
                Some("completed") => TodoStatus::Completed,
                Some(other) => {
                    return ToolOutput::err(
                        &call.id,
                        format!("invalid status '{other}' for todo '{id}'"),
                    )
                }
                None => return ToolOutput::err(&call.id, format!("todo '{id}' missing 'status'")),
            };
            items.push(TodoItem { id, content, status });
        }

        let in_progress = items
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        if in_progress > 1 {
            return ToolOutput::err(&call.id, "at most one todo can be 'in_progress' at a time");
        }

        debug!(count = items.len(), "todo_write");
        *ctx.todos.lock().await = items.clone();
        ctx.emit(ToolEvent::TodosUpdated(items.clone())).await;
        ToolOutput::ok(&call.id, format_todos(&items))
    }
}

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todo_read"
    }

    fn description(&self) -> &str {
        "Read the session's current task list."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let todos = ctx.todos.lock().await;
        ToolOutput::ok(&call.id, format_todos(&todos))
    }
}

fn format_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "Todo list is empty.".to_string();
    }
    let lines: Vec<String> = items
        .iter()
        .map(|t| {
            let icon = match t.status {
                TodoStatus::Completed => "✓",
                TodoStatus::InProgress => "→",
                TodoStatus::Pending => "○",
            };
            format!("{icon} [{}] {}", t.id, t.content)
        })
        .collect();
    lines.join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: "todo_write".into(),
            args,
        }
    }

    async fn setup() -> (ToolCtx, tokio::sync::mpsc::Receiver<ToolEvent>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, rx) = testutil::ctx(ws);
        (ctx, rx, dir)
    }

    #[tokio::test]
    async fn write_replaces_list_and_emits_event() {
        let (ctx, mut rx, _dir) = setup().await;
        let out = TodoWriteTool
            .execute(
                &call(json!({"todos": [
                    {"id": "1", "content": "analyse", "status": "in_progress"},
                    {"id": "2", "content": "implement", "status": "pending"}
                ]})),
                &ctx,
            )
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(ctx.todos.lock().await.len(), 2);
        assert!(matches!(rx.try_recv().unwrap(), ToolEvent::TodosUpdated(_)));
    }

    #[tokio::test]
    async fn rejects_two_in_progress() {
        let (ctx, _rx, _dir) = setup().await;
        let out = TodoWriteTool
            .execute(
                &call(json!({"todos": [
                    {"id": "1", "content": "a", "status": "in_progress"},
                    {"id": "2", "content": "b", "status": "in_progress"}
                ]})),
                &ctx,
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("at most one"));
    }

    #[tokio::test]
    async fn read_reflects_written_state() {
        let (ctx, _rx, _dir) = setup().await;
        TodoWriteTool
            .execute(
                &call(json!({"todos": [{"id": "1", "content": "thing", "status": "completed"}]})),
                &ctx,
            )
            .await;
        let out = TodoReadTool
            .execute(
                &ToolCall {
                    id: "r".into(),
                    name: "todo_read".into(),
                    args: json!({}),
                },
                &ctx,
            )
            .await;
        assert!(out.content.contains("✓ [1] thing"));
    }

    #[tokio::test]
    async fn invalid_status_is_rejected() {
        let (ctx, _rx, _dir) = setup().await;
        let out = TodoWriteTool
            .execute(
                &call(json!({"todos": [{"id": "1", "content": "x", "status": "cancelled"}]})),
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
