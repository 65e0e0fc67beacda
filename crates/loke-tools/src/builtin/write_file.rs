// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content. Parent directories \
         are created as needed. Prefer edit_file for small changes to existing \
         files so the diff stays reviewable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'path' parameter");
        };
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'content' parameter");
        };
        match ctx.workspace.write(path, content.as_bytes()).await {
            Ok(()) => {
                ctx.emit(ToolEvent::FileChanged { path: path.to_string() }).await;
                ToolOutput::ok(
                    &call.id,
                    format!("wrote {} bytes to {path}", content.len()),
                )
            }
            Err(e) => ToolOutput::err(&call.id, format!("{e}. Hint: {}", e.hint())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, mut rx) = testutil::ctx(ws.clone());
        let out = WriteFileTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "write_file".into(),
                    args: json!({"path": "sub/f.txt", "content": "hello"}),
                },
                &ctx,
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(ws.read_text("sub/f.txt").await.unwrap(), "hello");
        assert!(matches!(
            rx.try_recv().unwrap(),
            ToolEvent::FileChanged { .. }
        ));
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        let out = WriteFileTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "write_file".into(),
                    args: json!({"path": "f.txt"}),
                },
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
