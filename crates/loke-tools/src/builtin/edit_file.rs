// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact text anchor in a file. 'old' must match the file \
         byte-for-byte (including whitespace) and occur exactly once, unless \
         'replace_all' is set. On an ambiguity error, include more surrounding \
         lines in the anchor."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "old": { "type": "string", "description": "Exact text to replace" },
                "new": { "type": "string", "description": "Replacement text" },
                "replace_all": { "type": "boolean", "description": "Replace every occurrence (default false)" }
            },
            "required": ["path", "old", "new"],
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
        let (Some(old), Some(new)) = (
            call.args.get("old").and_then(|v| v.as_str()),
            call.args.get("new").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "missing 'old' or 'new' parameter");
        };
        if old == new {
            return ToolOutput::err(&call.id, "'old' and 'new' are identical");
        }
        let replace_all = call
            .args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match ctx.workspace.edit(path, old, new, replace_all).await {
            Ok(diff) => {
                ctx.emit(ToolEvent::FileChanged { path: path.to_string() }).await;
                ToolOutput::ok(
                    &call.id,
                    format!(
                        "edited {path} (+{} -{})\n{}",
                        diff.additions, diff.deletions, diff.diff
                    ),
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

    async fn setup() -> (ToolCtx, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("f.txt", b"alpha\nbeta\ngamma\n").await.unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        (ctx, dir)
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: "edit_file".into(),
            args,
        }
    }

    #[tokio::test]
    async fn edit_includes_diff_in_output() {
        let (ctx, _dir) = setup().await;
        let out = EditFileTool
            .execute(
                &call(json!({"path": "f.txt", "old": "beta", "new": "BETA"})),
                &ctx,
            )
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("+1 -1"));
        assert!(out.content.contains("-beta"));
        assert!(out.content.contains("+BETA"));
    }

    #[tokio::test]
    async fn ambiguous_anchor_suggests_fix() {
        let (ctx, _dir) = setup().await;
        ctx.workspace.write("f.txt", b"x\nx\n").await.unwrap();
        let out = EditFileTool
            .execute(&call(json!({"path": "f.txt", "old": "x", "new": "y"})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("2 locations"));
    }

    #[tokio::test]
    async fn identical_old_and_new_is_rejected() {
        let (ctx, _dir) = setup().await;
        let out = EditFileTool
            .execute(&call(json!({"path": "f.txt", "old": "beta", "new": "beta"})), &ctx)
            .await;
        assert!(out.is_error);
    }
}
