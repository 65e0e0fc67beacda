// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories come first \
         and carry a trailing slash. Omit 'path' for the workspace root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (optional, default root)" }
            },
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        match ctx.workspace.list(path).await {
            Ok(entries) if entries.is_empty() => ToolOutput::ok(&call.id, "(empty directory)"),
            Ok(entries) => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| {
                        if e.is_dir {
                            format!("{}/", e.name)
                        } else {
                            format!("{} ({} bytes)", e.name, e.size)
                        }
                    })
                    .collect();
                ToolOutput::ok(&call.id, lines.join("\n"))
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
    async fn directories_first_with_slash() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("zfile.txt", b"data").await.unwrap();
        ws.mkdir("adir").await.unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        let out = ListDirectoryTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "list_directory".into(),
                    args: json!({}),
                },
                &ctx,
            )
            .await;
        let first = out.content.lines().next().unwrap();
        assert_eq!(first, "adir/");
        assert!(out.content.contains("zfile.txt (4 bytes)"));
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        let out = ListDirectoryTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "list_directory".into(),
                    args: json!({"path": "nope"}),
                },
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
