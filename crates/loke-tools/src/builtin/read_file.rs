// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Keep file reads bounded: the model can page with offset/limit.
const READ_CAP_BYTES: usize = 64 * 1024;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Returns up to 64 KB per call; pass \
         'offset' (bytes) to continue reading a large file. Use list_directory \
         or glob first when unsure of the exact path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "offset": { "type": "integer", "description": "Byte offset to start from (optional)" },
                "limit": { "type": "integer", "description": "Maximum bytes to return (optional)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'path' parameter");
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).map(|v| v as usize);
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| (v as usize).min(READ_CAP_BYTES))
            .or(Some(READ_CAP_BYTES));

        match ctx.workspace.read(path, offset, limit).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).to_string();
                let suffix = if bytes.len() == READ_CAP_BYTES {
                    format!(
                        "\n[truncated at {} bytes; re-read with offset={}]",
                        READ_CAP_BYTES,
                        offset.unwrap_or(0) + bytes.len()
                    )
                } else {
                    String::new()
                };
                ToolOutput::ok(&call.id, format!("{text}{suffix}"))
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
        let (ctx, _rx) = testutil::ctx(ws);
        (ctx, dir)
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: "read_file".into(),
            args,
        }
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let (ctx, _dir) = setup().await;
        ctx.workspace.write("a.txt", b"content here").await.unwrap();
        let out = ReadFileTool.execute(&call(json!({"path": "a.txt"})), &ctx).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "content here");
    }

    #[tokio::test]
    async fn missing_file_is_error_with_hint() {
        let (ctx, _dir) = setup().await;
        let out = ReadFileTool
            .execute(&call(json!({"path": "README.md"})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
        assert!(out.content.contains("Hint:"));
    }

    #[tokio::test]
    async fn offset_pages_through_file() {
        let (ctx, _dir) = setup().await;
        ctx.workspace.write("a.txt", b"0123456789").await.unwrap();
        let out = ReadFileTool
            .execute(&call(json!({"path": "a.txt", "offset": 5, "limit": 3})), &ctx)
            .await;
        assert_eq!(out.content, "567");
    }

    #[tokio::test]
    async fn scope_escape_is_reported() {
        let (ctx, _dir) = setup().await;
        let out = ReadFileTool
            .execute(&call(json!({"path": "../../etc/passwd"})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("workspace root"));
    }
}
