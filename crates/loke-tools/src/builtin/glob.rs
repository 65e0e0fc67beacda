// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern, e.g. '**/*.rs' or 'src/*.ts'. A bare \
         pattern like '*.toml' matches at any depth. Returns workspace-relative \
         paths, sorted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(pattern) = call.args.get("pattern").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'pattern' parameter");
        };
        match ctx.workspace.glob(pattern).await {
            Ok(paths) if paths.is_empty() => {
                ToolOutput::ok(&call.id, format!("no files match '{pattern}'"))
            }
            Ok(paths) => ToolOutput::ok(&call.id, paths.join("\n")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
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
    async fn lists_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("src/a.rs", b"x").await.unwrap();
        ws.write("src/b.rs", b"y").await.unwrap();
        ws.write("doc.md", b"z").await.unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        let out = GlobTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "glob".into(),
                    args: json!({"pattern": "**/*.rs"}),
                },
                &ctx,
            )
            .await;
        assert_eq!(out.content, "src/a.rs\nsrc/b.rs");
    }

    #[tokio::test]
    async fn no_matches_is_informative_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        let out = GlobTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "glob".into(),
                    args: json!({"pattern": "*.zig"}),
                },
                &ctx,
            )
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("no files match"));
    }
}
