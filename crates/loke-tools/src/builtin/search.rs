// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Optionally restrict \
         to files matching an 'include' glob (e.g. '*.rs'). Returns \
         path:line: match lines, capped at 500 hits."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "include": { "type": "string", "description": "Glob restricting searched files (optional)" }
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
        let include = call.args.get("include").and_then(|v| v.as_str());
        match ctx.workspace.grep(pattern, include).await {
            Ok(hits) if hits.is_empty() => {
                ToolOutput::ok(&call.id, format!("no matches for /{pattern}/"))
            }
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .map(|m| format!("{}:{}: {}", m.path, m.line_number, m.line))
                    .collect();
                ToolOutput::ok(&call.id, lines.join("\n"))
            }
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
    async fn reports_path_line_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("main.rs", b"fn main() {\n    needle();\n}\n")
            .await
            .unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        let out = SearchTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "search".into(),
                    args: json!({"pattern": "needle"}),
                },
                &ctx,
            )
            .await;
        assert!(out.content.contains("main.rs:2:"));
    }

    #[tokio::test]
    async fn bad_regex_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        let out = SearchTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "search".into(),
                    args: json!({"pattern": "(unclosed"}),
                },
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
