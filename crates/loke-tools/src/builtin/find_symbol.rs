// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Definition-site lookup via language-agnostic declaration patterns.
/// Not a real symbol index, but cheap and good enough to jump the model to
/// the right file.
pub struct FindSymbolTool;

fn definition_pattern(symbol: &str) -> String {
    let sym = regex::escape(symbol);
    format!(
        r"(fn|struct|enum|trait|impl|type|const|static|class|def|function|interface|var|let|module)\s+{sym}\b"
    )
}

#[async_trait]
impl Tool for FindSymbolTool {
    fn name(&self) -> &str {
        "find_symbol"
    }

    fn description(&self) -> &str {
        "Locate the definition of a function, type or class by name across \
         the workspace. Matches common declaration keywords in Rust, Python, \
         JS/TS, Go and similar languages."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Symbol name to look up" }
            },
            "required": ["symbol"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(symbol) = call.args.get("symbol").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'symbol' parameter");
        };
        if symbol.trim().is_empty() {
            return ToolOutput::err(&call.id, "'symbol' must not be empty");
        }
        match ctx.workspace.grep(&definition_pattern(symbol), None).await {
            Ok(hits) if hits.is_empty() => ToolOutput::ok(
                &call.id,
                format!("no definition of '{symbol}' found; try search for usages"),
            ),
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .take(50)
                    .map(|m| format!("{}:{}: {}", m.path, m.line_number, m.line.trim()))
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
    async fn finds_rust_fn_definition() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("lib.rs", b"pub fn compute_total(x: u32) -> u32 { x }\n")
            .await
            .unwrap();
        ws.write("caller.rs", b"let t = compute_total(4);\n")
            .await
            .unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        let out = FindSymbolTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "find_symbol".into(),
                    args: json!({"symbol": "compute_total"}),
                },
                &ctx,
            )
            .await;
        assert!(out.content.contains("lib.rs:1"));
        assert!(!out.content.contains("caller.rs"), "{}", out.content);
    }

    #[tokio::test]
    async fn finds_python_def() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("app.py", b"def handler(request):\n    pass\n")
            .await
            .unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        let out = FindSymbolTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "find_symbol".into(),
                    args: json!({"symbol": "handler"}),
                },
                &ctx,
            )
            .await;
        assert!(out.content.contains("app.py:1"));
    }
}
