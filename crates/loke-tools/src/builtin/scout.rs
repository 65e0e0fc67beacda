// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Files whose heads get quoted in the scout summary when present.
const KEY_FILES: &[&str] = &[
    "README.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "Makefile",
];

const KEY_FILE_HEAD_BYTES: usize = 600;

/// Read-only workspace exploration pass that primes planning: top-level
/// layout, file-type distribution, and the heads of well-known project
/// files, condensed into one summary block.
pub struct ScoutTool;

#[async_trait]
impl Tool for ScoutTool {
    fn name(&self) -> &str {
        "scout"
    }

    fn description(&self) -> &str {
        "Survey the workspace: top-level layout, file counts by type, and the \
         first lines of key project files. Use before planning work in an \
         unfamiliar codebase."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    fn read_only(&self) -> bool {
        true
    }

    fn streaming(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let mut summary = String::new();

        ctx.emit(ToolEvent::ScoutProgress {
            message: "listing top-level entries".into(),
        })
        .await;
        match ctx.workspace.list("").await {
            Ok(entries) => {
                summary.push_str("## Top level\n");
                for e in entries.iter().take(40) {
                    if e.is_dir {
                        summary.push_str(&format!("- {}/\n", e.name));
                    } else {
                        summary.push_str(&format!("- {}\n", e.name));
                    }
                }
            }
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        }

        if ctx.cancel.is_cancelled() {
            return ToolOutput::cancelled(&call.id);
        }

        ctx.emit(ToolEvent::ScoutProgress {
            message: "counting files by type".into(),
        })
        .await;
        if let Ok(files) = ctx.workspace.glob("**/*").await {
            let mut by_ext: BTreeMap<String, usize> = BTreeMap::new();
            for f in &files {
                let ext = f
                    .rsplit_once('.')
                    .map(|(_, e)| e.to_string())
                    .unwrap_or_else(|| "(none)".into());
                *by_ext.entry(ext).or_default() += 1;
            }
            let mut counts: Vec<(String, usize)> = by_ext.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            summary.push_str(&format!("\n## Files ({} total)\n", files.len()));
            for (ext, n) in counts.into_iter().take(12) {
                summary.push_str(&format!("- .{ext}: {n}\n"));
            }
        }

        if ctx.cancel.is_cancelled() {
            return ToolOutput::cancelled(&call.id);
        }

        ctx.emit(ToolEvent::ScoutProgress {
            message: "reading key project files".into(),
        })
        .await;
        for key in KEY_FILES {
            if let Ok(bytes) = ctx.workspace.read(key, None, Some(KEY_FILE_HEAD_BYTES)).await {
                let head = String::from_utf8_lossy(&bytes);
                summary.push_str(&format!("\n## {key}\n{}\n", head.trim_end()));
            }
        }

        ToolOutput::ok(&call.id, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;

    #[tokio::test]
    async fn summarises_layout_and_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("README.md", b"# My Project\nA demo.").await.unwrap();
        ws.write("src/main.rs", b"fn main() {}").await.unwrap();
        ws.write("src/lib.rs", b"pub fn x() {}").await.unwrap();
        let (ctx, mut rx) = testutil::ctx(ws);

        let out = ScoutTool
            .execute(
                &ToolCall {
                    id: "s1".into(),
                    name: "scout".into(),
                    args: json!({}),
                },
                &ctx,
            )
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("src/"));
        assert!(out.content.contains(".rs: 2"));
        assert!(out.content.contains("# My Project"));

        let mut progress = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, ToolEvent::ScoutProgress { .. }) {
                progress += 1;
            }
        }
        assert!(progress >= 3, "expected progressive scout events");
    }

    #[tokio::test]
    async fn cancelled_scout_reports_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        ctx.cancel.cancel();
        let out = ScoutTool
            .execute(
                &ToolCall {
                    id: "s1".into(),
                    name: "scout".into(),
                    args: json!({}),
                },
                &ctx,
            )
            .await;
        assert!(out.is_error);
        assert_eq!(out.content, "cancelled");
    }
}
