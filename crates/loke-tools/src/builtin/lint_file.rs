// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Heuristic single-file lint: no compiler, just the mechanical issues an
/// agent introduces most often (broken bracket balance, stray conflict
/// markers, tabs mixed into space-indented files, trailing whitespace).
pub struct LintFileTool;

#[async_trait]
impl Tool for LintFileTool {
    fn name(&self) -> &str {
        "lint_file"
    }

    fn description(&self) -> &str {
        "Quick mechanical checks on one file: unbalanced brackets, merge \
         conflict markers, mixed indentation, trailing whitespace. Not a \
         compiler — use bash to run the project's real linter when one exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to check" }
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
        let text = match ctx.workspace.read_text(path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("{e}. Hint: {}", e.hint())),
        };

        let mut findings = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let ln = i + 1;
            if line.starts_with("<<<<<<<") || line.starts_with(">>>>>>>") || line == "=======" {
                findings.push(format!("{ln}: merge conflict marker"));
            }
            if line.ends_with(' ') || line.ends_with('\t') {
                findings.push(format!("{ln}: trailing whitespace"));
            }
        }

        let space_indented = text.lines().filter(|l| l.starts_with("    ")).count();
        let tab_indented = text.lines().filter(|l| l.starts_with('\t')).count();
        if space_indented > 0 && tab_indented > 0 {
            findings.push(format!(
                "mixed indentation: {space_indented} space-indented vs {tab_indented} tab-indented lines"
            ));
        }

        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            let opens = count_outside_strings(&text, open);
            let closes = count_outside_strings(&text, close);
            if opens != closes {
                findings.push(format!("unbalanced '{open}{close}': {opens} vs {closes}"));
            }
        }

        if findings.is_empty() {
            ToolOutput::ok(&call.id, format!("{path}: no issues found"))
        } else {
            ToolOutput::ok(
                &call.id,
                format!("{path}: {} issue(s)\n{}", findings.len(), findings.join("\n")),
            )
        }
    }
}

/// Count `needle` outside of quoted string/char literals and line comments.
/// Crude, but cuts false positives from `")"` and `// }` noise.
fn count_outside_strings(text: &str, needle: char) -> usize {
    let mut count = 0;
    for line in text.lines() {
        let mut in_str = false;
        let mut in_char = false;
        let mut prev = '\0';
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if !in_str && !in_char && c == '/' && chars.peek() == Some(&'/') {
                break;
            }
            match c {
                '"' if !in_char && prev != '\\' => in_str = !in_str,
                '\'' if !in_str && prev != '\\' => in_char = !in_char,
                _ if c == needle && !in_str && !in_char => count += 1,
                _ => {}
            }
            prev = if prev == '\\' && c == '\\' { '\0' } else { c };
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;

    async fn lint(content: &str) -> ToolOutput {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        ws.write("f.rs", content.as_bytes()).await.unwrap();
        let (ctx, _rx) = testutil::ctx(ws);
        LintFileTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "lint_file".into(),
                    args: json!({"path": "f.rs"}),
                },
                &ctx,
            )
            .await
    }

    #[tokio::test]
    async fn clean_file_has_no_issues() {
        let out = lint("fn main() {\n    println!(\"ok\");\n}\n").await;
        assert!(out.content.contains("no issues"));
    }

    #[tokio::test]
    async fn detects_conflict_markers() {
        let out = lint("<<<<<<< HEAD\nx\n=======\ny\n>>>>>>> branch\n").await;
        assert!(out.content.contains("merge conflict marker"));
    }

    #[tokio::test]
    async fn detects_unbalanced_braces() {
        let out = lint("fn main() {\n    if true {\n}\n").await;
        assert!(out.content.contains("unbalanced '{}'"));
    }

    #[tokio::test]
    async fn brace_inside_string_is_ignored() {
        let out = lint("fn main() {\n    let s = \"}\";\n}\n").await;
        assert!(out.content.contains("no issues"), "{}", out.content);
    }
}
