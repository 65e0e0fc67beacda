// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

const FETCH_CAP_BYTES: usize = 100 * 1024;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return its text content. HTML is \
         reduced to visible text. Capped at 100 KB."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http:// or https:// URL" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        if !ctx.config.allow_web_fetch {
            return ToolOutput::err(&call.id, "web_fetch is disabled by configuration");
        }
        let Some(url) = call.args.get("url").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'url' parameter");
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolOutput::err(&call.id, "only http:// and https:// URLs are supported");
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("client builder with static config");
        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("fetch failed: {e}")),
        };
        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("body read failed: {e}")),
        };
        if !status.is_success() {
            return ToolOutput::err(&call.id, format!("HTTP {status} for {url}"));
        }

        let text = if content_type.contains("html") {
            strip_html(&body)
        } else {
            body
        };
        let mut text = text;
        if text.len() > FETCH_CAP_BYTES {
            let mut cut = FETCH_CAP_BYTES;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n[truncated at 100 KB]");
        }
        ToolOutput::ok(&call.id, text)
    }
}

/// Minimal tag stripper: drops script/style bodies, removes tags, collapses
/// blank runs.  Good enough for documentation pages; no DOM is built.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    while !rest.is_empty() {
        if let Some(closer) = skip_until {
            match rest.to_ascii_lowercase().find(closer) {
                Some(pos) => {
                    rest = &rest[pos + closer.len()..];
                    skip_until = None;
                }
                None => break,
            }
            continue;
        }
        let mut chars = rest.char_indices();
        let Some((i, c)) = chars.next() else { break };
        match c {
            '<' => {
                let lower = rest.to_ascii_lowercase();
                if lower.starts_with("<script") {
                    skip_until = Some("</script>");
                } else if lower.starts_with("<style") {
                    skip_until = Some("</style>");
                } else {
                    in_tag = true;
                }
                rest = &rest[i + 1..];
            }
            '>' => {
                in_tag = false;
                rest = &rest[i + 1..];
            }
            _ => {
                if !in_tag {
                    out.push(c);
                }
                rest = &rest[i + c.len_utf8()..];
            }
        }
    }

    // Collapse runs of blank lines left by removed markup.
    let mut collapsed = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        collapsed.push_str(line.trim_end());
        collapsed.push('\n');
    }
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        let html = "<html><head><script>var x=1;</script></head>\
                    <body><h1>Title</h1><p>Body text</p></body></html>";
        let text = strip_html(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Body text"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn collapses_blank_runs() {
        let html = "<div>a</div>\n\n\n\n<div>b</div>";
        let text = strip_html(html);
        assert!(!text.contains("\n\n\n"));
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = std::sync::Arc::new(loke_workspace::Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = crate::context::testutil::ctx(ws);
        let out = WebFetchTool
            .execute(
                &ToolCall {
                    id: "1".into(),
                    name: "web_fetch".into(),
                    args: json!({"url": "file:///etc/passwd"}),
                },
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
