// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! OpenAI-compatible chat-completions driver.
//!
//! Speaks the `/chat/completions` SSE wire format, which is also what local
//! gateways (llama.cpp server, LiteLLM, OpenRouter) expose.  Reasoning
//! models that put their chain of thought in `reasoning_content` are mapped
//! to the `Thinking` content kind.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{EventStream, ModelProvider};
use crate::types::{ContentKind, Message, MessageContent, ModelRequest, Role, StreamEvent};

pub struct OpenAiCompatProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    context_window: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: String,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        context_window: Option<u32>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url,
            max_tokens,
            temperature,
            context_window,
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, req: &ModelRequest) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(json!({"role": "system", "content": req.system}));
        }
        for m in &req.messages {
            messages.push(wire_message(m));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if let Some(mt) = req.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = req.temperature.or(self.temperature) {
            body["temperature"] = json!(t);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

fn wire_message(m: &Message) -> Value {
    match (&m.role, &m.content) {
        (Role::Assistant, MessageContent::ToolCall { tool_call_id, name, arguments }) => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": tool_call_id,
                "type": "function",
                "function": {"name": name, "arguments": arguments},
            }],
        }),
        (_, MessageContent::ToolResult { tool_call_id, content }) => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
        (role, MessageContent::Text(text)) => {
            let role = match role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            json!({"role": role, "content": text})
        }
        // A ToolCall on a non-assistant role never leaves the turn engine.
        (_, MessageContent::ToolCall { .. }) => json!({"role": "assistant", "content": ""}),
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> u32 {
        self.context_window.unwrap_or(200_000)
    }

    async fn complete(&self, req: ModelRequest) -> anyhow::Result<EventStream> {
        let body = self.build_body(&req);
        debug!(url = %self.chat_url(), tools = req.tools.len(), "model request");

        let mut http = self.client.post(self.chat_url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let resp = http.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("model API error {status}: {text}");
        }

        Ok(Box::pin(async_sse_stream(Box::pin(resp.bytes_stream()))))
    }
}

/// Parse an SSE byte stream into [`StreamEvent`]s.
///
/// Content-kind start/end markers are synthesized here so downstream
/// consumers never have to track provider-specific block state: a delta of
/// a new kind closes the previous kind and opens the next one.
fn async_sse_stream<B, E>(
    mut bytes: impl futures::Stream<Item = Result<B, E>> + Send + Unpin + 'static,
) -> impl futures::Stream<Item = anyhow::Result<StreamEvent>> + Send
where
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_fn_stream(move |tx| async move {
        let mut buf = String::new();
        let mut open: Option<ContentKind> = None;
        let mut got_done = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    tx.send(Err(anyhow::anyhow!("stream read error: {e}"))).await;
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(chunk.as_ref()));

            // SSE frames are separated by a blank line; a frame may span
            // chunk boundaries, so keep the unterminated tail in the buffer.
            while let Some(pos) = buf.find("\n\n") {
                let frame = buf[..pos].to_string();
                buf.drain(..pos + 2);
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        got_done = true;
                        continue;
                    }
                    let value: Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue, // keep-alive or partial junk
                    };
                    for ev in chunk_events(&value, &mut open) {
                        tx.send(Ok(ev)).await;
                    }
                }
            }
        }

        if let Some(kind) = open.take() {
            tx.send(Ok(StreamEvent::ContentEnd(kind))).await;
        }
        if got_done {
            tx.send(Ok(StreamEvent::MessageEnd)).await;
        } else {
            tx.send(Err(anyhow::anyhow!(
                "model stream ended without completion marker"
            )))
            .await;
        }
    })
}

/// Translate one parsed SSE JSON chunk into zero or more stream events.
fn chunk_events(value: &Value, open: &mut Option<ContentKind>) -> Vec<StreamEvent> {
    let mut out = Vec::new();

    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        out.push(StreamEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
            cache_read_tokens: usage["prompt_tokens_details"]["cached_tokens"]
                .as_u64()
                .unwrap_or(0),
        });
    }

    let Some(delta) = value["choices"].get(0).map(|c| &c["delta"]) else {
        return out;
    };

    if let Some(t) = delta["reasoning_content"].as_str().filter(|t| !t.is_empty()) {
        transition(open, ContentKind::Thinking, &mut out);
        out.push(StreamEvent::ContentDelta(ContentKind::Thinking, t.into()));
    }
    if let Some(t) = delta["content"].as_str().filter(|t| !t.is_empty()) {
        transition(open, ContentKind::Text, &mut out);
        out.push(StreamEvent::ContentDelta(ContentKind::Text, t.into()));
    }
    if let Some(calls) = delta["tool_calls"].as_array() {
        // Tool calls close any open content block.
        if let Some(kind) = open.take() {
            out.push(StreamEvent::ContentEnd(kind));
        }
        for call in calls {
            out.push(StreamEvent::ToolUse {
                index: call["index"].as_u64().unwrap_or(0) as u32,
                id: call["id"].as_str().unwrap_or("").to_string(),
                name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                input_fragment: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }

    out
}

fn transition(open: &mut Option<ContentKind>, kind: ContentKind, out: &mut Vec<StreamEvent>) {
    if *open == Some(kind) {
        return;
    }
    if let Some(prev) = open.take() {
        out.push(StreamEvent::ContentEnd(prev));
    }
    out.push(StreamEvent::ContentStart(kind));
    *open = Some(kind);
}

// ─── Small stream plumbing ───────────────────────────────────────────────────
//
// A hand-rolled `async_fn_stream` over an mpsc pair keeps this file free of
// generator macros while still reading top-to-bottom.

struct EventTx(tokio::sync::mpsc::Sender<anyhow::Result<StreamEvent>>);

impl EventTx {
    async fn send(&self, item: anyhow::Result<StreamEvent>) {
        let _ = self.0.send(item).await;
    }
}

fn async_fn_stream<F, Fut>(f: F) -> impl futures::Stream<Item = anyhow::Result<StreamEvent>> + Send
where
    F: FnOnce(EventTx) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(f(EventTx(tx)));
    tokio_stream::wrappers::ReceiverStream::new(rx)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta_opens_and_streams() {
        let mut open = None;
        let chunk = json!({"choices": [{"delta": {"content": "hi"}}]});
        let evs = chunk_events(&chunk, &mut open);
        assert!(matches!(evs[0], StreamEvent::ContentStart(ContentKind::Text)));
        assert!(matches!(&evs[1], StreamEvent::ContentDelta(ContentKind::Text, t) if t == "hi"));
    }

    #[test]
    fn thinking_then_text_closes_thinking() {
        let mut open = None;
        chunk_events(
            &json!({"choices": [{"delta": {"reasoning_content": "hmm"}}]}),
            &mut open,
        );
        let evs = chunk_events(&json!({"choices": [{"delta": {"content": "answer"}}]}), &mut open);
        assert!(matches!(evs[0], StreamEvent::ContentEnd(ContentKind::Thinking)));
        assert!(matches!(evs[1], StreamEvent::ContentStart(ContentKind::Text)));
    }

    #[test]
    fn tool_call_fragments_carry_index() {
        let mut open = None;
        let chunk = json!({"choices": [{"delta": {"tool_calls": [
            {"index": 2, "id": "c9", "function": {"name": "bash", "arguments": "{\"cm"}}
        ]}}]});
        let evs = chunk_events(&chunk, &mut open);
        match &evs[0] {
            StreamEvent::ToolUse { index, id, name, input_fragment } => {
                assert_eq!(*index, 2);
                assert_eq!(id, "c9");
                assert_eq!(name, "bash");
                assert_eq!(input_fragment, "{\"cm");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn usage_chunk_maps_cached_tokens() {
        let mut open = None;
        let chunk = json!({"choices": [], "usage": {
            "prompt_tokens": 100, "completion_tokens": 20,
            "prompt_tokens_details": {"cached_tokens": 60}
        }});
        let evs = chunk_events(&chunk, &mut open);
        match evs[0] {
            StreamEvent::Usage { input_tokens, output_tokens, cache_read_tokens } => {
                assert_eq!(input_tokens, 100);
                assert_eq!(output_tokens, 20);
                assert_eq!(cache_read_tokens, 60);
            }
            _ => panic!("expected usage"),
        }
    }

    #[test]
    fn tool_result_message_serializes_with_call_id() {
        let v = wire_message(&Message::tool_result("c1", "output"));
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "c1");
    }
}
