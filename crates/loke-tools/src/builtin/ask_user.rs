// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolCtx;
use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Suspends the turn until the user answers.
///
/// The tool registers the call id with the session's question broker, emits
/// a `UserQuestion` event, and awaits the oneshot.  The transport delivers
/// the matching `user_answer`, which becomes the tool result.  There is no
/// server-side timeout; a cancel resolves the wait with a failed result.
pub struct AskUserQuestionTool;

#[async_trait]
impl Tool for AskUserQuestionTool {
    fn name(&self) -> &str {
        "ask_user_question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question and wait for their answer. Use \
         when a decision genuinely needs user input (ambiguous target file, \
         destructive action, product choice). Provide short 'options' when \
         the answer space is small."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "The question to ask" },
                "context": { "type": "string", "description": "Why the answer is needed (optional)" },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Suggested answers (optional)"
                }
            },
            "required": ["question"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(question) = call.args.get("question").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'question' parameter");
        };
        let context = call
            .args
            .get("context")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let options: Vec<String> = call
            .args
            .get("options")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let rx = ctx.questions.ask(&call.id);
        ctx.emit(ToolEvent::UserQuestion {
            tool_use_id: call.id.clone(),
            question: question.to_string(),
            context,
            options,
        })
        .await;
        debug!(tool_use_id = %call.id, "question suspended, waiting for answer");

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => ToolOutput::cancelled(&call.id),
            answer = rx => match answer {
                Ok(text) => ToolOutput::ok(&call.id, text),
                // Broker dropped the sender: cancel_all or a replaced ask.
                Err(_) => ToolOutput::cancelled(&call.id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;
    use std::time::Duration;

    fn call() -> ToolCall {
        ToolCall {
            id: "T1".into(),
            name: "ask_user_question".into(),
            args: json!({"question": "Which file?", "options": ["a.py", "b.py"]}),
        }
    }

    #[tokio::test]
    async fn answer_becomes_tool_result() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, mut rx) = testutil::ctx(ws);
        let questions = ctx.questions.clone();

        let exec = tokio::spawn({
            let ctx = ctx.clone();
            async move { AskUserQuestionTool.execute(&call(), &ctx).await }
        });

        // Wait for the question to be emitted before answering.
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match ev {
            ToolEvent::UserQuestion { tool_use_id, options, .. } => {
                assert_eq!(tool_use_id, "T1");
                assert_eq!(options, vec!["a.py", "b.py"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(questions.answer("T1", "a.py"));

        let out = exec.await.unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content, "a.py");
    }

    #[tokio::test]
    async fn cancel_while_suspended_fails_with_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, _rx) = testutil::ctx(ws);
        let cancel = ctx.cancel.clone();

        let exec = tokio::spawn({
            let ctx = ctx.clone();
            async move { AskUserQuestionTool.execute(&call(), &ctx).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let out = exec.await.unwrap();
        assert!(out.is_error);
        assert_eq!(out.content, "cancelled");
    }
}
