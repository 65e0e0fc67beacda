// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deterministic provider for tests.
//!
//! Each call to [`ModelProvider::complete`] pops the next scripted turn and
//! streams its events verbatim.  Running out of script is an error, which
//! doubles as a convenient way to exercise the retry path.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::provider::{EventStream, ModelProvider};
use crate::types::{ContentKind, ModelRequest, StreamEvent};

pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    context_window: u32,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            context_window: 200_000,
        }
    }

    /// Append another scripted turn after construction.  Useful for tests
    /// that continue a session across plan approval.
    pub fn push_turn(&self, events: Vec<StreamEvent>) {
        self.turns.lock().unwrap().push_back(events);
    }

    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    /// Script helper: a turn that streams `text` and stops.
    pub fn text_turn(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ContentStart(ContentKind::Text),
            StreamEvent::ContentDelta(ContentKind::Text, text.to_string()),
            StreamEvent::ContentEnd(ContentKind::Text),
            StreamEvent::Usage {
                input_tokens: 10,
                output_tokens: 5,
                cache_read_tokens: 0,
            },
            StreamEvent::MessageEnd,
        ]
    }

    /// Script helper: a turn that issues a single complete tool call.
    pub fn tool_turn(id: &str, name: &str, input: serde_json::Value) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ToolUse {
                index: 0,
                id: id.to_string(),
                name: name.to_string(),
                input_fragment: input.to_string(),
            },
            StreamEvent::Usage {
                input_tokens: 10,
                output_tokens: 5,
                cache_read_tokens: 0,
            },
            StreamEvent::MessageEnd,
        ]
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    async fn complete(&self, _req: ModelRequest) -> anyhow::Result<EventStream> {
        let next = self.turns.lock().unwrap().pop_front();
        match next {
            Some(events) => Ok(Box::pin(stream::iter(events.into_iter().map(Ok)))),
            None => anyhow::bail!("scripted provider has no turns left"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
