// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

/// Rendezvous point between a suspended `ask_user_question` call and the
/// transport delivering the matching `user_answer`.
///
/// No thread parks on the user: the asking tool awaits a oneshot receiver,
/// and the answer (or a cancel) resolves it whenever it arrives.
#[derive(Debug, Default)]
pub struct QuestionBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
}

impl QuestionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open question keyed by tool_use_id and return the
    /// receiver the tool awaits.  A second ask with the same id replaces the
    /// first; the stale receiver resolves with an error.
    pub fn ask(&self, tool_use_id: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(tool_use_id.to_string(), tx);
        rx
    }

    /// Deliver an answer.  Returns false when no question with that id is
    /// open (stale or duplicate answer — the bridge just drops it).
    pub fn answer(&self, tool_use_id: &str, answer: &str) -> bool {
        match self.pending.lock().unwrap().remove(tool_use_id) {
            Some(tx) => tx.send(answer.to_string()).is_ok(),
            None => false,
        }
    }

    /// Drop every open question; their receivers resolve with an error,
    /// which the asking tool maps to a cancelled result.
    pub fn cancel_all(&self) {
        self.pending.lock().unwrap().clear();
    }

    pub fn open_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
