// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loke_tools::events::TodoItem;
use loke_workspace::FileDiff;

use crate::events::{PlanData, TokenStatsData};
use crate::history::ChatMessage;

/// A plan waiting for the user's build / replan / reject decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPlan {
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_file: Option<String>,
}

impl From<&PendingPlan> for PlanData {
    fn from(p: &PendingPlan) -> Self {
        Self {
            steps: p.steps.clone(),
            plan_text: p.plan_text.clone(),
            plan_file: p.plan_file.clone(),
        }
    }
}

/// Running token totals for the session plus the last turn's context usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub context_used_percent: f32,
}

impl TokenStats {
    pub fn add_usage(&mut self, input: u64, output: u64, cache_read: u64, context_window: u32) {
        self.input_tokens += input;
        self.output_tokens += output;
        self.cache_read_tokens += cache_read;
        if context_window > 0 {
            self.context_used_percent =
                ((input + cache_read) as f32 / context_window as f32) * 100.0;
        }
    }

    pub fn as_event_data(&self) -> TokenStatsData {
        TokenStatsData {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            context_used_percent: self.context_used_percent,
        }
    }
}

/// The durable per-session state — everything in the persisted file except
/// checkpoint blobs, which ride alongside as a [`loke_workspace::CheckpointExport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub name: String,
    pub working_directory: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_plan: Option<PendingPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_diffs: Vec<FileDiff>,
    #[serde(default)]
    pub token_stats: TokenStats,
    /// Paths the agent touched recently; feeds the mode-selection heuristic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_files: Vec<String>,
    /// True while a turn is in flight.  Persisted for the data model's sake
    /// but forced false on load — a crashed process has no running turn.
    #[serde(default)]
    pub agent_running: bool,
}

impl SessionState {
    pub fn new(name: &str, working_directory: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!("sess_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            working_directory: working_directory.to_string(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            todos: Vec::new(),
            pending_plan: None,
            pending_diffs: Vec::new(),
            token_stats: TokenStats::default(),
            recent_files: Vec::new(),
            agent_running: false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn note_recent_file(&mut self, path: &str) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_string());
        self.recent_files.truncate(32);
    }

    /// Session reset: clear conversation state, keep identity.
    pub fn reset(&mut self) {
        self.history.clear();
        self.todos.clear();
        self.pending_plan = None;
        self.pending_diffs.clear();
        self.token_stats = TokenStats::default();
        self.recent_files.clear();
        self.touch();
    }

    /// Whether a new task may start right now (§3 invariants: one turn at a
    /// time, and pending diffs must be answered first).
    pub fn can_accept_task(&self) -> Option<&'static str> {
        if self.agent_running {
            return Some("a turn is already running; cancel it or wait");
        }
        if !self.pending_diffs.is_empty() {
            return Some("answer keep/revert for the pending changes first");
        }
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
