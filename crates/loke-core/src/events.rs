// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The outbound event protocol.
//!
//! Every event the backend ever sends a client is a variant here; the wire
//! form is `{"type": "<snake_case name>", ...}`.  The bridge serializes
//! variants verbatim, so payload shapes in this file *are* the protocol.

use serde::{Deserialize, Serialize};

use loke_tools::events::TodoItem;
use loke_workspace::{Checkpoint, FileDiff};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitData {
    pub session_id: String,
    pub session_name: String,
    pub working_directory: String,
    pub model: String,
    pub token_stats: TokenStatsData,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenStatsData {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub context_used_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultData {
    pub tool_use_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutputData {
    pub tool_use_id: String,
    pub is_stderr: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanData {
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffData {
    pub files: Vec<FileDiff>,
    pub cumulative: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuestionData {
    pub tool_use_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_plan: Option<PlanData>,
    pub awaiting_build: bool,
    pub awaiting_keep_revert: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<FileDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub todos: Vec<TodoItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // ── Lifecycle ────────────────────────────────────────────────────────────
    Init { data: InitData },
    Done { data: TokenStatsData },
    Cancelled,
    Error { content: String },
    ResetDone,
    Resumed { data: ResumedData },
    Status { content: String },
    StreamRetry { content: String },
    StreamRecovering,
    StreamFailed { content: String },

    // ── Reasoning & text ─────────────────────────────────────────────────────
    ThinkingStart,
    Thinking { content: String },
    ThinkingEnd,
    TextStart,
    Text { content: String },
    TextEnd,

    // ── Tools ────────────────────────────────────────────────────────────────
    ToolCall { data: ToolCallData },
    ToolResult { data: ToolResultData, content: String },
    CommandStart { data: CommandOutputData, content: String },
    CommandOutput { data: CommandOutputData, content: String },
    CommandPartialFailure { data: ToolResultData, content: String },
    AutoApproved { data: ToolCallData },

    // ── Phases ───────────────────────────────────────────────────────────────
    PhaseStart { content: String },
    PhaseEnd { content: String, elapsed: String },
    ScoutStart,
    ScoutProgress { content: String },
    ScoutEnd,

    // ── Plan / build ─────────────────────────────────────────────────────────
    Plan { data: PlanData },
    UpdatedPlan { data: PlanData },
    PlanStepProgress { data: StepProgressData },
    PlanRejected,

    // ── Review ───────────────────────────────────────────────────────────────
    Diff { data: DiffData },
    NoChanges,
    Kept,
    Reverted { data: RevertedData },
    RevertedToStep { data: RevertedToStepData },
    ClearKeepRevert,

    // ── Checkpoints ──────────────────────────────────────────────────────────
    CheckpointList { data: CheckpointListData },
    CheckpointCreated { data: CheckpointIdData },
    CheckpointRestored { data: CheckpointRestoredData },
    CheckpointError { content: String },

    // ── Interactive ──────────────────────────────────────────────────────────
    UserQuestion { data: UserQuestionData },
    TodosUpdated { data: TodosData },
    SessionNameUpdate { data: SessionNameData },
    FileChanged { data: FileChangedData },
    NoPlan,

    // ── Replay ───────────────────────────────────────────────────────────────
    ReplayUser { content: String },
    ReplayText { content: String },
    ReplayThinking { content: String },
    ReplayToolCall { data: ToolCallData },
    ReplayToolResult { data: ToolResultData, content: String },
    ReplayState { data: ReplayStateData },
    ReplayDone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumedData {
    pub agent_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepProgressData {
    pub step: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertedData {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertedToStepData {
    pub step: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_checkpoint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointListData {
    pub checkpoints: Vec<CheckpointSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    pub file_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id.clone(),
            label: cp.label.clone(),
            step_index: cp.step_index,
            file_count: cp.files.len(),
            created_at: cp.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointIdData {
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRestoredData {
    pub checkpoint_id: String,
    pub count: usize,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodosData {
    pub todos: Vec<TodoItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNameData {
    pub session_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangedData {
    pub path: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
