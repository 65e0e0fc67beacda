// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// Side-channel events emitted by tools while they run.  The turn engine
/// drains these and translates them into outbound client events; keeping the
/// channel here avoids a dependency from tools onto the session layer.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    /// A shell command is about to start.
    CommandStart { tool_use_id: String, command: String },
    /// Incremental output chunk from a streaming command.
    CommandOutput {
        tool_use_id: String,
        chunk: String,
        is_stderr: bool,
    },
    /// The shared todo list was replaced.
    TodosUpdated(Vec<TodoItem>),
    /// Progress line from the scout pass.
    ScoutProgress { message: String },
    /// A clarification question is waiting for the user.
    UserQuestion {
        tool_use_id: String,
        question: String,
        context: Option<String>,
        options: Vec<String>,
    },
    /// A file was written or deleted; lets the IDE refresh its tree.
    FileChanged { path: String },
    /// An auto-approved command passed the deny filter.
    AutoApproved { tool_use_id: String, name: String },
}
