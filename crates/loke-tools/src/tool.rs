// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolCtx;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
    /// Exit code for process-running tools.
    pub exit_code: Option<i32>,
    /// Wall-clock duration for long-running tools, milliseconds.
    pub duration_ms: Option<u64>,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
            exit_code: None,
            duration_ms: None,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
            exit_code: None,
            duration_ms: None,
        }
    }

    /// The synthetic failure used when a cancel token fires while calls are
    /// outstanding — message structure must stay well-formed, so every
    /// unanswered call gets one of these.
    pub fn cancelled(call_id: impl Into<String>) -> Self {
        Self::err(call_id, "cancelled")
    }

    pub fn with_exit(mut self, code: i32, duration_ms: u64) -> Self {
        self.exit_code = Some(code);
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Per-tool approval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// Dispatched immediately.
    Auto,
    /// Requires an explicit user go-ahead before dispatch.
    User,
}

/// Trait every builtin (and user-supplied) tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;

    fn approval(&self) -> Approval {
        Approval::Auto
    }

    /// Read-only tools may run in parallel within a batch; a single mutating
    /// tool serializes the whole batch in declaration order.
    fn read_only(&self) -> bool;

    /// Streaming tools emit incremental output events while running.
    fn streaming(&self) -> bool {
        false
    }

    /// Execute the tool.  Errors are reported via [`ToolOutput::err`]; only
    /// infrastructure failures should panic.
    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
