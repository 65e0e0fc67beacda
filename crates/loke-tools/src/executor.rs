// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::debug;

use crate::context::ToolCtx;
use crate::registry::ToolRegistry;
use crate::tool::{ToolCall, ToolOutput};

/// Dispatches one assistant message's batch of tool calls.
///
/// Scheduling contract: the batch runs in parallel iff every call resolves
/// to a read-only tool; one mutating tool serializes the whole batch in
/// declaration order.  Results always come back in declaration order, so
/// the conversation history is identical either way.
pub struct Executor {
    registry: Arc<ToolRegistry>,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn execute_batch(&self, calls: &[ToolCall], ctx: &ToolCtx) -> Vec<ToolOutput> {
        if calls.is_empty() {
            return Vec::new();
        }
        // Unknown tools count as mutating: the safe default is serial.
        let all_read_only = calls.iter().all(|c| self.registry.is_read_only(&c.name));
        if all_read_only && calls.len() > 1 {
            self.execute_parallel(calls, ctx).await
        } else {
            self.execute_serial(calls, ctx).await
        }
    }

    async fn execute_serial(&self, calls: &[ToolCall], ctx: &ToolCtx) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            if ctx.cancel.is_cancelled() {
                outputs.push(ToolOutput::cancelled(&call.id));
                continue;
            }
            debug!(tool = %call.name, id = %call.id, "dispatching tool (serial)");
            outputs.push(self.run_one(call, ctx).await);
        }
        outputs
    }

    async fn execute_parallel(&self, calls: &[ToolCall], ctx: &ToolCtx) -> Vec<ToolOutput> {
        debug!(count = calls.len(), "dispatching read-only batch in parallel");
        let mut tasks = Vec::with_capacity(calls.len());
        for call in calls {
            let registry = Arc::clone(&self.registry);
            let ctx = ctx.clone();
            let call = call.clone();
            let streaming = self
                .registry
                .get(&call.name)
                .map_or(false, |t| t.streaming());
            tasks.push(tokio::spawn(async move {
                if streaming {
                    // Streaming tools watch the token themselves so they can
                    // wind their process down gracefully.
                    return registry.execute(&call, &ctx).await;
                }
                let cancel = ctx.cancel.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ToolOutput::cancelled(&call.id),
                    out = registry.execute(&call, &ctx) => out,
                }
            }));
        }
        // Await in declaration order; a panicked task becomes a failed
        // result rather than poisoning the batch.
        let mut outputs = Vec::with_capacity(calls.len());
        for (i, task) in tasks.into_iter().enumerate() {
            let output = match task.await {
                Ok(o) => o,
                Err(e) => ToolOutput::err(&calls[i].id, format!("tool panicked: {e}")),
            };
            outputs.push(output);
        }
        outputs
    }

    async fn run_one(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let streaming = self
            .registry
            .get(&call.name)
            .map_or(false, |t| t.streaming());
        if streaming {
            // Streaming tools watch the token themselves so they can wind
            // their process down gracefully (SIGTERM before SIGKILL).
            return self.registry.execute(call, ctx).await;
        }
        let cancel = ctx.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ToolOutput::cancelled(&call.id),
            out = self.registry.execute(call, ctx) => out,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
