// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolCtx;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Name the turn engine intercepts during PLAN.
pub const PLAN_TOOL_NAME: &str = "propose_plan";

/// Schema carrier for the plan proposal.
///
/// The turn engine intercepts calls to this tool before dispatch: it stores
/// the pending plan, emits the `plan` event, and suspends for the user's
/// build/replan/reject decision.  Executing it directly only happens if the
/// model calls it outside PLAN, where the polite answer is a redirect.
pub struct ProposePlanTool;

#[async_trait]
impl Tool for ProposePlanTool {
    fn name(&self) -> &str {
        PLAN_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Propose an ordered implementation plan for the user to review. Each \
         step should be one self-contained, verifiable unit of work. Call \
         this exactly once, after you have explored enough to be concrete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered plan steps, one short imperative sentence each"
                },
                "plan_text": {
                    "type": "string",
                    "description": "Longer prose rationale shown alongside the steps (optional)"
                },
                "plan_file": {
                    "type": "string",
                    "description": "Workspace path of a plan document you wrote (optional)"
                }
            },
            "required": ["steps"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolCtx) -> ToolOutput {
        ToolOutput::ok(
            &call.id,
            "Plan recorded. Wait for the user to approve it before building.",
        )
    }
}
