// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly per turn phase.

/// Phase the prompt is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Direct,
    Plan,
    Build,
}

const COMMON: &str = "\
You are loke, a coding agent working inside the user's IDE on the workspace \
rooted at the directory given below. You act through tools; every file path \
is workspace-relative. Never invent file contents — read before you edit. \
Keep shell commands non-interactive.";

const DIRECT_RULES: &str = "\
Carry out the user's request directly. Gather what you need with read-only \
tools, make the necessary changes, then summarise what you did in one short \
paragraph. Stop when the request is satisfied — do not invent follow-up work.";

const PLAN_RULES: &str = "\
You are in planning mode. Explore with read-only tools until you can write a \
concrete plan, then call propose_plan exactly once with short, verifiable \
steps. Do not modify any files in this mode. If the request is trivial, a \
one-step plan is fine.";

const BUILD_RULES: &str = "\
You are executing an approved plan, one step per message. Complete only the \
step you are given, then stop and report what you changed. Do not start the \
next step on your own. If a step turns out to be impossible, say why instead \
of improvising around it.";

/// Assemble the system prompt for a phase.
///
/// `scout_summary` is the workspace survey produced by SCOUT; it rides in
/// the system prompt so planning starts grounded without an extra tool
/// round-trip.
pub fn system_prompt(phase: Phase, working_directory: &str, scout_summary: Option<&str>) -> String {
    let rules = match phase {
        Phase::Direct => DIRECT_RULES,
        Phase::Plan => PLAN_RULES,
        Phase::Build => BUILD_RULES,
    };
    let mut prompt = format!("{COMMON}\n\nWorkspace: {working_directory}\n\n{rules}");
    if let Some(summary) = scout_summary {
        prompt.push_str("\n\n# Workspace survey\n");
        prompt.push_str(summary);
    }
    prompt
}

/// The per-step instruction injected as a user message during BUILD.
pub fn step_message(step: u32, total: u32, description: &str) -> String {
    format!(
        "Step {step} of {total}: {description}\n\
         Complete this step now, then stop."
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_prompt_forbids_mutation() {
        let p = system_prompt(Phase::Plan, "/srv/app", None);
        assert!(p.contains("Do not modify any files"));
        assert!(p.contains("/srv/app"));
    }

    #[test]
    fn scout_summary_is_appended() {
        let p = system_prompt(Phase::Plan, "/srv/app", Some("## Top level\n- src/"));
        assert!(p.contains("# Workspace survey"));
        assert!(p.contains("- src/"));
    }

    #[test]
    fn build_prompt_limits_to_one_step() {
        let p = system_prompt(Phase::Build, "/x", None);
        assert!(p.contains("one step per message"));
    }

    #[test]
    fn step_message_numbers_steps() {
        let m = step_message(2, 5, "Wire up the endpoint");
        assert!(m.starts_with("Step 2 of 5:"));
        assert!(m.contains("Wire up the endpoint"));
    }
}
