// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! DIRECT-vs-PLAN selection.
//!
//! The policy is deterministic over the task text and the session's
//! recently-seen file list — the same request in the same session state
//! always picks the same mode.  `/plan` and `/direct` prefixes override.

/// How a turn will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    Direct,
    Plan,
}

/// Strip a recognized mode-override prefix, returning the forced mode and
/// the remaining task text.
pub fn strip_override(content: &str) -> (Option<TurnMode>, &str) {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("/plan") {
        return (Some(TurnMode::Plan), rest.trim_start());
    }
    if let Some(rest) = trimmed.strip_prefix("/direct") {
        return (Some(TurnMode::Direct), rest.trim_start());
    }
    (None, content)
}

/// Verbs that read as "just do this now" when they open a short request.
const DIRECT_VERBS: &[&str] = &[
    "read", "show", "list", "cat", "print", "explain", "describe", "what", "where", "why", "how",
    "run", "check", "find", "search", "grep", "look",
];

/// Verbs that announce construction work worth planning.
const BUILD_VERBS: &[&str] = &[
    "implement", "build", "create", "add", "append", "refactor", "rewrite", "migrate",
    "redesign", "introduce", "extract", "overhaul", "port", "fix", "update", "change",
];

pub fn select(content: &str, recent_files: &[String]) -> TurnMode {
    let (forced, rest) = strip_override(content);
    if let Some(mode) = forced {
        return mode;
    }
    let text = rest.trim().to_lowercase();
    let words: Vec<&str> = text.split_whitespace().collect();
    let first = words.first().copied().unwrap_or("");

    // A short request opening with a read/inspect verb is a direct task.
    if DIRECT_VERBS.contains(&first) && words.len() <= 24 {
        return TurnMode::Direct;
    }
    // Construction verbs get a plan unless the request is tiny AND names a
    // file the agent has already been working in — then it is a follow-up
    // tweak, not a project.
    if words.iter().any(|w| BUILD_VERBS.contains(w)) {
        let mentions_recent = recent_files
            .iter()
            .any(|f| !f.is_empty() && text.contains(&f.to_lowercase()));
        if mentions_recent && words.len() <= 12 {
            return TurnMode::Direct;
        }
        return TurnMode::Plan;
    }
    // Long multi-sentence requests default to planning.
    if words.len() > 40 || text.matches(['.', ';']).count() >= 3 {
        return TurnMode::Plan;
    }
    TurnMode::Direct
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_overrides_win() {
        assert_eq!(select("/plan read a file", &[]), TurnMode::Plan);
        assert_eq!(
            select("/direct implement the entire auth system", &[]),
            TurnMode::Direct
        );
    }

    #[test]
    fn strip_override_returns_rest() {
        let (mode, rest) = strip_override("/plan do the thing");
        assert_eq!(mode, Some(TurnMode::Plan));
        assert_eq!(rest, "do the thing");
    }

    #[test]
    fn short_read_requests_are_direct() {
        assert_eq!(select("read README.md", &[]), TurnMode::Direct);
        assert_eq!(select("show me the failing test", &[]), TurnMode::Direct);
    }

    #[test]
    fn construction_verbs_plan() {
        assert_eq!(
            select("implement a rate limiter for the API", &[]),
            TurnMode::Plan
        );
        assert_eq!(select("refactor the session store", &[]), TurnMode::Plan);
    }

    #[test]
    fn small_tweak_to_recent_file_is_direct() {
        let recent = vec!["src/lib.rs".to_string()];
        assert_eq!(select("add a comment to src/lib.rs", &recent), TurnMode::Direct);
    }

    #[test]
    fn same_input_same_mode() {
        let text = "add a comment to src/lib.rs";
        let recent = vec!["src/lib.rs".to_string()];
        assert_eq!(select(text, &recent), select(text, &recent));
    }

    #[test]
    fn long_requests_plan() {
        let long = "please take a look at the data pipeline. it drops events under load. \
                    we need backpressure; also the retries are wrong. fix the whole thing.";
        assert_eq!(select(long, &[]), TurnMode::Plan);
    }
}
