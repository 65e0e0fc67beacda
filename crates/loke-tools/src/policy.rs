// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;

use loke_config::ToolsConfig;

/// Deny filter for shell commands.
///
/// `bash` is auto-approved, but commands matching any configured pattern are
/// refused before a process is ever spawned.  Patterns are simple globs:
/// `*` matches anything, `?` one character.
#[derive(Debug)]
pub struct DenyPolicy {
    patterns: Vec<(String, Regex)>,
}

impl DenyPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let patterns = cfg
            .deny_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p).map(|re| (p.clone(), re)))
            .collect();
        Self { patterns }
    }

    /// Returns the matching deny pattern, or `None` when the command may run.
    pub fn denies(&self, command: &str) -> Option<&str> {
        let trimmed = command.trim();
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(trimmed))
            .map(|(p, _)| p.as_str())
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
