// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Recent-projects registry — the small JSON list behind `/api/projects`.
//!
//! One entry per workspace the user has opened, most recently used first.
//! SSH workspaces carry enough connection info to reopen them (never the
//! key material itself, only its path).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshInfo {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_ssh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_info: Option<SshInfo>,
}

/// Registry file wrapper.  Load-modify-save; the file is small enough that
/// rewriting it wholesale on every touch is fine.
#[derive(Debug)]
pub struct ProjectRegistry {
    path: PathBuf,
    entries: Vec<ProjectEntry>,
}

impl ProjectRegistry {
    pub fn open(state_dir: &Path) -> Self {
        let path = state_dir.join("projects.json");
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn entries(&self) -> &[ProjectEntry] {
        &self.entries
    }

    /// Record a project as just-used.  Deduplicates by path and moves the
    /// entry to the front.
    pub fn touch(&mut self, path: &str, name: &str, ssh_info: Option<SshInfo>) {
        self.entries.retain(|e| e.path != path);
        self.entries.insert(
            0,
            ProjectEntry {
                path: path.to_string(),
                name: name.to_string(),
                updated_at: Utc::now(),
                is_ssh: ssh_info.is_some(),
                ssh_info,
            },
        );
        self.save();
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path != path);
        let removed = self.entries.len() != before;
        if removed {
            self.save();
        }
        removed
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(&self.entries) {
            let _ = std::fs::write(&self.path, json);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
