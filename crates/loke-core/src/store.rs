// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-session durable storage.
//!
//! One JSON file per session under `<state>/sessions/`, checkpoint baselines
//! inlined when they are small valid UTF-8 and offloaded to sibling blob
//! files (keyed by session id + content hash) otherwise.  Saves are atomic:
//! write to a temp file in the same directory, then rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use loke_workspace::CheckpointExport;

use crate::session::SessionState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: SessionState,
    pub checkpoints: PersistedCheckpoints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedCheckpoints {
    #[serde(default)]
    pub checkpoints: Vec<loke_workspace::Checkpoint>,
    /// hash → UTF-8 blob, stored inline.
    #[serde(default)]
    pub inline_blobs: HashMap<String, String>,
    /// hashes whose bytes live in the session's blob directory.
    #[serde(default)]
    pub external_blobs: Vec<String>,
    #[serde(default)]
    pub turn_start: usize,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    inline_limit: usize,
}

impl SessionStore {
    pub fn open(state_dir: &Path, inline_limit: usize) -> std::io::Result<Self> {
        let dir = state_dir.join("sessions");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, inline_limit })
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn blob_dir(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.blobs"))
    }

    pub fn save(&self, state: &SessionState, export: &CheckpointExport) -> std::io::Result<()> {
        let mut inline_blobs = HashMap::new();
        let mut external_blobs = Vec::new();
        for (hash, bytes) in &export.blobs {
            match std::str::from_utf8(bytes) {
                Ok(text) if bytes.len() <= self.inline_limit => {
                    inline_blobs.insert(hash.clone(), text.to_string());
                }
                _ => {
                    let dir = self.blob_dir(&state.session_id);
                    std::fs::create_dir_all(&dir)?;
                    let path = dir.join(hash);
                    if !path.exists() {
                        std::fs::write(&path, bytes)?;
                    }
                    external_blobs.push(hash.clone());
                }
            }
        }

        let persisted = PersistedSession {
            state: state.clone(),
            checkpoints: PersistedCheckpoints {
                checkpoints: export.checkpoints.clone(),
                inline_blobs,
                external_blobs,
                turn_start: export.turn_start,
            },
        };

        let json = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let final_path = self.session_path(&state.session_id);
        let tmp_path = self.dir.join(format!(".{}.tmp", state.session_id));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &final_path)?;
        debug!(session = %state.session_id, "session flushed");
        Ok(())
    }

    pub fn load(&self, id: &str) -> Option<(SessionState, CheckpointExport)> {
        let text = std::fs::read_to_string(self.session_path(id)).ok()?;
        let persisted: PersistedSession = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(session = %id, error = %e, "corrupt session file, ignoring");
                return None;
            }
        };
        let mut blobs: HashMap<String, Vec<u8>> = persisted
            .checkpoints
            .inline_blobs
            .into_iter()
            .map(|(h, s)| (h, s.into_bytes()))
            .collect();
        for hash in &persisted.checkpoints.external_blobs {
            match std::fs::read(self.blob_dir(id).join(hash)) {
                Ok(bytes) => {
                    blobs.insert(hash.clone(), bytes);
                }
                Err(e) => {
                    warn!(session = %id, hash = %hash, error = %e, "missing checkpoint blob");
                }
            }
        }
        let mut state = persisted.state;
        // A loaded session never has a live turn.
        state.agent_running = false;
        Some((
            state,
            CheckpointExport {
                checkpoints: persisted.checkpoints.checkpoints,
                blobs,
                turn_start: persisted.checkpoints.turn_start,
            },
        ))
    }

    /// Session ids present on disk, most recently modified first.
    pub fn list_ids(&self) -> Vec<String> {
        let mut entries: Vec<(std::time::SystemTime, String)> = Vec::new();
        let Ok(rd) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        for entry in rd.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                if name.starts_with('.') {
                    continue;
                }
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                entries.push((mtime, id.to_string()));
            }
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, id)| id).collect()
    }

    pub fn delete(&self, id: &str) -> std::io::Result<()> {
        let path = self.session_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let blobs = self.blob_dir(id);
        if blobs.exists() {
            std::fs::remove_dir_all(blobs)?;
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
