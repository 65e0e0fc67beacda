// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Checkpoint store — pre-mutation baselines grouped by step.
//!
//! A checkpoint is opened before a step (or an entire DIRECT turn) starts
//! mutating files.  The first mutation of each path records the pre-image;
//! later mutations within the same checkpoint leave it alone, so restoring a
//! checkpoint always lands on the state the step started from.  Baseline
//! bytes are interned by content hash: consecutive steps touching the same
//! file share one blob.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The pre-mutation state of one path within a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// The file did not exist — restoring deletes it.
    Absent,
    /// The file held the blob with this content hash.
    Blob(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub label: String,
    pub step_index: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub sealed: bool,
    /// path → baseline, insertion-ordered by path for stable serialization.
    pub files: BTreeMap<String, Baseline>,
}

/// In-memory checkpoint store for one session.  Owned by the session actor;
/// never shared across sessions.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    checkpoints: Vec<Checkpoint>,
    blobs: HashMap<String, Arc<Vec<u8>>>,
    active: Option<usize>,
    /// Index of the first checkpoint belonging to the current turn.
    turn_start: usize,
}

/// Serializable snapshot of the store for session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointExport {
    pub checkpoints: Vec<Checkpoint>,
    /// hash → blob bytes for every hash referenced by `checkpoints`.
    pub blobs: HashMap<String, Vec<u8>>,
    pub turn_start: usize,
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the beginning of a turn: checkpoints opened from here on are the
    /// ones `keep` / `revert` operate on.
    pub fn begin_turn(&mut self) {
        self.turn_start = self.checkpoints.len();
        self.active = None;
    }

    /// Open a checkpoint; any previously active one is sealed first.
    pub fn open(&mut self, label: &str, step_index: Option<u32>) -> String {
        self.seal_active();
        let id = format!("cp_{}", uuid::Uuid::new_v4().simple());
        self.checkpoints.push(Checkpoint {
            id: id.clone(),
            label: label.to_string(),
            step_index,
            created_at: Utc::now(),
            sealed: false,
            files: BTreeMap::new(),
        });
        self.active = Some(self.checkpoints.len() - 1);
        id
    }

    pub fn seal_active(&mut self) {
        if let Some(i) = self.active.take() {
            self.checkpoints[i].sealed = true;
        }
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Record the pre-mutation state of `path` in the active checkpoint.
    /// First write wins; no-op without an active checkpoint.
    pub fn record(&mut self, path: &str, pre_image: Option<&[u8]>) {
        let Some(i) = self.active else { return };
        if self.checkpoints[i].files.contains_key(path) {
            return;
        }
        let baseline = match pre_image {
            None => Baseline::Absent,
            Some(bytes) => {
                let hash = hash_bytes(bytes);
                self.blobs
                    .entry(hash.clone())
                    .or_insert_with(|| Arc::new(bytes.to_vec()));
                Baseline::Blob(hash)
            }
        };
        self.checkpoints[i].files.insert(path.to_string(), baseline);
    }

    pub fn blob(&self, hash: &str) -> Option<Arc<Vec<u8>>> {
        self.blobs.get(hash).cloned()
    }

    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn by_id(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    /// Sealed checkpoint for the given step index in the current turn.
    pub fn for_step(&self, step: u32) -> Option<&Checkpoint> {
        self.checkpoints[self.turn_start..]
            .iter()
            .find(|c| c.step_index == Some(step) && c.sealed)
    }

    /// Earliest baseline per path across the current turn's checkpoints —
    /// the cumulative pre-turn state.  Checkpoint order is creation order,
    /// so the first occurrence of a path is its earliest baseline.
    pub fn cumulative_baselines(&self) -> BTreeMap<String, Baseline> {
        let mut out = BTreeMap::new();
        for cp in &self.checkpoints[self.turn_start..] {
            for (path, baseline) in &cp.files {
                out.entry(path.clone()).or_insert_with(|| baseline.clone());
            }
        }
        out
    }

    /// Earliest baselines for the named step and everything after it.
    pub fn baselines_from_step(&self, step: u32) -> BTreeMap<String, Baseline> {
        let mut out = BTreeMap::new();
        for cp in &self.checkpoints[self.turn_start..] {
            if cp.step_index.map_or(false, |s| s >= step) {
                for (path, baseline) in &cp.files {
                    out.entry(path.clone()).or_insert_with(|| baseline.clone());
                }
            }
        }
        out
    }

    /// Drop checkpoints for the named step and later ones (after a
    /// successful revert-to-step) so a subsequent full revert does not
    /// re-apply them.
    pub fn discard_from_step(&mut self, step: u32) {
        self.seal_active();
        self.checkpoints
            .retain(|c| !(c.step_index.map_or(false, |s| s >= step)));
        self.gc_blobs();
    }

    /// Drop the current turn's checkpoints (the `keep` answer).
    pub fn discard_turn(&mut self) {
        self.seal_active();
        self.checkpoints.truncate(self.turn_start);
        self.gc_blobs();
    }

    /// Clear everything (session reset).
    pub fn clear(&mut self) {
        self.checkpoints.clear();
        self.blobs.clear();
        self.active = None;
        self.turn_start = 0;
    }

    fn gc_blobs(&mut self) {
        let live: std::collections::HashSet<&String> = self
            .checkpoints
            .iter()
            .flat_map(|c| c.files.values())
            .filter_map(|b| match b {
                Baseline::Blob(h) => Some(h),
                Baseline::Absent => None,
            })
            .collect();
        self.blobs.retain(|h, _| live.contains(h));
    }

    pub fn export(&self) -> CheckpointExport {
        CheckpointExport {
            checkpoints: self.checkpoints.clone(),
            blobs: self
                .blobs
                .iter()
                .map(|(h, b)| (h.clone(), b.as_ref().clone()))
                .collect(),
            turn_start: self.turn_start,
        }
    }

    pub fn import(export: CheckpointExport) -> Self {
        Self {
            checkpoints: export.checkpoints,
            blobs: export
                .blobs
                .into_iter()
                .map(|(h, b)| (h, Arc::new(b)))
                .collect(),
            active: None,
            turn_start: export.turn_start,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_record_wins_within_checkpoint() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        store.record("a.txt", Some(b"original"));
        store.record("a.txt", Some(b"already mutated"));
        let cp = &store.list()[0];
        let Baseline::Blob(hash) = &cp.files["a.txt"] else {
            panic!("expected blob baseline");
        };
        assert_eq!(store.blob(hash).unwrap().as_slice(), b"original");
    }

    #[test]
    fn absent_baseline_for_new_files() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("turn", None);
        store.record("new.txt", None);
        assert_eq!(store.list()[0].files["new.txt"], Baseline::Absent);
    }

    #[test]
    fn identical_content_is_interned_once() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        store.record("a.txt", Some(b"same"));
        store.open("step:2", Some(2));
        store.record("a.txt", Some(b"same"));
        assert_eq!(store.export().blobs.len(), 1);
    }

    #[test]
    fn cumulative_uses_earliest_baseline() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        store.record("a.txt", Some(b"v0"));
        store.open("step:2", Some(2));
        store.record("a.txt", Some(b"v1"));
        let cum = store.cumulative_baselines();
        let Baseline::Blob(hash) = &cum["a.txt"] else {
            panic!()
        };
        assert_eq!(store.blob(hash).unwrap().as_slice(), b"v0");
    }

    #[test]
    fn baselines_from_step_excludes_earlier_steps() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        store.record("x", None);
        store.open("step:2", Some(2));
        store.record("y", None);
        store.seal_active();
        let from2 = store.baselines_from_step(2);
        assert!(from2.contains_key("y"));
        assert!(!from2.contains_key("x"));
    }

    #[test]
    fn for_step_only_finds_sealed() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        assert!(store.for_step(1).is_none());
        store.seal_active();
        assert!(store.for_step(1).is_some());
    }

    #[test]
    fn discard_turn_keeps_prior_turns() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("turn", None);
        store.record("old.txt", Some(b"keep me"));
        store.seal_active();
        store.begin_turn();
        store.open("turn", None);
        store.record("new.txt", Some(b"drop me"));
        store.discard_turn();
        assert_eq!(store.list().len(), 1);
        assert!(store.list()[0].files.contains_key("old.txt"));
    }

    #[test]
    fn gc_drops_unreferenced_blobs() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("turn", None);
        store.record("a", Some(b"bytes"));
        store.discard_turn();
        assert!(store.export().blobs.is_empty());
    }

    #[test]
    fn export_import_round_trips() {
        let mut store = CheckpointStore::new();
        store.begin_turn();
        store.open("step:1", Some(1));
        store.record("a", Some(b"data"));
        store.seal_active();
        let restored = CheckpointStore::import(store.export());
        assert_eq!(restored.list().len(), 1);
        let Baseline::Blob(hash) = &restored.list()[0].files["a"] else {
            panic!()
        };
        assert_eq!(restored.blob(hash).unwrap().as_slice(), b"data");
    }
}
