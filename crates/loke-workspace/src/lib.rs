// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Path-confined workspace access with checkpoint/revert support.
//!
//! Every mutating operation is scoped to the configured root and, while a
//! checkpoint is open, records the pre-mutation bytes of each touched file
//! so any subset of a turn's changes can be rolled back byte-exactly.

mod backend;
mod checkpoint;
pub mod diff;
mod error;
mod ssh;

pub use backend::{Backend, DirEntry, ExecResult, GrepMatch, LocalBackend, ShellSpec};
pub use checkpoint::{Baseline, Checkpoint, CheckpointExport, CheckpointStore};
pub use diff::{ChangeLabel, DiffStats, FileDiff, GutterKind, GutterMark};
pub use error::WorkspaceError;
pub use ssh::{SshBackend, SshTarget};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Per-file git diff stats as reported by `git diff --numstat`.
#[derive(Debug, Clone, Serialize)]
pub struct GitDiffStat {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
}

/// Advisory per-path reader/writer locks.
///
/// Facade queries and tool reads share paths with in-flight writes; the
/// locks keep a read from observing a half-written file without serializing
/// unrelated paths against each other.
#[derive(Default)]
struct PathLocks {
    map: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl PathLocks {
    fn for_path(&self, rel: &str) -> Arc<RwLock<()>> {
        let mut map = self.map.lock().unwrap();
        map.entry(rel.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

pub struct Workspace {
    backend: Arc<dyn Backend>,
    checkpoints: Mutex<CheckpointStore>,
    locks: PathLocks,
}

impl Workspace {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            checkpoints: Mutex::new(CheckpointStore::new()),
            locks: PathLocks::default(),
        }
    }

    pub fn local(root: &Path) -> Result<Self, WorkspaceError> {
        Ok(Self::new(Arc::new(LocalBackend::new(root)?)))
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Enforce the path policy: root-relative, forward slashes, no `..`
    /// escapes.  Absolute paths that point inside the root are rewritten
    /// relative to it; any other absolute path is rejected.
    pub fn normalize(&self, path: &str) -> Result<String, WorkspaceError> {
        let mut candidate = path.trim().replace('\\', "/");
        if candidate.starts_with('/') {
            // Allow "/abs/root/sub/file" by re-rooting it.
            let root = self.root_prefix();
            match candidate.strip_prefix(&root) {
                Some(rest) => candidate = rest.trim_start_matches('/').to_string(),
                None => return Err(WorkspaceError::Scope(path.into())),
            }
        }
        let mut parts: Vec<&str> = Vec::new();
        for comp in candidate.split('/') {
            match comp {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(WorkspaceError::Scope(path.into()));
                    }
                }
                other => parts.push(other),
            }
        }
        Ok(parts.join("/"))
    }

    fn root_prefix(&self) -> String {
        let desc = self.backend.describe();
        if self.backend.is_remote() {
            // "user@host:port:/dir" → "/dir"
            desc.rsplit_once(':')
                .map(|(_, d)| d.to_string())
                .unwrap_or(desc)
        } else {
            desc
        }
    }

    // ── File operations ──────────────────────────────────────────────────────

    /// Read file bytes, optionally a `[offset, offset+limit)` byte window.
    pub async fn read(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<u8>, WorkspaceError> {
        let rel = self.normalize(path)?;
        let lock = self.locks.for_path(&rel);
        let _guard = lock.read().await;
        let bytes = self.backend.read(&rel).await?;
        let start = offset.unwrap_or(0).min(bytes.len());
        let end = limit.map_or(bytes.len(), |l| (start + l).min(bytes.len()));
        Ok(bytes[start..end].to_vec())
    }

    pub async fn read_text(&self, path: &str) -> Result<String, WorkspaceError> {
        let bytes = self.read(path, None, None).await?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    pub async fn write(&self, path: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let rel = self.normalize(path)?;
        let lock = self.locks.for_path(&rel);
        let _guard = lock.write().await;
        self.record_baseline(&rel).await?;
        self.backend.write(&rel, content).await
    }

    /// Anchored edit: replace `old` with `new` in the file's text.
    ///
    /// `old` must occur exactly once unless `replace_all` is set.  Returns
    /// the resulting diff against the file as it was before this edit.
    pub async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<FileDiff, WorkspaceError> {
        let rel = self.normalize(path)?;
        let lock = self.locks.for_path(&rel);
        let _guard = lock.write().await;
        let before = String::from_utf8_lossy(&self.backend.read(&rel).await?).to_string();
        let count = before.matches(old).count();
        if count == 0 {
            return Err(WorkspaceError::AnchorMissing);
        }
        if count > 1 && !replace_all {
            return Err(WorkspaceError::AnchorAmbiguous { count });
        }
        let after = if replace_all {
            before.replace(old, new)
        } else {
            before.replacen(old, new, 1)
        };
        self.record_baseline(&rel).await?;
        self.backend.write(&rel, after.as_bytes()).await?;
        let (text, stats) = diff::unified(&before, &after, &rel);
        Ok(FileDiff {
            path: rel,
            label: ChangeLabel::Modified,
            diff: text,
            additions: stats.additions,
            deletions: stats.deletions,
        })
    }

    pub async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let rel = self.normalize(path)?;
        let lock = self.locks.for_path(&rel);
        let _guard = lock.write().await;
        self.record_baseline(&rel).await?;
        self.backend.remove(&rel).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        let rel_from = self.normalize(from)?;
        let rel_to = self.normalize(to)?;
        self.record_baseline(&rel_from).await?;
        self.record_baseline(&rel_to).await?;
        self.backend.rename(&rel_from, &rel_to).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), WorkspaceError> {
        let rel = self.normalize(path)?;
        self.backend.mkdir(&rel).await
    }

    pub async fn exists(&self, path: &str) -> Result<bool, WorkspaceError> {
        let rel = self.normalize(path)?;
        self.backend.exists(&rel).await
    }

    pub async fn list(&self, dir: &str) -> Result<Vec<DirEntry>, WorkspaceError> {
        let rel = self.normalize(dir)?;
        self.backend.list(&rel).await
    }

    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError> {
        self.backend.glob(pattern).await
    }

    pub async fn grep(
        &self,
        pattern: &str,
        include: Option<&str>,
    ) -> Result<Vec<GrepMatch>, WorkspaceError> {
        self.backend.grep(pattern, include).await
    }

    pub async fn exec(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult, WorkspaceError> {
        self.backend.exec(command, timeout).await
    }

    // ── Git (optional — absent repos just report the error text) ─────────────

    pub async fn git_status(&self) -> Result<String, WorkspaceError> {
        let out = self
            .exec("git status --porcelain=v1 -b", Duration::from_secs(15))
            .await?;
        if out.exit_code != 0 {
            return Err(WorkspaceError::Remote(out.stderr.trim().to_string()));
        }
        Ok(out.stdout)
    }

    pub async fn git_diff(&self, path: Option<&str>) -> Result<String, WorkspaceError> {
        let cmd = match path {
            Some(p) => format!("git diff HEAD -- '{}'", self.normalize(p)?.replace('\'', "")),
            None => "git diff HEAD".to_string(),
        };
        let out = self.exec(&cmd, Duration::from_secs(30)).await?;
        if out.exit_code != 0 {
            return Err(WorkspaceError::Remote(out.stderr.trim().to_string()));
        }
        Ok(out.stdout)
    }

    pub async fn git_diff_stats(&self) -> Result<Vec<GitDiffStat>, WorkspaceError> {
        let out = self
            .exec("git diff HEAD --numstat", Duration::from_secs(30))
            .await?;
        if out.exit_code != 0 {
            return Err(WorkspaceError::Remote(out.stderr.trim().to_string()));
        }
        Ok(out
            .stdout
            .lines()
            .filter_map(|l| {
                let mut it = l.split_whitespace();
                let additions = it.next()?.parse().ok()?;
                let deletions = it.next()?.parse().ok()?;
                let path = it.next()?.to_string();
                Some(GitDiffStat {
                    path,
                    additions,
                    deletions,
                })
            })
            .collect())
    }

    // ── Checkpoints ──────────────────────────────────────────────────────────

    async fn record_baseline(&self, rel: &str) -> Result<(), WorkspaceError> {
        let needs = self.checkpoints.lock().unwrap().has_active();
        if !needs {
            return Ok(());
        }
        let pre = match self.backend.read(rel).await {
            Ok(bytes) => Some(bytes),
            Err(WorkspaceError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        self.checkpoints
            .lock()
            .unwrap()
            .record(rel, pre.as_deref());
        Ok(())
    }

    pub fn begin_turn(&self) {
        self.checkpoints.lock().unwrap().begin_turn();
    }

    pub fn open_checkpoint(&self, label: &str, step_index: Option<u32>) -> String {
        debug!(label, ?step_index, "opening checkpoint");
        self.checkpoints.lock().unwrap().open(label, step_index)
    }

    pub fn seal_checkpoint(&self) {
        self.checkpoints.lock().unwrap().seal_active();
    }

    pub fn checkpoints_snapshot(&self) -> Vec<Checkpoint> {
        self.checkpoints.lock().unwrap().list().to_vec()
    }

    pub fn export_checkpoints(&self) -> CheckpointExport {
        self.checkpoints.lock().unwrap().export()
    }

    pub fn import_checkpoints(&self, export: CheckpointExport) {
        *self.checkpoints.lock().unwrap() = CheckpointStore::import(export);
    }

    /// Cumulative diffs of the current turn: every path with a baseline whose
    /// current content differs from it.
    pub async fn pending_changes(&self) -> Result<Vec<FileDiff>, WorkspaceError> {
        let baselines = {
            let store = self.checkpoints.lock().unwrap();
            let baselines = store.cumulative_baselines();
            baselines
                .into_iter()
                .map(|(path, b)| {
                    let original = match &b {
                        Baseline::Absent => None,
                        Baseline::Blob(h) => store.blob(h),
                    };
                    (path, original)
                })
                .collect::<Vec<_>>()
        };

        let mut out = Vec::new();
        for (path, original) in baselines {
            let current = match self.backend.read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(WorkspaceError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            let original_text = original
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            let current_text = current
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            if original_text == current_text {
                continue;
            }
            let (text, stats) = diff::unified(&original_text, &current_text, &path);
            out.push(FileDiff {
                path,
                label: if original.is_none() {
                    ChangeLabel::NewFile
                } else {
                    ChangeLabel::Modified
                },
                diff: text,
                additions: stats.additions,
                deletions: stats.deletions,
            });
        }
        Ok(out)
    }

    /// Agent-scope diff for one path against its earliest baseline in the
    /// current turn.  `None` when the agent has not touched the file.
    pub async fn agent_diff(&self, path: &str) -> Result<Option<FileDiff>, WorkspaceError> {
        let rel = self.normalize(path)?;
        let mut changes = self.pending_changes().await?;
        let found = changes.drain(..).find(|d| d.path == rel);
        Ok(found)
    }

    async fn restore(
        &self,
        baselines: BTreeMap<String, Baseline>,
    ) -> Result<Vec<String>, WorkspaceError> {
        let mut restored = Vec::new();
        for (path, baseline) in baselines {
            let lock = self.locks.for_path(&path);
            let _guard = lock.write().await;
            match baseline {
                Baseline::Absent => {
                    if self.backend.exists(&path).await? {
                        self.backend.remove(&path).await?;
                    }
                }
                Baseline::Blob(hash) => {
                    let blob = self
                        .checkpoints
                        .lock()
                        .unwrap()
                        .blob(&hash)
                        .ok_or_else(|| {
                            WorkspaceError::Remote(format!("missing baseline blob {hash}"))
                        })?;
                    self.backend.write(&path, &blob).await?;
                }
            }
            restored.push(path);
        }
        Ok(restored)
    }

    /// Revert every change of the current turn (the `revert` answer).
    pub async fn revert_turn(&self) -> Result<Vec<String>, WorkspaceError> {
        let baselines = self.checkpoints.lock().unwrap().cumulative_baselines();
        let restored = self.restore(baselines).await?;
        self.checkpoints.lock().unwrap().discard_turn();
        Ok(restored)
    }

    /// Revert the named step and everything after it.  `Ok(None)` when the
    /// step has no sealed checkpoint to restore from.
    pub async fn revert_from_step(&self, step: u32) -> Result<Option<Vec<String>>, WorkspaceError> {
        {
            let store = self.checkpoints.lock().unwrap();
            if store.for_step(step).is_none() {
                return Ok(None);
            }
        }
        let baselines = self.checkpoints.lock().unwrap().baselines_from_step(step);
        let restored = self.restore(baselines).await?;
        self.checkpoints.lock().unwrap().discard_from_step(step);
        Ok(Some(restored))
    }

    /// Accept the current turn's changes and drop their baselines.
    pub fn keep_turn(&self) {
        self.checkpoints.lock().unwrap().discard_turn();
    }

    /// Restore an arbitrary (possibly pre-turn) checkpoint by id.
    pub async fn restore_checkpoint(&self, id: &str) -> Result<Vec<String>, WorkspaceError> {
        let baselines = {
            let store = self.checkpoints.lock().unwrap();
            let cp = store
                .by_id(id)
                .ok_or_else(|| WorkspaceError::Remote(format!("unknown checkpoint {id}")))?;
            cp.files.clone()
        };
        self.restore(baselines).await
    }

    pub fn clear_checkpoints(&self) {
        self.checkpoints.lock().unwrap().clear();
    }
}

/// Convert a path glob to a [`regex::Regex`].
///
/// `**` matches across directory separators, `*` within one component,
/// `?` a single character.  A pattern without a slash is treated as a
/// basename pattern and matches at any depth.
pub(crate) fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let pattern = if pattern.contains('/') {
        pattern.to_string()
    } else {
        format!("**/{pattern}")
    };
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following slash so "**/foo" also matches "foo".
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::local(dir.path()).unwrap();
        (dir, ws)
    }

    // ── Path policy ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dotdot_escape_is_scope_error() {
        let (_d, ws) = workspace().await;
        assert!(matches!(
            ws.normalize("../outside.txt"),
            Err(WorkspaceError::Scope(_))
        ));
        assert!(matches!(
            ws.normalize("a/../../outside.txt"),
            Err(WorkspaceError::Scope(_))
        ));
    }

    #[tokio::test]
    async fn internal_dotdot_is_collapsed() {
        let (_d, ws) = workspace().await;
        assert_eq!(ws.normalize("a/b/../c.txt").unwrap(), "a/c.txt");
    }

    #[tokio::test]
    async fn absolute_path_under_root_is_rerooted() {
        let (_d, ws) = workspace().await;
        let abs = format!("{}/sub/file.txt", ws.describe());
        assert_eq!(ws.normalize(&abs).unwrap(), "sub/file.txt");
    }

    #[tokio::test]
    async fn foreign_absolute_path_is_rejected() {
        let (_d, ws) = workspace().await;
        assert!(matches!(
            ws.normalize("/etc/passwd"),
            Err(WorkspaceError::Scope(_))
        ));
    }

    // ── Edit semantics ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn edit_replaces_unique_anchor() {
        let (_d, ws) = workspace().await;
        ws.write("f.txt", b"hello world\n").await.unwrap();
        let diff = ws.edit("f.txt", "world", "loke", false).await.unwrap();
        assert_eq!(ws.read_text("f.txt").await.unwrap(), "hello loke\n");
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 1);
    }

    #[tokio::test]
    async fn edit_missing_anchor_errors() {
        let (_d, ws) = workspace().await;
        ws.write("f.txt", b"abc").await.unwrap();
        assert!(matches!(
            ws.edit("f.txt", "zzz", "x", false).await,
            Err(WorkspaceError::AnchorMissing)
        ));
    }

    #[tokio::test]
    async fn ambiguous_anchor_reports_count() {
        let (_d, ws) = workspace().await;
        ws.write("f.txt", b"x x x").await.unwrap();
        match ws.edit("f.txt", "x", "y", false).await {
            Err(WorkspaceError::AnchorAmbiguous { count }) => assert_eq!(count, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_all_substitutes_every_match() {
        let (_d, ws) = workspace().await;
        ws.write("f.txt", b"x x x").await.unwrap();
        ws.edit("f.txt", "x", "y", true).await.unwrap();
        assert_eq!(ws.read_text("f.txt").await.unwrap(), "y y y");
    }

    // ── Checkpoint / revert ───────────────────────────────────────────────────

    #[tokio::test]
    async fn revert_restores_exact_bytes() {
        let (_d, ws) = workspace().await;
        ws.write("a.txt", b"original\n").await.unwrap();
        ws.begin_turn();
        ws.open_checkpoint("turn", None);
        ws.write("a.txt", b"mutated\n").await.unwrap();
        ws.write("new.txt", b"fresh\n").await.unwrap();
        ws.seal_checkpoint();

        let restored = ws.revert_turn().await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(ws.read_text("a.txt").await.unwrap(), "original\n");
        assert!(!ws.exists("new.txt").await.unwrap());
    }

    #[tokio::test]
    async fn keep_leaves_files_and_drops_baselines() {
        let (_d, ws) = workspace().await;
        ws.begin_turn();
        ws.open_checkpoint("turn", None);
        ws.write("kept.txt", b"data").await.unwrap();
        ws.seal_checkpoint();
        ws.keep_turn();
        assert!(ws.exists("kept.txt").await.unwrap());
        assert!(ws.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_changes_label_new_files() {
        let (_d, ws) = workspace().await;
        ws.write("old.txt", b"v0\n").await.unwrap();
        ws.begin_turn();
        ws.open_checkpoint("step:1", Some(1));
        ws.write("old.txt", b"v1\n").await.unwrap();
        ws.write("brand.txt", b"new\n").await.unwrap();
        ws.seal_checkpoint();

        let mut changes = ws.pending_changes().await.unwrap();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].label, ChangeLabel::NewFile); // brand.txt
        assert_eq!(changes[1].label, ChangeLabel::Modified); // old.txt
    }

    #[tokio::test]
    async fn cumulative_baseline_is_earliest() {
        let (_d, ws) = workspace().await;
        ws.write("a.txt", b"v0\n").await.unwrap();
        ws.begin_turn();
        ws.open_checkpoint("step:1", Some(1));
        ws.write("a.txt", b"v1\n").await.unwrap();
        ws.open_checkpoint("step:2", Some(2));
        ws.write("a.txt", b"v2\n").await.unwrap();
        ws.seal_checkpoint();

        ws.revert_turn().await.unwrap();
        assert_eq!(ws.read_text("a.txt").await.unwrap(), "v0\n");
    }

    #[tokio::test]
    async fn revert_from_step_keeps_earlier_steps() {
        let (_d, ws) = workspace().await;
        ws.begin_turn();
        ws.open_checkpoint("step:1", Some(1));
        ws.write("x", b"step1\n").await.unwrap();
        ws.open_checkpoint("step:2", Some(2));
        ws.write("y", b"step2\n").await.unwrap();
        ws.seal_checkpoint();

        let restored = ws.revert_from_step(2).await.unwrap().unwrap();
        assert_eq!(restored, vec!["y".to_string()]);
        assert!(ws.exists("x").await.unwrap());
        assert!(!ws.exists("y").await.unwrap());
    }

    #[tokio::test]
    async fn revert_from_unsealed_step_is_none() {
        let (_d, ws) = workspace().await;
        ws.begin_turn();
        ws.open_checkpoint("step:1", Some(1));
        ws.write("x", b"data").await.unwrap();
        // step 2 never ran, nothing sealed for it
        assert!(ws.revert_from_step(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_is_idempotent() {
        let (_d, ws) = workspace().await;
        ws.write("a.txt", b"v0\n").await.unwrap();
        ws.begin_turn();
        let id = ws.open_checkpoint("step:1", Some(1));
        ws.write("a.txt", b"v1\n").await.unwrap();
        ws.seal_checkpoint();

        ws.restore_checkpoint(&id).await.unwrap();
        ws.restore_checkpoint(&id).await.unwrap();
        assert_eq!(ws.read_text("a.txt").await.unwrap(), "v0\n");
    }

    // ── Path locks ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn path_locks_are_shared_per_path() {
        let (_d, ws) = workspace().await;
        let a1 = ws.locks.for_path("a.txt");
        let a2 = ws.locks.for_path("a.txt");
        let b = ws.locks.for_path("b.txt");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[tokio::test]
    async fn reads_wait_for_inflight_write_guard() {
        let (_d, ws) = workspace().await;
        ws.write("f.txt", b"v1").await.unwrap();
        let lock = ws.locks.for_path("f.txt");
        let guard = lock.write().await;
        let ws = Arc::new(ws);
        let reader = {
            let ws = ws.clone();
            tokio::spawn(async move { ws.read_text("f.txt").await })
        };
        // The read cannot complete while the write guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!reader.is_finished());
        drop(guard);
        assert_eq!(reader.await.unwrap().unwrap(), "v1");
    }

    // ── Glob conversion ───────────────────────────────────────────────────────

    #[test]
    fn glob_star_does_not_cross_directories() {
        let re = glob_to_regex("src/*.rs").unwrap();
        assert!(re.is_match("src/main.rs"));
        assert!(!re.is_match("src/sub/deep.rs"));
    }

    #[test]
    fn glob_doublestar_crosses_directories() {
        let re = glob_to_regex("**/*.rs").unwrap();
        assert!(re.is_match("main.rs"));
        assert!(re.is_match("src/a/b/c.rs"));
    }

    #[test]
    fn bare_basename_matches_any_depth() {
        let re = glob_to_regex("*.toml").unwrap();
        assert!(re.is_match("Cargo.toml"));
        assert!(re.is_match("crates/x/Cargo.toml"));
    }
}
