// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::WorkspaceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepMatch {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// How to spawn an interactive shell inside this workspace — consumed by the
/// PTY multiplexer.
#[derive(Debug, Clone)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Local working directory, when the shell runs on this host.
    pub cwd: Option<PathBuf>,
}

/// Storage backend for a workspace root.
///
/// Paths are always root-relative, forward-slash separated, and already
/// validated by the [`Workspace`](crate::Workspace) layer; backends never
/// see `..` components or absolute paths.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Display form of the root: a local path, or `user@host:port:/dir`.
    fn describe(&self) -> String;

    fn is_remote(&self) -> bool {
        false
    }

    async fn read(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError>;
    async fn write(&self, rel: &str, data: &[u8]) -> Result<(), WorkspaceError>;
    async fn remove(&self, rel: &str) -> Result<(), WorkspaceError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError>;
    async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError>;
    async fn exists(&self, rel: &str) -> Result<bool, WorkspaceError>;
    async fn list(&self, rel: &str) -> Result<Vec<DirEntry>, WorkspaceError>;
    async fn glob(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError>;
    async fn grep(
        &self,
        pattern: &str,
        include: Option<&str>,
    ) -> Result<Vec<GrepMatch>, WorkspaceError>;

    /// Run a one-shot shell command rooted at the workspace and collect its
    /// output.  Used for git queries; the streaming bash tool builds its own
    /// process from [`Backend::shell_command`].
    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecResult, WorkspaceError>;

    /// A prepared `tokio::process::Command` that runs `script` inside the
    /// workspace (locally via `bash -c`, remotely via `ssh … bash -c`).
    /// The caller wires up stdio, timeouts and kill semantics.
    fn shell_command(&self, script: &str) -> tokio::process::Command;

    /// How to spawn an interactive login shell for the terminal PTY.
    fn shell_spec(&self) -> ShellSpec;
}

// ─── Local filesystem backend ────────────────────────────────────────────────

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// `root` must exist; it is canonicalized so the symlink-resolution scope
    /// check compares like with like.
    pub fn new(root: &Path) -> Result<Self, WorkspaceError> {
        let root = root
            .canonicalize()
            .map_err(|_| WorkspaceError::NotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(WorkspaceError::NotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a validated relative path to an absolute one, rejecting
    /// symlink escapes: the deepest existing ancestor must canonicalize to
    /// somewhere under the root.
    fn abs(&self, rel: &str) -> Result<PathBuf, WorkspaceError> {
        let abs = self.root.join(rel);
        let mut probe = abs.clone();
        while !probe.exists() {
            match probe.parent() {
                Some(p) => probe = p.to_path_buf(),
                None => return Err(WorkspaceError::Scope(abs)),
            }
        }
        let resolved = probe.canonicalize()?;
        if !resolved.starts_with(&self.root) {
            return Err(WorkspaceError::Scope(abs));
        }
        Ok(abs)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn read(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError> {
        let abs = self.abs(rel)?;
        if !abs.exists() {
            return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
        }
        Ok(tokio::fs::read(&abs).await?)
    }

    async fn write(&self, rel: &str, data: &[u8]) -> Result<(), WorkspaceError> {
        let abs = self.abs(rel)?;
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(&abs, data).await?)
    }

    async fn remove(&self, rel: &str) -> Result<(), WorkspaceError> {
        let abs = self.abs(rel)?;
        if !abs.exists() {
            return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
        }
        if abs.is_dir() {
            Ok(tokio::fs::remove_dir_all(&abs).await?)
        } else {
            Ok(tokio::fs::remove_file(&abs).await?)
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        let abs_from = self.abs(from)?;
        let abs_to = self.abs(to)?;
        if !abs_from.exists() {
            return Err(WorkspaceError::NotFound(PathBuf::from(from)));
        }
        if let Some(parent) = abs_to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::rename(&abs_from, &abs_to).await?)
    }

    async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError> {
        let abs = self.abs(rel)?;
        Ok(tokio::fs::create_dir_all(&abs).await?)
    }

    async fn exists(&self, rel: &str) -> Result<bool, WorkspaceError> {
        Ok(self.abs(rel)?.exists())
    }

    async fn list(&self, rel: &str) -> Result<Vec<DirEntry>, WorkspaceError> {
        let abs = self.abs(rel)?;
        if !abs.is_dir() {
            return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
        }
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(&abs).await?;
        while let Some(entry) = rd.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then(a.name.cmp(&b.name)));
        Ok(entries)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError> {
        let re = crate::glob_to_regex(pattern)
            .ok_or_else(|| WorkspaceError::Remote(format!("bad glob pattern: {pattern}")))?;
        let root = self.root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_hidden_or_ignored(e.file_name()))
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if re.is_match(&rel) {
                    out.push(rel);
                }
            }
            out.sort();
            out
        })
        .await
        .map_err(|e| WorkspaceError::Remote(format!("glob task failed: {e}")))?;
        Ok(matches)
    }

    async fn grep(
        &self,
        pattern: &str,
        include: Option<&str>,
    ) -> Result<Vec<GrepMatch>, WorkspaceError> {
        let re = regex::Regex::new(pattern)
            .map_err(|e| WorkspaceError::Remote(format!("bad search pattern: {e}")))?;
        let include_re = include.and_then(crate::glob_to_regex);
        let root = self.root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            'files: for entry in WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_hidden_or_ignored(e.file_name()))
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if let Some(inc) = &include_re {
                    if !inc.is_match(&rel) {
                        continue;
                    }
                }
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue; // binary or unreadable
                };
                for (ln, line) in content.lines().enumerate() {
                    if re.is_match(line) {
                        out.push(GrepMatch {
                            path: rel.clone(),
                            line_number: ln + 1,
                            line: line.chars().take(400).collect(),
                        });
                        if out.len() >= 500 {
                            break 'files;
                        }
                    }
                }
            }
            out
        })
        .await
        .map_err(|e| WorkspaceError::Remote(format!("grep task failed: {e}")))?;
        Ok(matches)
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecResult, WorkspaceError> {
        debug!(cmd = %command, "workspace exec");
        let mut cmd = self.shell_command(command);
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                WorkspaceError::Remote(format!("command timed out after {}s", timeout.as_secs()))
            })??;
        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn shell_command(&self, script: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c").arg(script);
        cmd.current_dir(&self.root);
        cmd
    }

    fn shell_spec(&self) -> ShellSpec {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "bash".into());
        ShellSpec {
            program: shell,
            args: vec!["-l".into()],
            cwd: Some(self.root.clone()),
        }
    }
}

fn is_hidden_or_ignored(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    matches!(name.as_ref(), ".git" | "node_modules" | "target" | ".venv")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let be = LocalBackend::new(dir.path()).unwrap();
        (dir, be)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, be) = backend().await;
        be.write("a/b.txt", b"hello").await.unwrap();
        assert_eq!(be.read("a/b.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (_dir, be) = backend().await;
        let err = be.read("ghost.txt").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn symlink_escape_is_scope_error() {
        let (_dir, be) = backend().await;
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink("/etc", be.root().join("sneaky")).unwrap();
            let err = be.read("sneaky/passwd").await.unwrap_err();
            assert!(matches!(err, WorkspaceError::Scope(_)));
        }
    }

    #[tokio::test]
    async fn list_sorts_dirs_first() {
        let (_dir, be) = backend().await;
        be.write("z.txt", b"z").await.unwrap();
        be.mkdir("adir").await.unwrap();
        let entries = be.list("").await.unwrap();
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].name, "adir");
    }

    #[tokio::test]
    async fn glob_matches_nested_files() {
        let (_dir, be) = backend().await;
        be.write("src/main.rs", b"fn main() {}").await.unwrap();
        be.write("README.md", b"# hi").await.unwrap();
        let hits = be.glob("**/*.rs").await.unwrap();
        assert_eq!(hits, vec!["src/main.rs"]);
    }

    #[tokio::test]
    async fn grep_reports_line_numbers() {
        let (_dir, be) = backend().await;
        be.write("notes.txt", b"alpha\nbeta\ngamma\n").await.unwrap();
        let hits = be.grep("beta", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_number, 2);
    }

    #[tokio::test]
    async fn grep_include_filters_files() {
        let (_dir, be) = backend().await;
        be.write("a.rs", b"needle").await.unwrap();
        be.write("a.md", b"needle").await.unwrap();
        let hits = be.grep("needle", Some("*.rs")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.rs");
    }

    #[tokio::test]
    async fn exec_runs_in_root() {
        let (_dir, be) = backend().await;
        be.write("marker", b"x").await.unwrap();
        let out = be.exec("ls", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("marker"));
    }

    #[tokio::test]
    async fn rename_moves_file() {
        let (_dir, be) = backend().await;
        be.write("old.txt", b"data").await.unwrap();
        be.rename("old.txt", "sub/new.txt").await.unwrap();
        assert!(!be.exists("old.txt").await.unwrap());
        assert_eq!(be.read("sub/new.txt").await.unwrap(), b"data");
    }
}
