// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SSH workspace backend.
//!
//! Drives the system `ssh` binary rather than linking an SSH library: every
//! operation becomes a short remote command (`cat`, `tee`, `find`, `grep`),
//! and the interactive terminal reuses the same transport with `-t`.
//! BatchMode keeps ssh from ever prompting; authentication must come from an
//! agent or the `-i` identity file.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{Backend, DirEntry, ExecResult, GrepMatch, ShellSpec};
use crate::error::WorkspaceError;

/// Parsed `user@host[:port]:/dir` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub dir: String,
    pub key_path: Option<PathBuf>,
}

impl SshTarget {
    /// Parse the CLI form `user@host[:port]:/dir`.
    ///
    /// The directory part is required and must be absolute — a remote
    /// workspace rooted at "wherever ssh happens to land" would make the
    /// scope policy meaningless.
    pub fn parse(spec: &str, key_path: Option<PathBuf>) -> Result<Self, WorkspaceError> {
        let bad = || WorkspaceError::Remote(format!("bad ssh target '{spec}', expected user@host[:port]:/dir"));
        let (user, rest) = spec.split_once('@').ok_or_else(bad)?;
        // The directory starts at the first ":/": everything before is
        // host[:port].
        let dir_start = rest.find(":/").ok_or_else(bad)?;
        let (host_part, dir) = (&rest[..dir_start], &rest[dir_start + 1..]);
        let (host, port) = match host_part.split_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>()
                    .map_err(|_| WorkspaceError::Remote(format!("bad ssh port in '{spec}'")))?,
            ),
            None => (host_part, 22),
        };
        if user.is_empty() || host.is_empty() || !dir.starts_with('/') {
            return Err(bad());
        }
        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
            dir: dir.to_string(),
            key_path,
        })
    }

    pub fn display(&self) -> String {
        format!("{}@{}:{}:{}", self.user, self.host, self.port, self.dir)
    }
}

pub struct SshBackend {
    target: SshTarget,
}

impl SshBackend {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    /// Verify the connection and the remote directory before first use.
    pub async fn connect(target: SshTarget) -> Result<Self, WorkspaceError> {
        let be = Self::new(target);
        let probe = be
            .exec_raw(
                &format!("test -d {} && echo ok", shell_quote(&be.target.dir)),
                Duration::from_secs(15),
            )
            .await?;
        if probe.exit_code != 0 || !probe.stdout.contains("ok") {
            return Err(WorkspaceError::Remote(format!(
                "remote directory {} is not accessible: {}",
                be.target.dir,
                probe.stderr.trim()
            )));
        }
        Ok(be)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "ConnectTimeout=10".into(),
            "-p".into(),
            self.target.port.to_string(),
        ];
        if let Some(key) = &self.target.key_path {
            args.push("-i".into());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.target.user, self.target.host));
        args
    }

    /// Remote path for a validated relative path.
    fn remote(&self, rel: &str) -> String {
        if rel.is_empty() {
            self.target.dir.clone()
        } else {
            format!("{}/{}", self.target.dir.trim_end_matches('/'), rel)
        }
    }

    /// Run a command on the remote host (not rooted in the workspace dir).
    async fn exec_raw(&self, command: &str, timeout: Duration) -> Result<ExecResult, WorkspaceError> {
        debug!(host = %self.target.host, cmd = %command, "ssh exec");
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(self.base_args());
        cmd.arg(command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| WorkspaceError::Remote(format!("ssh timed out after {}s", timeout.as_secs())))?
            .map_err(|e| WorkspaceError::Remote(format!("ssh spawn failed: {e}")))?;
        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn exec_checked(&self, command: &str) -> Result<ExecResult, WorkspaceError> {
        let out = self.exec_raw(command, Duration::from_secs(30)).await?;
        if out.exit_code != 0 {
            return Err(WorkspaceError::Remote(format!(
                "remote command failed [{}]: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out)
    }
}

/// Single-quote a string for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
impl Backend for SshBackend {
    fn describe(&self) -> String {
        self.target.display()
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn read(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.remote(rel);
        let out = self
            .exec_raw(&format!("cat {}", shell_quote(&path)), Duration::from_secs(30))
            .await?;
        if out.exit_code != 0 {
            if out.stderr.contains("No such file") {
                return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
            }
            return Err(WorkspaceError::Remote(out.stderr.trim().to_string()));
        }
        Ok(out.stdout.into_bytes())
    }

    async fn write(&self, rel: &str, data: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.remote(rel);
        let parent = match path.rsplit_once('/') {
            Some((p, _)) if !p.is_empty() => p.to_string(),
            _ => self.target.dir.clone(),
        };
        let script = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&parent),
            shell_quote(&path)
        );
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(self.base_args());
        cmd.arg(script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| WorkspaceError::Remote(format!("ssh spawn failed: {e}")))?;
        {
            use tokio::io::AsyncWriteExt;
            let mut stdin = child.stdin.take().expect("stdin piped");
            stdin
                .write_all(data)
                .await
                .map_err(|e| WorkspaceError::Remote(format!("ssh write failed: {e}")))?;
        }
        let output = tokio::time::timeout(Duration::from_secs(60), child.wait_with_output())
            .await
            .map_err(|_| WorkspaceError::Remote("ssh write timed out".into()))?
            .map_err(|e| WorkspaceError::Remote(format!("ssh write failed: {e}")))?;
        if !output.status.success() {
            return Err(WorkspaceError::Remote(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn remove(&self, rel: &str) -> Result<(), WorkspaceError> {
        let path = self.remote(rel);
        let probe = self
            .exec_raw(&format!("test -e {}", shell_quote(&path)), Duration::from_secs(15))
            .await?;
        if probe.exit_code != 0 {
            return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
        }
        self.exec_checked(&format!("rm -rf {}", shell_quote(&path)))
            .await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        let from_p = self.remote(from);
        let to_p = self.remote(to);
        let parent = to_p.rsplit_once('/').map(|(p, _)| p.to_string());
        let mut script = String::new();
        if let Some(p) = parent {
            script.push_str(&format!("mkdir -p {} && ", shell_quote(&p)));
        }
        script.push_str(&format!("mv {} {}", shell_quote(&from_p), shell_quote(&to_p)));
        self.exec_checked(&script).await?;
        Ok(())
    }

    async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError> {
        self.exec_checked(&format!("mkdir -p {}", shell_quote(&self.remote(rel))))
            .await?;
        Ok(())
    }

    async fn exists(&self, rel: &str) -> Result<bool, WorkspaceError> {
        let out = self
            .exec_raw(
                &format!("test -e {}", shell_quote(&self.remote(rel))),
                Duration::from_secs(15),
            )
            .await?;
        Ok(out.exit_code == 0)
    }

    async fn list(&self, rel: &str) -> Result<Vec<DirEntry>, WorkspaceError> {
        // -A: include dotfiles; -p marks directories with a trailing slash.
        let out = self
            .exec_raw(
                &format!("ls -Ap {} 2>/dev/null", shell_quote(&self.remote(rel))),
                Duration::from_secs(30),
            )
            .await?;
        if out.exit_code != 0 {
            return Err(WorkspaceError::NotFound(PathBuf::from(rel)));
        }
        let mut entries: Vec<DirEntry> = out
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| {
                let is_dir = l.ends_with('/');
                DirEntry {
                    name: l.trim_end_matches('/').to_string(),
                    is_dir,
                    size: 0,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then(a.name.cmp(&b.name)));
        Ok(entries)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, WorkspaceError> {
        // find -path uses the same * / ? metacharacters as our local globs;
        // ** reduces to * under -path semantics.
        let find_pat = format!("./{}", pattern.replace("**/", "*").replace("**", "*"));
        let out = self
            .exec_checked(&format!(
                "cd {} && find . -type f -path {} | head -500",
                shell_quote(&self.target.dir),
                shell_quote(&find_pat)
            ))
            .await?;
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim_start_matches("./").to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn grep(
        &self,
        pattern: &str,
        include: Option<&str>,
    ) -> Result<Vec<GrepMatch>, WorkspaceError> {
        let include_arg = include
            .map(|g| format!("--include={}", shell_quote(g)))
            .unwrap_or_default();
        let out = self
            .exec_raw(
                &format!(
                    "cd {} && grep -rn --binary-files=without-match {} -E {} . | head -500",
                    shell_quote(&self.target.dir),
                    include_arg,
                    shell_quote(pattern)
                ),
                Duration::from_secs(60),
            )
            .await?;
        // grep exits 1 on no matches; that is an empty result, not an error.
        if out.exit_code > 1 {
            return Err(WorkspaceError::Remote(out.stderr.trim().to_string()));
        }
        Ok(out
            .stdout
            .lines()
            .filter_map(|l| {
                let (path, rest) = l.split_once(':')?;
                let (ln, line) = rest.split_once(':')?;
                Some(GrepMatch {
                    path: path.trim_start_matches("./").to_string(),
                    line_number: ln.parse().ok()?,
                    line: line.chars().take(400).collect(),
                })
            })
            .collect())
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecResult, WorkspaceError> {
        self.exec_raw(
            &format!("cd {} && {}", shell_quote(&self.target.dir), command),
            timeout,
        )
        .await
    }

    fn shell_command(&self, script: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(self.base_args());
        cmd.arg(format!(
            "cd {} && {}",
            shell_quote(&self.target.dir),
            script
        ));
        cmd
    }

    fn shell_spec(&self) -> ShellSpec {
        let mut args = vec!["-t".to_string()];
        args.extend(self.base_args());
        args.push(format!("cd {} && exec $SHELL -l", shell_quote(&self.target.dir)));
        ShellSpec {
            program: "ssh".into(),
            args,
            cwd: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
