// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;

use loke_workspace::Backend as _;

use crate::context::ToolCtx;
use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Built-in tool that runs a shell command with live output streaming.
///
/// Every stdout/stderr chunk is forwarded as a `CommandOutput` event while
/// the command runs; the final tool result carries the merged output capped
/// to a rolling head+tail window, the exit code, and the duration.
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout + stderr.\n\
         Output streams live to the user; the result is capped to a rolling \
         window, so pipe noisy commands through `tail -200` or filter with \
         grep when only part of the output matters.\n\
         Prefer non-interactive commands; there is no TTY.\n\
         Do NOT use bash for file operations:\n\
         - Read files  → read_file   (not cat / head / tail)\n\
         - Search text → search      (not grep / rg)\n\
         - Find files  → glob        (not find / ls -R)\n\
         - Edit files  → edit_file   (not sed / awk / patch)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash one-liner to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    fn streaming(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolOutput {
        let Some(command) = call.args.get("command").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'command' parameter");
        };
        if let Some(pattern) = ctx.deny.denies(command) {
            return ToolOutput::err(
                &call.id,
                format!("command refused by deny rule '{pattern}'"),
            );
        }
        let timeout = Duration::from_secs(
            call.args
                .get("timeout_secs")
                .and_then(|v| v.as_u64())
                .unwrap_or(ctx.config.command_timeout_secs),
        );

        ctx.emit(ToolEvent::AutoApproved {
            tool_use_id: call.id.clone(),
            name: "bash".into(),
        })
        .await;
        ctx.emit(ToolEvent::CommandStart {
            tool_use_id: call.id.clone(),
            command: command.to_string(),
        })
        .await;
        debug!(cmd = %command, "bash tool");

        let mut cmd = ctx.workspace.backend().shell_command(command);
        // Isolate the subprocess from any controlling terminal: stdin from
        // /dev/null defeats isatty(0) checks, setsid() detaches the child so
        // it cannot open /dev/tty behind our backs, and kill_on_drop ensures
        // an abandoned future cannot leak a running process.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawn error: {e}")),
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<(bool, String)>(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, false, chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, true, chunk_tx);
        }

        let mut window = RollingWindow::new(ctx.config.output_window_bytes);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let cancel = ctx.cancel.clone();

        let mut timed_out = false;
        let mut cancelled = false;
        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => {
                    match chunk {
                        Some((is_stderr, text)) => {
                            ctx.emit(ToolEvent::CommandOutput {
                                tool_use_id: call.id.clone(),
                                chunk: text.clone(),
                                is_stderr,
                            }).await;
                            window.push(is_stderr, &text);
                        }
                        // Both pipes closed; the process is done or dying.
                        None => break,
                    }
                }
                _ = cancel.cancelled() => {
                    cancelled = true;
                    terminate(&mut child, ctx.config.kill_grace_secs).await;
                    break;
                }
                _ = &mut deadline => {
                    timed_out = true;
                    terminate(&mut child, ctx.config.kill_grace_secs).await;
                    break;
                }
            }
        }
        // Drain whatever the readers flushed before the pipes closed.
        while let Ok((is_stderr, text)) = chunk_rx.try_recv() {
            window.push(is_stderr, &text);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        if cancelled {
            return ToolOutput::cancelled(&call.id);
        }
        if timed_out {
            return ToolOutput::err(
                &call.id,
                format!("timeout after {}s\n{}", timeout.as_secs(), window.render()),
            )
            .with_duration(duration_ms);
        }

        let status = match child.wait().await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("wait error: {e}")),
        };
        let code = status.code().unwrap_or(-1);
        let mut content = window.render();
        if content.is_empty() {
            content = format!("[exit {code}]");
        } else if code != 0 {
            content = format!("[exit {code}]\n{content}");
        }

        // Exit code 1 is the Unix convention for "no matches" (grep/rg) and
        // "condition false" (test); flagging it as an error teaches the
        // model the command itself broke, which it did not.
        if code == 0 || code == 1 {
            ToolOutput::ok(&call.id, content).with_exit(code, duration_ms)
        } else {
            ToolOutput::err(&call.id, content).with_exit(code, duration_ms)
        }
    }
}

impl ToolOutput {
    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

fn spawn_reader(
    mut reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    is_stderr: bool,
    tx: mpsc::Sender<(bool, String)>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).to_string();
                    if tx.send((is_stderr, text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// SIGTERM first so the process can clean up, SIGKILL after the grace
/// period if it is still around.
async fn terminate(child: &mut tokio::process::Child, grace_secs: u64) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        let grace = Duration::from_secs(grace_secs.max(1));
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

/// Bounded merged-output buffer: when the total exceeds the cap, the first
/// half is frozen and the last half rolls, so both the command preamble and
/// the final errors survive arbitrarily long runs.
struct RollingWindow {
    cap: usize,
    head: String,
    tail: std::collections::VecDeque<u8>,
    dropped: usize,
}

impl RollingWindow {
    fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1024),
            head: String::new(),
            tail: std::collections::VecDeque::new(),
            dropped: 0,
        }
    }

    fn push(&mut self, is_stderr: bool, text: &str) {
        let tagged = if is_stderr {
            // Tag stderr lines so the merged transcript stays attributable.
            let mut s = String::with_capacity(text.len());
            for line in text.split_inclusive('\n') {
                if line.trim().is_empty() {
                    s.push_str(line);
                } else {
                    s.push_str("[stderr] ");
                    s.push_str(line);
                }
            }
            s
        } else {
            text.to_string()
        };

        let head_cap = self.cap / 2;
        if self.head.len() < head_cap {
            let mut take = (head_cap - self.head.len()).min(tagged.len());
            while take > 0 && !tagged.is_char_boundary(take) {
                take -= 1;
            }
            self.head.push_str(&tagged[..take]);
            self.push_tail(&tagged.as_bytes()[take..]);
        } else {
            self.push_tail(tagged.as_bytes());
        }
    }

    fn push_tail(&mut self, bytes: &[u8]) {
        let tail_cap = self.cap / 2;
        self.tail.extend(bytes.iter().copied());
        while self.tail.len() > tail_cap {
            self.tail.pop_front();
            self.dropped += 1;
        }
    }

    fn render(&self) -> String {
        let tail: Vec<u8> = self.tail.iter().copied().collect();
        let tail = String::from_utf8_lossy(&tail);
        if self.dropped > 0 {
            format!(
                "{}\n...[{} bytes omitted]...\n{}",
                self.head.trim_end(),
                self.dropped,
                tail
            )
        } else {
            format!("{}{tail}", self.head)
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil;
    use loke_workspace::Workspace;
    use std::sync::Arc;

    async fn setup() -> (ToolCtx, mpsc::Receiver<ToolEvent>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::local(dir.path()).unwrap());
        let (ctx, rx) = testutil::ctx(ws);
        (ctx, rx, dir)
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "b1".into(),
            name: "bash".into(),
            args,
        }
    }

    #[tokio::test]
    async fn echo_succeeds_with_exit_zero() {
        let (ctx, _rx, _dir) = setup().await;
        let out = BashTool
            .execute(&call(json!({"command": "echo hello"})), &ctx)
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hello"));
        assert_eq!(out.exit_code, Some(0));
        assert!(out.duration_ms.is_some());
    }

    #[tokio::test]
    async fn streams_command_output_events() {
        let (ctx, mut rx, _dir) = setup().await;
        BashTool
            .execute(&call(json!({"command": "echo chunk1 && echo chunk2"})), &ctx)
            .await;
        let mut streamed = String::new();
        while let Ok(ev) = rx.try_recv() {
            if let ToolEvent::CommandOutput { chunk, .. } = ev {
                streamed.push_str(&chunk);
            }
        }
        assert!(streamed.contains("chunk1"));
        assert!(streamed.contains("chunk2"));
    }

    #[tokio::test]
    async fn emits_command_start_before_output() {
        let (ctx, mut rx, _dir) = setup().await;
        BashTool.execute(&call(json!({"command": "true"})), &ctx).await;
        // auto_approved, then command_start
        assert!(matches!(rx.try_recv().unwrap(), ToolEvent::AutoApproved { .. }));
        assert!(matches!(rx.try_recv().unwrap(), ToolEvent::CommandStart { .. }));
    }

    #[tokio::test]
    async fn stderr_is_tagged() {
        let (ctx, _rx, _dir) = setup().await;
        let out = BashTool
            .execute(&call(json!({"command": "echo oops >&2"})), &ctx)
            .await;
        assert!(out.content.contains("[stderr] oops"));
    }

    #[tokio::test]
    async fn exit_1_is_not_an_error() {
        let (ctx, _rx, _dir) = setup().await;
        let out = BashTool.execute(&call(json!({"command": "exit 1"})), &ctx).await;
        assert!(!out.is_error);
        assert_eq!(out.exit_code, Some(1));
    }

    #[tokio::test]
    async fn exit_2_is_an_error() {
        let (ctx, _rx, _dir) = setup().await;
        let out = BashTool.execute(&call(json!({"command": "exit 2"})), &ctx).await;
        assert!(out.is_error);
        assert!(out.content.contains("[exit 2]"));
    }

    #[tokio::test]
    async fn denied_command_never_spawns() {
        let (ctx, mut rx, _dir) = setup().await;
        let out = BashTool
            .execute(&call(json!({"command": "rm -rf /*"})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("deny rule"));
        assert!(rx.try_recv().is_err(), "no events for denied commands");
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let (ctx, _rx, _dir) = setup().await;
        let out = BashTool
            .execute(&call(json!({"command": "sleep 30", "timeout_secs": 1})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("timeout after 1s"));
    }

    #[tokio::test]
    async fn cancel_mid_run_returns_cancelled() {
        let (ctx, _rx, _dir) = setup().await;
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let out = BashTool
            .execute(&call(json!({"command": "sleep 30"})), &ctx)
            .await;
        assert!(out.is_error);
        assert_eq!(out.content, "cancelled");
    }

    #[test]
    fn rolling_window_keeps_head_and_tail() {
        let mut w = RollingWindow::new(2048);
        w.push(false, "START\n");
        for i in 0..2000 {
            w.push(false, &format!("middle line {i}\n"));
        }
        w.push(false, "FINAL ERROR\n");
        let rendered = w.render();
        assert!(rendered.contains("START"));
        assert!(rendered.contains("FINAL ERROR"));
        assert!(rendered.contains("omitted"));
    }

    #[test]
    fn rolling_window_small_output_is_verbatim() {
        let mut w = RollingWindow::new(2048);
        w.push(false, "just this\n");
        assert_eq!(w.render(), "just this\n");
    }
}
