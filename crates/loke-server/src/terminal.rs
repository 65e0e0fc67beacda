// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! PTY multiplexer for `/ws/terminal`.
//!
//! Each connection spawns one PTY rooted at the workspace (for SSH
//! workspaces the shell itself is `ssh -t …`, so the bytes still flow
//! through a local PTY).  Socket frames map directly:
//! text/binary → PTY stdin, PTY stdout → binary frames, and a JSON control
//! frame `{"resize": [rows, cols]}` resizes the window.  One
//! `{"type":"ready"}` is sent after spawn.  Multiple terminals per session
//! are fine; each handler owns its PTY exclusively.

use std::io::{Read, Write};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use loke_workspace::Backend as _;

use crate::state::AppState;

/// Registry of live terminals, keyed by a process-local id.  `/api/info`
/// reports the count; the map also gives each log line a stable id.
pub(crate) struct Terminals {
    next_id: std::sync::atomic::AtomicU64,
    live: dashmap::DashMap<u64, ()>,
}

pub(crate) static TERMINALS: std::sync::LazyLock<Terminals> =
    std::sync::LazyLock::new(|| Terminals {
        next_id: std::sync::atomic::AtomicU64::new(1),
        live: dashmap::DashMap::new(),
    });

impl Terminals {
    fn register(&self) -> u64 {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.live.insert(id, ());
        id
    }

    fn unregister(&self, id: u64) {
        self.live.remove(&id);
    }

    pub(crate) fn count(&self) -> usize {
        self.live.len()
    }
}

#[derive(Debug, Deserialize)]
struct ControlFrame {
    #[serde(default)]
    resize: Option<[u16; 2]>,
}

pub async fn terminal_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_terminal(socket, state))
}

async fn handle_terminal(mut socket: WebSocket, state: AppState) {
    let terminal_id = TERMINALS.register();
    info!(terminal = terminal_id, "terminal connected");

    let spec = state.workspace.backend().shell_spec();
    let pty_system = native_pty_system();
    let pair = match pty_system.openpty(PtySize {
        rows: 24,
        cols: 80,
        pixel_width: 0,
        pixel_height: 0,
    }) {
        Ok(p) => p,
        Err(e) => {
            warn!("openpty failed: {e}");
            let _ = socket
                .send(Message::Text(format!(
                    "{{\"type\":\"error\",\"content\":\"pty failed: {e}\"}}"
                )))
                .await;
            TERMINALS.unregister(terminal_id);
            return;
        }
    };

    let mut cmd = CommandBuilder::new(&spec.program);
    for arg in &spec.args {
        cmd.arg(arg);
    }
    if let Some(cwd) = &spec.cwd {
        cmd.cwd(cwd);
    }
    let mut child = match pair.slave.spawn_command(cmd) {
        Ok(c) => c,
        Err(e) => {
            warn!("terminal spawn failed: {e}");
            TERMINALS.unregister(terminal_id);
            return;
        }
    };
    drop(pair.slave);

    let master: Box<dyn MasterPty + Send> = pair.master;
    let mut writer = match master.take_writer() {
        Ok(w) => w,
        Err(e) => {
            warn!("pty writer unavailable: {e}");
            TERMINALS.unregister(terminal_id);
            return;
        }
    };

    // PTY output is a blocking Read; pump it through a channel from a
    // dedicated thread.
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(64);
    {
        let mut reader = match master.try_clone_reader() {
            Ok(r) => r,
            Err(e) => {
                warn!("pty reader unavailable: {e}");
                TERMINALS.unregister(terminal_id);
                return;
            }
        };
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if out_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    let _ = socket
        .send(Message::Text("{\"type\":\"ready\"}".to_string()))
        .await;

    loop {
        tokio::select! {
            chunk = out_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if socket.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    // Reader thread ended: the shell exited.
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Control frame or plain keystrokes — resize frames
                        // are JSON objects, everything else goes to stdin.
                        if let Ok(ControlFrame { resize: Some([rows, cols]) }) =
                            serde_json::from_str::<ControlFrame>(&text)
                        {
                            debug!(terminal = terminal_id, rows, cols, "resize");
                            let _ = master.resize(PtySize {
                                rows,
                                cols,
                                pixel_width: 0,
                                pixel_height: 0,
                            });
                            continue;
                        }
                        if writer.write_all(text.as_bytes()).is_err() {
                            break;
                        }
                        let _ = writer.flush();
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if writer.write_all(&bytes).is_err() {
                            break;
                        }
                        let _ = writer.flush();
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(terminal = terminal_id, "terminal ws error: {e}");
                        break;
                    }
                }
            }
        }
    }

    let _ = child.kill();
    TERMINALS.unregister(terminal_id);
    info!(terminal = terminal_id, "terminal closed");
}
