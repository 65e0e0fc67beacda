// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The event bridge — one WebSocket per IDE client.
//!
//! On bind: `init`, then the full `replay_*` sequence, then `resumed`, then
//! live events.  Inbound frames are JSON [`ClientCommand`]s forwarded to the
//! session runtime.  A client that cannot drain its events falls behind on
//! the broadcast channel; the bridge degrades that to a coarse `status`
//! event and the client is expected to reconnect and replay.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use loke_core::events::{Event, ResumedData};
use loke_core::{replay, ClientCommand};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: Option<String>) {
    // Bind: explicit id, else most recent, else a fresh session.
    let session = match &session_id {
        Some(id) => match state.manager.get(id).await {
            Some(s) => s,
            None => {
                let err = Event::Error {
                    content: format!("unknown session {id}"),
                };
                send_event(&mut socket, &err).await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        },
        None => state.manager.most_recent_or_create().await,
    };
    info!(session = %session.id, "ws client connected");

    // Subscribe before replay so no live event is lost in the gap.
    let mut events = session.subscribe();

    let init = Event::Init {
        data: session.init_data().await,
    };
    send_event(&mut socket, &init).await;
    let snapshot = session.state_snapshot().await;
    for event in replay::replay_events(&snapshot) {
        send_event(&mut socket, &event).await;
    }
    send_event(
        &mut socket,
        &Event::Resumed {
            data: ResumedData {
                agent_running: snapshot.agent_running,
            },
        },
    )
    .await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(cmd) => {
                                debug!(session = %session.id, ?cmd, "client command");
                                session.handle(cmd).await;
                            }
                            Err(e) => {
                                warn!(session = %session.id, "invalid command JSON: {e}");
                                // Protocol error: explanatory frame, then close.
                                // Session state is untouched; reconnect replays.
                                let err = Event::Error {
                                    content: format!("invalid command: {e}"),
                                };
                                send_event(&mut socket, &err).await;
                                let _ = socket.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames belong on /ws/terminal
                    Some(Err(e)) => {
                        debug!(session = %session.id, "ws recv error: {e}");
                        break;
                    }
                }
            }
            result = events.recv() => {
                match result {
                    Ok(event) => send_event(&mut socket, &event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session = %session.id, "ws client lagged by {n} events");
                        let status = Event::Status {
                            content: format!(
                                "event stream lagged by {n} events; reconnect to resync"
                            ),
                        };
                        send_event(&mut socket, &status).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(session = %session.id, "ws client disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &Event) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = socket.send(Message::Text(json)).await;
    }
}
