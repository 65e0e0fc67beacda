// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP + WebSocket transport for the agent backend.
//!
//! Three surfaces on one listener:
//! - `/ws`           — the event bridge (JSON commands in, events out)
//! - `/ws/terminal`  — raw PTY bytes for the integrated terminal
//! - `/api/*`        — snapshot queries the IDE uses for its file tree,
//!                     diffs, search and project management

mod api;
mod state;
mod terminal;
mod ws;

pub use state::AppState;

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/ws/terminal", get(terminal::terminal_handler))
        .route("/api/info", get(api::info))
        .route("/api/files", get(api::file_tree))
        .route("/api/file", get(api::file_get).put(api::file_put))
        .route("/api/file/delete", post(api::file_delete))
        .route("/api/file/rename", post(api::file_rename))
        .route("/api/file/mkdir", post(api::file_mkdir))
        .route("/api/file-diff", get(api::file_diff))
        .route("/api/git-status", get(api::git_status))
        .route("/api/git-file-diff", get(api::git_file_diff))
        .route("/api/git-diff-stats", get(api::git_diff_stats))
        .route("/api/search", get(api::search))
        .route("/api/replace", post(api::replace))
        .route("/api/find-symbol", get(api::find_symbol))
        .route("/api/projects", get(api::projects))
        .route("/api/projects/remove", post(api::projects_remove))
        .route("/api/sessions", get(api::sessions))
        .route("/api/sessions/new", post(api::sessions_new))
        .route("/api/set-directory", post(api::set_directory))
        .route("/api/ssh-connect", post(api::ssh_connect))
        .route("/api/ssh-list-dir", get(api::ssh_list_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown.  A taken port is a fatal startup error —
/// the caller maps it to a non-zero exit.
pub async fn serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {bind}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(%addr, "loke backend listening");
    axum::serve(listener, router(state))
        .await
        .context("server error")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use loke_config::{Config, ProjectRegistry};
    use loke_core::{SessionManager, SessionStore};
    use loke_model::ScriptedProvider;
    use loke_workspace::Workspace;

    async fn app_state() -> (tempfile::TempDir, tempfile::TempDir, AppState) {
        let ws_dir = tempfile::tempdir().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::local(ws_dir.path()).unwrap());
        let store = SessionStore::open(state_dir.path(), 32 * 1024).unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let config = Arc::new(Config::default());
        let manager = SessionManager::new(store, workspace.clone(), provider, config.clone());
        let projects = ProjectRegistry::open(state_dir.path());
        (
            ws_dir,
            state_dir,
            AppState::new(manager, workspace, config, projects),
        )
    }

    #[tokio::test]
    async fn router_builds_with_full_route_table() {
        let (_w, _s, state) = app_state().await;
        let _router = router(state);
    }

    #[tokio::test]
    async fn serve_rejects_taken_port() {
        let (_w, _s, state) = app_state().await;
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let err = serve(state, "127.0.0.1", port).await.unwrap_err();
        assert!(err.to_string().contains("cannot listen"));
    }
}
