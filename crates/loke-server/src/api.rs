// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The external facade: snapshot queries for the IDE.
//!
//! These handlers are orthogonal to turns — they read (and in a few cases
//! write) the workspace directly, under the same scope policy the tools
//! enforce.  Nothing here touches turn state beyond read-only snapshots.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use loke_config::SshInfo;
use loke_workspace::{Backend, SshBackend, SshTarget, WorkspaceError};

use crate::state::AppState;
use crate::terminal::TERMINALS;

/// Facade error → HTTP status + JSON body.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(e: WorkspaceError) -> Self {
        let status = match &e {
            WorkspaceError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkspaceError::Scope(_) => StatusCode::FORBIDDEN,
            WorkspaceError::AnchorMissing | WorkspaceError::AnchorAmbiguous { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WorkspaceError::Io(_) | WorkspaceError::Remote(_) => StatusCode::BAD_GATEWAY,
        };
        Self(status, e.to_string())
    }
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, msg.into())
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

// ── Info ─────────────────────────────────────────────────────────────────────

pub async fn info(State(state): State<AppState>) -> ApiResult {
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "working_directory": state.workspace.describe(),
        "is_remote": state.workspace.is_remote(),
        "terminals": TERMINALS.count(),
    })))
}

// ── File tree & CRUD ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TreeNode {
    name: String,
    path: String,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<TreeNode>>,
}

const TREE_DEPTH_LIMIT: usize = 12;

async fn build_tree(
    state: &AppState,
    dir: &str,
    depth: usize,
) -> Result<Vec<TreeNode>, WorkspaceError> {
    if depth >= TREE_DEPTH_LIMIT {
        return Ok(Vec::new());
    }
    let entries = state.workspace.list(dir).await?;
    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = if dir.is_empty() {
            entry.name.clone()
        } else {
            format!("{dir}/{}", entry.name)
        };
        let children = if entry.is_dir {
            Some(Box::pin(build_tree(state, &path, depth + 1)).await?)
        } else {
            None
        };
        nodes.push(TreeNode {
            name: entry.name,
            path,
            is_dir: entry.is_dir,
            children,
        });
    }
    Ok(nodes)
}

pub async fn file_tree(State(state): State<AppState>) -> ApiResult {
    let tree = build_tree(&state, "", 0).await?;
    Ok(Json(json!({ "files": tree })))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    path: String,
}

pub async fn file_get(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult {
    let content = state.workspace.read_text(&q.path).await?;
    Ok(Json(json!({ "path": q.path, "content": content })))
}

#[derive(Debug, Deserialize)]
pub struct FilePutBody {
    path: String,
    content: String,
}

pub async fn file_put(
    State(state): State<AppState>,
    Json(body): Json<FilePutBody>,
) -> ApiResult {
    state.workspace.write(&body.path, body.content.as_bytes()).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn file_delete(
    State(state): State<AppState>,
    Json(body): Json<PathQuery>,
) -> ApiResult {
    state.workspace.delete(&body.path).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    from: String,
    to: String,
}

pub async fn file_rename(
    State(state): State<AppState>,
    Json(body): Json<RenameBody>,
) -> ApiResult {
    state.workspace.rename(&body.from, &body.to).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn file_mkdir(
    State(state): State<AppState>,
    Json(body): Json<PathQuery>,
) -> ApiResult {
    state.workspace.mkdir(&body.path).await?;
    Ok(Json(json!({ "ok": true })))
}

// ── Diffs ────────────────────────────────────────────────────────────────────

/// Agent-scope diff: the file vs its earliest checkpoint baseline in the
/// current turn.  Untouched files report `no_diff`.
pub async fn file_diff(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult {
    match state.workspace.agent_diff(&q.path).await? {
        Some(diff) => Ok(Json(serde_json::to_value(diff).unwrap_or_default())),
        None => Ok(Json(json!({ "path": q.path, "no_diff": true }))),
    }
}

pub async fn git_status(State(state): State<AppState>) -> ApiResult {
    let status = state.workspace.git_status().await?;
    Ok(Json(json!({ "status": status })))
}

pub async fn git_file_diff(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult {
    let diff = state.workspace.git_diff(Some(&q.path)).await?;
    Ok(Json(json!({ "path": q.path, "diff": diff })))
}

pub async fn git_diff_stats(State(state): State<AppState>) -> ApiResult {
    let stats = state.workspace.git_diff_stats().await?;
    Ok(Json(json!({ "files": stats })))
}

// ── Search / replace / symbols ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pattern: String,
    #[serde(default)]
    include: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult {
    let matches = state.workspace.grep(&q.pattern, q.include.as_deref()).await?;
    Ok(Json(json!({ "matches": matches })))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceBody {
    pattern: String,
    replacement: String,
    #[serde(default)]
    include: Option<String>,
}

/// Literal search & replace across matching files.  Returns per-file
/// replacement counts; files the pattern misses are untouched.
pub async fn replace(
    State(state): State<AppState>,
    Json(body): Json<ReplaceBody>,
) -> ApiResult {
    if body.pattern.is_empty() {
        return Err(bad_request("pattern must not be empty"));
    }
    let hits = state
        .workspace
        .grep(&regex::escape(&body.pattern), body.include.as_deref())
        .await?;
    let mut files: Vec<String> = hits.into_iter().map(|m| m.path).collect();
    files.dedup();

    let mut replaced = Vec::new();
    for path in files {
        let text = state.workspace.read_text(&path).await?;
        let count = text.matches(&body.pattern).count();
        if count == 0 {
            continue;
        }
        let new_text = text.replace(&body.pattern, &body.replacement);
        state.workspace.write(&path, new_text.as_bytes()).await?;
        replaced.push(json!({ "path": path, "count": count }));
    }
    Ok(Json(json!({ "replaced": replaced })))
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    symbol: String,
}

pub async fn find_symbol(
    State(state): State<AppState>,
    Query(q): Query<SymbolQuery>,
) -> ApiResult {
    let pattern = format!(
        r"(fn|struct|enum|trait|impl|type|const|static|class|def|function|interface|var|let|module)\s+{}\b",
        regex::escape(&q.symbol)
    );
    let matches = state.workspace.grep(&pattern, None).await?;
    Ok(Json(json!({ "matches": matches })))
}

// ── Projects & sessions ──────────────────────────────────────────────────────

pub async fn projects(State(state): State<AppState>) -> ApiResult {
    let projects = state.projects.lock().await;
    Ok(Json(json!({ "projects": projects.entries() })))
}

pub async fn projects_remove(
    State(state): State<AppState>,
    Json(body): Json<PathQuery>,
) -> ApiResult {
    let removed = state.projects.lock().await.remove(&body.path);
    Ok(Json(json!({ "removed": removed })))
}

pub async fn sessions(State(state): State<AppState>) -> ApiResult {
    let sessions = state.manager.list().await;
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Debug, Deserialize)]
pub struct NewSessionBody {
    #[serde(default)]
    name: Option<String>,
}

pub async fn sessions_new(
    State(state): State<AppState>,
    Json(body): Json<NewSessionBody>,
) -> ApiResult {
    let session = state.manager.create(body.name.as_deref().unwrap_or("")).await;
    let data = session.init_data().await;
    Ok(Json(json!({
        "session_id": data.session_id,
        "session_name": data.session_name,
        "working_directory": data.working_directory,
    })))
}

/// The workspace root is fixed at process start (`--dir` / `--ssh`).  This
/// endpoint records the requested path in the recent-projects registry so
/// the launcher can offer it, and tells the UI a relaunch is needed.
pub async fn set_directory(
    State(state): State<AppState>,
    Json(body): Json<PathQuery>,
) -> ApiResult {
    if body.path == state.workspace.describe() {
        return Ok(Json(json!({ "ok": true, "unchanged": true })));
    }
    let name = body
        .path
        .rsplit('/')
        .next()
        .unwrap_or(&body.path)
        .to_string();
    state.projects.lock().await.touch(&body.path, &name, None);
    Err(bad_request(
        "workspace is fixed for this process; relaunch with --dir to switch",
    ))
}

// ── SSH helpers for the launcher ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SshConnectBody {
    target: String,
    #[serde(default)]
    key_path: Option<String>,
}

/// Probe an SSH target (connectivity + remote directory) and record it in
/// the projects registry on success.
pub async fn ssh_connect(
    State(state): State<AppState>,
    Json(body): Json<SshConnectBody>,
) -> ApiResult {
    let target = SshTarget::parse(&body.target, body.key_path.clone().map(Into::into))
        .map_err(|e| bad_request(e.to_string()))?;
    let target_display = target.display();
    SshBackend::connect(target.clone()).await?;
    info!(ssh_target = %target_display, "ssh probe ok");
    state.projects.lock().await.touch(
        &target_display,
        &format!("{}@{}", target.user, target.host),
        Some(SshInfo {
            user: target.user.clone(),
            host: target.host.clone(),
            port: target.port,
            dir: target.dir.clone(),
            key_path: body.key_path,
        }),
    );
    Ok(Json(json!({ "ok": true, "target": target_display })))
}

#[derive(Debug, Deserialize)]
pub struct SshListDirQuery {
    target: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    key_path: Option<String>,
}

/// Directory listing on a remote host, for the launcher's path picker.
pub async fn ssh_list_dir(Query(q): Query<SshListDirQuery>) -> ApiResult {
    let target = SshTarget::parse(&q.target, q.key_path.map(Into::into))
        .map_err(|e| bad_request(e.to_string()))?;
    let backend = SshBackend::new(target);
    let entries = backend.list(q.path.as_deref().unwrap_or("")).await?;
    Ok(Json(json!({ "entries": entries })))
}
