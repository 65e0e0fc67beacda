// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session lifetime and command routing.
//!
//! ```text
//!   WS bridge ──► SessionRuntime::handle(ClientCommand)
//!                       │ Task            spawns run_turn (turn.rs)
//!                       │ Cancel          fires the turn's cancel token
//!                       │ Build/Keep/…    resumes a suspended turn
//!                       ▼
//!                broadcast::Sender<Event> ──► every connected client
//! ```
//!
//! One `SessionRuntime` per session; all state mutation happens through its
//! methods, so transports never touch `SessionState` directly.  Turns run in
//! a spawned task and suspend by awaiting a resume channel; commands arrive
//! on the runtime and are forwarded into whichever turn is waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use loke_config::Config;
use loke_model::ModelProvider;
use loke_tools::events::{TodoItem, TodoStatus};
use loke_tools::{builtin, DenyPolicy, Executor, QuestionBroker, ToolRegistry};
use loke_workspace::Workspace;

use crate::events::{
    CheckpointListData, CheckpointRestoredData, CheckpointSummary, Event, InitData,
    RevertedToStepData, SessionNameData, TodosData,
};
use crate::session::SessionState;
use crate::store::SessionStore;

/// Inbound client messages, exactly as the WebSocket bridge receives them.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Task {
        content: String,
        #[serde(default)]
        images: Vec<String>,
        #[serde(default)]
        context: Option<String>,
    },
    Cancel,
    Build {
        #[serde(default)]
        steps: Vec<String>,
    },
    Replan {
        content: String,
    },
    RejectPlan,
    Keep,
    Revert,
    RevertToStep {
        step: u32,
    },
    UserAnswer {
        tool_use_id: String,
        answer: String,
    },
    Reset,
    CheckpointList,
    CheckpointRestore {
        checkpoint_id: String,
    },
    AddTodo {
        content: String,
    },
    RemoveTodo {
        id: String,
    },
}

/// Client decisions a suspended turn is waiting for.
#[derive(Debug, Clone)]
pub(crate) enum ResumeSignal {
    Build { steps: Vec<String> },
    Replan { content: String },
    Reject,
    Keep,
    Revert,
}

pub(crate) struct TurnControl {
    pub cancel: CancellationToken,
    pub resume: Option<mpsc::Sender<ResumeSignal>>,
}

pub struct SessionRuntime {
    pub id: String,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) workspace: Arc<Workspace>,
    pub(crate) executor: Executor,
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) questions: Arc<QuestionBroker>,
    pub(crate) todos: Arc<Mutex<Vec<TodoItem>>>,
    pub(crate) turn: StdMutex<TurnControl>,
    pub(crate) store: SessionStore,
    pub(crate) config: Arc<Config>,
    pub(crate) deny: Arc<DenyPolicy>,
    dirty_tx: mpsc::Sender<()>,
}

impl SessionRuntime {
    fn build(
        state: SessionState,
        workspace: Arc<Workspace>,
        provider: Arc<dyn ModelProvider>,
        store: SessionStore,
        config: Arc<Config>,
    ) -> Arc<Self> {
        let registry: Arc<ToolRegistry> = Arc::new(builtin::standard_registry());
        let (dirty_tx, dirty_rx) = mpsc::channel(16);
        let todos = Arc::new(Mutex::new(state.todos.clone()));
        let runtime = Arc::new(Self {
            id: state.session_id.clone(),
            state: Mutex::new(state),
            events: broadcast::channel(1024).0,
            workspace,
            executor: Executor::new(registry),
            provider,
            questions: Arc::new(QuestionBroker::new()),
            todos,
            turn: StdMutex::new(TurnControl {
                cancel: CancellationToken::new(),
                resume: None,
            }),
            store,
            config: config.clone(),
            deny: Arc::new(DenyPolicy::from_config(&config.tools)),
            dirty_tx,
        });
        runtime.clone().spawn_persister(dirty_rx);
        runtime
    }

    /// Coalesce dirty notifications into one save per flush window.
    fn spawn_persister(self: Arc<Self>, mut dirty_rx: mpsc::Receiver<()>) {
        let window = std::time::Duration::from_millis(self.config.session.flush_coalesce_ms);
        tokio::spawn(async move {
            while dirty_rx.recv().await.is_some() {
                tokio::time::sleep(window).await;
                while dirty_rx.try_recv().is_ok() {}
                self.flush().await;
            }
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine: events also land in history/persisted
        // state, and reconnect replays them.
        let _ = self.events.send(event);
    }

    /// Mark state changed; the persister saves after the coalesce window.
    pub(crate) fn mark_dirty(&self) {
        let _ = self.dirty_tx.try_send(());
    }

    /// Save immediately.  Always called before terminal events.
    pub(crate) async fn flush(&self) {
        let state = self.state.lock().await.clone();
        let export = self.workspace.export_checkpoints();
        if let Err(e) = self.store.save(&state, &export) {
            warn!(session = %self.id, error = %e, "session flush failed");
            self.emit(Event::Error {
                content: format!("failed to persist session state: {e}"),
            });
        }
    }

    /// Data for the `init` event a bridge sends on bind.
    pub async fn init_data(&self) -> InitData {
        let state = self.state.lock().await;
        InitData {
            session_id: state.session_id.clone(),
            session_name: state.name.clone(),
            working_directory: state.working_directory.clone(),
            model: self.provider.model_name().to_string(),
            token_stats: state.token_stats.as_event_data(),
        }
    }

    pub async fn state_snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn agent_running(&self) -> bool {
        self.state.lock().await.agent_running
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    // ── Command routing ──────────────────────────────────────────────────────

    pub async fn handle(self: &Arc<Self>, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Task { content, images, .. } => {
                self.start_task(content, images).await;
            }
            ClientCommand::Cancel => {
                info!(session = %self.id, "cancel requested");
                let cancel = self.turn.lock().unwrap().cancel.clone();
                cancel.cancel();
                self.questions.cancel_all();
            }
            ClientCommand::UserAnswer { tool_use_id, answer } => {
                if !self.questions.answer(&tool_use_id, &answer) {
                    self.emit(Event::Status {
                        content: format!("no open question with id {tool_use_id}"),
                    });
                }
            }
            ClientCommand::Build { steps } => {
                self.resume_or(ResumeSignal::Build { steps }, Event::NoPlan).await;
            }
            ClientCommand::Replan { content } => {
                self.resume_or(ResumeSignal::Replan { content }, Event::NoPlan).await;
            }
            ClientCommand::RejectPlan => {
                self.resume_or(ResumeSignal::Reject, Event::NoPlan).await;
            }
            ClientCommand::Keep => {
                let fallback = Event::Status {
                    content: "no pending changes to keep".into(),
                };
                self.resume_or(ResumeSignal::Keep, fallback).await;
            }
            ClientCommand::Revert => {
                let fallback = Event::Status {
                    content: "no pending changes to revert".into(),
                };
                self.resume_or(ResumeSignal::Revert, fallback).await;
            }
            ClientCommand::RevertToStep { step } => {
                self.revert_to_step(step).await;
            }
            ClientCommand::Reset => {
                self.reset().await;
            }
            ClientCommand::CheckpointList => {
                let checkpoints: Vec<CheckpointSummary> = self
                    .workspace
                    .checkpoints_snapshot()
                    .iter()
                    .map(CheckpointSummary::from)
                    .collect();
                self.emit(Event::CheckpointList {
                    data: CheckpointListData { checkpoints },
                });
            }
            ClientCommand::CheckpointRestore { checkpoint_id } => {
                match self.workspace.restore_checkpoint(&checkpoint_id).await {
                    Ok(paths) => self.emit(Event::CheckpointRestored {
                        data: CheckpointRestoredData {
                            checkpoint_id,
                            count: paths.len(),
                            paths,
                        },
                    }),
                    Err(e) => self.emit(Event::CheckpointError {
                        content: e.to_string(),
                    }),
                }
            }
            ClientCommand::AddTodo { content } => {
                let item = TodoItem {
                    id: format!("td_{}", uuid::Uuid::new_v4().simple()),
                    content,
                    status: TodoStatus::Pending,
                };
                let todos = {
                    let mut todos = self.todos.lock().await;
                    todos.push(item);
                    todos.clone()
                };
                self.sync_todos(todos).await;
            }
            ClientCommand::RemoveTodo { id } => {
                let todos = {
                    let mut todos = self.todos.lock().await;
                    todos.retain(|t| t.id != id);
                    todos.clone()
                };
                self.sync_todos(todos).await;
            }
        }
    }

    async fn start_task(self: &Arc<Self>, content: String, images: Vec<String>) {
        {
            let mut state = self.state.lock().await;
            if let Some(reason) = state.can_accept_task() {
                drop(state);
                self.emit(Event::Error {
                    content: reason.to_string(),
                });
                return;
            }
            state.agent_running = true;
            state.touch();
            if state.name.is_empty() {
                state.name = derive_session_name(&content);
                self.emit(Event::SessionNameUpdate {
                    data: SessionNameData {
                        session_name: state.name.clone(),
                    },
                });
            }
        }
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            runtime.run_turn(content, images).await;
        });
    }

    async fn resume_or(&self, signal: ResumeSignal, fallback: Event) {
        let tx = self.turn.lock().unwrap().resume.clone();
        match tx {
            Some(tx) if tx.send(signal).await.is_ok() => {}
            _ => self.emit(fallback),
        }
    }

    /// Revert the workspace to its state at the end of `step`, i.e. restore
    /// the baselines of every later step.  Valid both mid-build and during
    /// review; with no sealed checkpoint after `step`, reports
    /// `no_checkpoint` and restores nothing.
    async fn revert_to_step(&self, step: u32) {
        match self.workspace.revert_from_step(step + 1).await {
            Ok(Some(files)) => {
                self.emit(Event::RevertedToStep {
                    data: RevertedToStepData {
                        step,
                        files,
                        no_checkpoint: false,
                    },
                });
                // When the turn is suspended in review, the shown diff set
                // shrank; refresh it.
                let awaiting_review = !self.state.lock().await.pending_diffs.is_empty();
                if awaiting_review {
                    let diffs = self.workspace.pending_changes().await.unwrap_or_default();
                    let mut state = self.state.lock().await;
                    state.pending_diffs = diffs.clone();
                    drop(state);
                    self.emit(Event::Diff {
                        data: crate::events::DiffData {
                            files: diffs,
                            cumulative: true,
                        },
                    });
                }
                self.mark_dirty();
            }
            Ok(None) => self.emit(Event::RevertedToStep {
                data: RevertedToStepData {
                    step,
                    files: Vec::new(),
                    no_checkpoint: true,
                },
            }),
            Err(e) => self.emit(Event::Error {
                content: format!("revert_to_step failed: {e}"),
            }),
        }
    }

    async fn reset(&self) {
        {
            let mut state = self.state.lock().await;
            if state.agent_running {
                drop(state);
                self.emit(Event::Error {
                    content: "cannot reset while a turn is running".into(),
                });
                return;
            }
            state.reset();
        }
        self.todos.lock().await.clear();
        self.workspace.clear_checkpoints();
        self.flush().await;
        self.emit(Event::ResetDone);
    }

    pub(crate) async fn sync_todos(&self, todos: Vec<TodoItem>) {
        self.state.lock().await.todos = todos.clone();
        self.emit(Event::TodosUpdated {
            data: TodosData { todos },
        });
        self.mark_dirty();
    }
}

fn derive_session_name(task: &str) -> String {
    let cleaned = task.trim().replace('\n', " ");
    let mut name: String = cleaned.chars().take(48).collect();
    if cleaned.chars().count() > 48 {
        name.push('…');
    }
    name
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Owns the session table.  Sessions are loaded lazily from the store on
/// first reference and stay resident until explicitly deleted.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionRuntime>>>,
    store: SessionStore,
    workspace: Arc<Workspace>,
    provider: Arc<dyn ModelProvider>,
    config: Arc<Config>,
}

/// Listing row for `/api/sessions`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub name: String,
    pub working_directory: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub agent_running: bool,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        workspace: Arc<Workspace>,
        provider: Arc<dyn ModelProvider>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            workspace,
            provider,
            config,
        })
    }

    pub async fn create(&self, name: &str) -> Arc<SessionRuntime> {
        let state = SessionState::new(name, &self.workspace.describe());
        let runtime = SessionRuntime::build(
            state,
            self.workspace.clone(),
            self.provider.clone(),
            self.store.clone(),
            self.config.clone(),
        );
        runtime.flush().await;
        self.sessions
            .write()
            .await
            .insert(runtime.id.clone(), runtime.clone());
        info!(session = %runtime.id, "session created");
        runtime
    }

    /// Resolve by id, loading from disk when not resident.
    pub async fn get(&self, id: &str) -> Option<Arc<SessionRuntime>> {
        if let Some(rt) = self.sessions.read().await.get(id) {
            return Some(rt.clone());
        }
        let (state, export) = self.store.load(id)?;
        let runtime = SessionRuntime::build(
            state,
            self.workspace.clone(),
            self.provider.clone(),
            self.store.clone(),
            self.config.clone(),
        );
        runtime.workspace.import_checkpoints(export);
        self.sessions
            .write()
            .await
            .insert(runtime.id.clone(), runtime.clone());
        info!(session = %id, "session loaded from store");
        Some(runtime)
    }

    /// The binding rule for `/ws` without a session id: most recent session,
    /// or a fresh one on an empty store.
    pub async fn most_recent_or_create(&self) -> Arc<SessionRuntime> {
        for id in self.store.list_ids() {
            if let Some(rt) = self.get(&id).await {
                return rt;
            }
        }
        self.create("").await
    }

    pub async fn list(&self) -> Vec<SessionMeta> {
        let mut out = Vec::new();
        for id in self.store.list_ids() {
            if let Some(rt) = self.get(&id).await {
                let state = rt.state.lock().await;
                out.push(SessionMeta {
                    session_id: state.session_id.clone(),
                    name: state.name.clone(),
                    working_directory: state.working_directory.clone(),
                    updated_at: state.updated_at,
                    agent_running: state.agent_running,
                });
            }
        }
        out
    }

    pub async fn delete(&self, id: &str) -> bool {
        let existed = self.sessions.write().await.remove(id).is_some();
        let on_disk = self.store.delete(id).is_ok();
        existed || on_disk
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
