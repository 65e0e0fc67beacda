// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use loke_config::ToolsConfig;
use loke_workspace::Workspace;

use crate::events::{TodoItem, ToolEvent};
use crate::policy::DenyPolicy;
use crate::question::QuestionBroker;

/// Everything a tool can reach while executing.
///
/// One context per turn: the cancel token and event channel are fresh each
/// turn, while the workspace, todo list and question broker live on the
/// session.
#[derive(Clone)]
pub struct ToolCtx {
    pub workspace: Arc<Workspace>,
    pub todos: Arc<Mutex<Vec<TodoItem>>>,
    pub events: mpsc::Sender<ToolEvent>,
    pub questions: Arc<QuestionBroker>,
    pub cancel: CancellationToken,
    pub deny: Arc<DenyPolicy>,
    pub config: Arc<ToolsConfig>,
}

impl ToolCtx {
    /// Fire-and-forget event emission; a full (or gone) channel never fails
    /// a tool.
    pub async fn emit(&self, event: ToolEvent) {
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Context over a temp workspace, returning the receiving end of the
    /// tool event channel for assertions.
    pub fn ctx(
        workspace: Arc<Workspace>,
    ) -> (ToolCtx, mpsc::Receiver<ToolEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let config = Arc::new(ToolsConfig::default());
        (
            ToolCtx {
                workspace,
                todos: Arc::new(Mutex::new(Vec::new())),
                events: tx,
                questions: Arc::new(QuestionBroker::new()),
                cancel: CancellationToken::new(),
                deny: Arc::new(DenyPolicy::from_config(&config)),
                config,
            },
            rx,
        )
    }
}
