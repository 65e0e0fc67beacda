// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::sync::Mutex;

use loke_config::{Config, ProjectRegistry};
use loke_core::SessionManager;
use loke_workspace::Workspace;

/// Shared handler state: the session table, the workspace, the config, and
/// the recent-projects registry.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub workspace: Arc<Workspace>,
    pub config: Arc<Config>,
    pub projects: Arc<Mutex<ProjectRegistry>>,
}

impl AppState {
    pub fn new(
        manager: Arc<SessionManager>,
        workspace: Arc<Workspace>,
        config: Arc<Config>,
        projects: ProjectRegistry,
    ) -> Self {
        Self {
            manager,
            workspace,
            config,
            projects: Arc::new(Mutex::new(projects)),
        }
    }
}
