// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use loke_config::ProjectRegistry;
use loke_core::{SessionManager, SessionStore};
use loke_server::AppState;
use loke_workspace::{SshBackend, SshTarget, Workspace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(loke_config::load(cli.config.as_deref())?);
    let port = cli.port.unwrap_or(config.server.port);

    // Workspace: --ssh wins, then --dir, then the current directory.
    let workspace = if let Some(target) = &cli.ssh {
        let target = SshTarget::parse(target, cli.key.clone())
            .context("invalid --ssh target")?;
        let backend = SshBackend::connect(target)
            .await
            .context("ssh connection failed")?;
        Arc::new(Workspace::new(Arc::new(backend)))
    } else {
        let dir = match &cli.dir {
            Some(d) => d.clone(),
            None => std::env::current_dir().context("cannot resolve current directory")?,
        };
        Arc::new(Workspace::local(&dir).with_context(|| {
            format!("workspace directory {} is not usable", dir.display())
        })?)
    };

    let state_dir = loke_config::state_dir();
    let store = SessionStore::open(&state_dir, config.session.inline_blob_limit)
        .context("cannot open session store")?;
    let mut projects = ProjectRegistry::open(&state_dir);
    projects.touch(
        &workspace.describe(),
        workspace
            .describe()
            .rsplit('/')
            .next()
            .unwrap_or("workspace"),
        None,
    );

    let provider: Arc<dyn loke_model::ModelProvider> =
        Arc::from(loke_model::from_config(&config.model).context("model configuration")?);
    let manager = SessionManager::new(store, workspace.clone(), provider, config.clone());

    let app = AppState::new(manager, workspace, config.clone(), projects);
    loke_server::serve(app, &config.server.bind, port).await
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LOKE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
