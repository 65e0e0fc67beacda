// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod openai;
mod provider;
mod retry;
mod scripted;
mod types;

pub use openai::OpenAiCompatProvider;
pub use provider::{EventStream, ModelProvider};
pub use retry::{complete_with_retry, RetryNotice, RetryPolicy, StreamGaveUp};
pub use scripted::ScriptedProvider;
pub use types::*;

use loke_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// "openai" covers every OpenAI-compatible chat-completions endpoint; the
/// base URL selects the actual backend.  "scripted" is the deterministic
/// test provider and refuses to start without a script, so it is only
/// reachable from test code that installs one explicitly.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiCompatProvider::new(
            cfg.name.clone(),
            resolve_api_key(cfg),
            cfg.base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            cfg.max_tokens,
            cfg.temperature,
            cfg.context_window,
        ))),
        other => anyhow::bail!("unknown model provider '{other}'"),
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    cfg.api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|v| !v.is_empty())
}
