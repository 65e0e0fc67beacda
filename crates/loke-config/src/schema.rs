// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be on unless explicitly disabled
/// need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) or
    /// "scripted" (deterministic test provider).
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies or gateways.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
    /// Context window used for the per-turn usage percentage reported to the
    /// client.  Defaults to 200k when the provider does not say otherwise.
    pub context_window: Option<u32>,
    /// Transient stream errors are retried this many times with exponential
    /// backoff before the turn is failed.
    #[serde(default = "default_stream_retries")]
    pub stream_retries: u32,
    /// Seconds without any stream event before the attempt is treated as
    /// stalled and retried.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_stream_retries() -> u32 {
    3
}

fn default_idle_timeout() -> u64 {
    90
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4.1".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            context_window: None,
            stream_retries: default_stream_retries(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell command patterns that are refused outright.  Simple globs:
    /// `*` matches anything, `?` one character.
    #[serde(default = "default_deny_patterns")]
    pub deny_patterns: Vec<String>,
    /// Default timeout for shell commands, seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL when a running command is
    /// cancelled, seconds.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
    /// Rolling window for streamed command output kept in the final tool
    /// result, bytes.  The client still receives every chunk live.
    #[serde(default = "default_output_window")]
    pub output_window_bytes: usize,
    /// Allow the web_fetch tool to make outbound HTTP requests.
    #[serde(default = "default_true")]
    pub allow_web_fetch: bool,
}

fn default_deny_patterns() -> Vec<String> {
    vec![
        "rm -rf /*".into(),
        "rm -rf ~*".into(),
        "mkfs*".into(),
        "* > /dev/sd*".into(),
        "shutdown*".into(),
        "reboot*".into(),
    ]
}

fn default_command_timeout() -> u64 {
    120
}

fn default_kill_grace() -> u64 {
    3
}

fn default_output_window() -> usize {
    50_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            deny_patterns: default_deny_patterns(),
            command_timeout_secs: default_command_timeout(),
            kill_grace_secs: default_kill_grace(),
            output_window_bytes: default_output_window(),
            allow_web_fetch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port for the HTTP + WebSocket listener.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Outbound events buffered per WebSocket connection before the bridge
    /// degrades to coarse status events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_port() -> u16 {
    8377
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Milliseconds to coalesce session persistence writes.  Terminal events
    /// always flush immediately regardless of this value.
    #[serde(default = "default_flush_ms")]
    pub flush_coalesce_ms: u64,
    /// Checkpoint baselines larger than this are offloaded to sibling blob
    /// files instead of being inlined in the session JSON.
    #[serde(default = "default_inline_blob")]
    pub inline_blob_limit: usize,
    /// Maximum model ↔ tool round-trips within a single step before the turn
    /// is wrapped up.
    #[serde(default = "default_max_rounds")]
    pub max_tool_rounds: u32,
}

fn default_flush_ms() -> u64 {
    250
}

fn default_inline_blob() -> usize {
    32 * 1024
}

fn default_max_rounds() -> u32 {
    48
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_coalesce_ms: default_flush_ms(),
            inline_blob_limit: default_inline_blob(),
            max_tool_rounds: default_max_rounds(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
