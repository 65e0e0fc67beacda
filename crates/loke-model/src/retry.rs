// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use tracing::warn;

use crate::provider::{EventStream, ModelProvider};
use crate::types::ModelRequest;

/// How transient completion failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &loke_config::ModelConfig) -> Self {
        Self {
            max_attempts: cfg.stream_retries.max(1),
            base_delay: Duration::from_millis(500),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        // Exponential: base, 2×base, 4×base, … capped at 30 s.
        let factor = 1u32 << attempt.min(6);
        (self.base_delay * factor).min(Duration::from_secs(30))
    }
}

/// Notification emitted before each retry sleep.
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: String,
    pub delay: Duration,
}

/// All attempts exhausted; the turn must end with `stream_failed`.
#[derive(Debug, thiserror::Error)]
#[error("model stream failed after {attempts} attempts: {last_error}")]
pub struct StreamGaveUp {
    pub attempts: u32,
    pub last_error: String,
}

/// Open a completion stream, retrying transient connection failures with
/// exponential backoff.  `notify` fires once per retry so the caller can
/// surface `stream_retry` events to the client.
///
/// Only the *opening* of the stream is retried here; an error that arrives
/// mid-stream reaches the caller as a stream item, and the caller decides
/// whether to re-enter this function with rebuilt request state.
pub async fn complete_with_retry(
    provider: &dyn ModelProvider,
    req: &ModelRequest,
    policy: RetryPolicy,
    mut notify: impl FnMut(RetryNotice),
) -> Result<EventStream, StreamGaveUp> {
    let mut last_error = String::new();
    for attempt in 0..policy.max_attempts {
        match provider.complete(req.clone()).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_error = e.to_string();
                let remaining = policy.max_attempts - attempt - 1;
                if remaining == 0 {
                    break;
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt, error = %last_error, ?delay, "model completion failed, retrying");
                notify(RetryNotice {
                    attempt: attempt + 1,
                    max_attempts: policy.max_attempts,
                    error: last_error.clone(),
                    delay,
                });
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(StreamGaveUp {
        attempts: policy.max_attempts,
        last_error,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
