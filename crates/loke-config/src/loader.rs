// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::schema::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Load configuration.
///
/// Search order:
/// 1. the explicit `path` argument (error if unreadable),
/// 2. `$LOKE_CONFIG`,
/// 3. `~/.config/loke/config.yaml`,
/// 4. built-in defaults.
///
/// A missing file in steps 2–3 is not an error; a file that exists but does
/// not parse always is.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(p) = path {
        return read_file(p);
    }
    if let Ok(env_path) = std::env::var("LOKE_CONFIG") {
        let expanded = shellexpand::tilde(&env_path).to_string();
        return read_file(Path::new(&expanded));
    }
    let default_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loke")
        .join("config.yaml");
    if default_path.exists() {
        return read_file(&default_path);
    }
    debug!("no config file found, using defaults");
    Ok(Config::default())
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory for durable state: session files, checkpoint blobs, the
/// recent-projects registry.  Created on first use.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LOKE_STATE_DIR") {
        return PathBuf::from(shellexpand::tilde(&dir).to_string());
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loke")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
