// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod projects;
mod schema;

pub use loader::{load, state_dir, ConfigError};
pub use projects::{ProjectEntry, ProjectRegistry, SshInfo};
pub use schema::*;
