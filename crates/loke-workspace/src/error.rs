// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

/// Errors raised by workspace operations.
///
/// Tools catch these and turn them into failed tool results with a hint the
/// model can act on; they never abort the turn by themselves.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("path escapes the workspace root: {0}")]
    Scope(PathBuf),

    #[error("edit anchor not found in file")]
    AnchorMissing,

    #[error("edit anchor matches {count} locations; pass replace_all or a longer anchor")]
    AnchorAmbiguous { count: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote transport error: {0}")]
    Remote(String),
}

impl WorkspaceError {
    /// A short "what to do next" hint derived from the error kind, appended
    /// to failed tool results so the model recovers in one round instead of
    /// guessing.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "check the path with list_directory or glob first",
            Self::Scope(_) => "only paths inside the workspace root are accessible",
            Self::AnchorMissing => "re-read the file; the anchor text must match exactly",
            Self::AnchorAmbiguous { .. } => {
                "include more surrounding context in the anchor, or set replace_all"
            }
            Self::Io(_) => "the operation can be retried",
            Self::Remote(_) => "the ssh transport failed; the host may be unreachable",
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
