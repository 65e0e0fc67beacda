// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod ask_user;
mod bash;
mod edit_file;
mod find_symbol;
mod glob;
mod lint_file;
mod list_directory;
mod propose_plan;
mod read_file;
mod scout;
mod search;
mod todo;
mod web_fetch;
mod write_file;

pub use ask_user::AskUserQuestionTool;
pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use find_symbol::FindSymbolTool;
pub use glob::GlobTool;
pub use lint_file::LintFileTool;
pub use list_directory::ListDirectoryTool;
pub use propose_plan::{ProposePlanTool, PLAN_TOOL_NAME};
pub use read_file::ReadFileTool;
pub use scout::ScoutTool;
pub use search::SearchTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use web_fetch::WebFetchTool;
pub use write_file::WriteFileTool;

use crate::registry::ToolRegistry;

/// The full builtin tool set.
///
/// `propose_plan` is registered too: the turn engine intercepts it by name
/// during PLAN, but it still needs a schema in the catalog.
pub fn standard_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(ReadFileTool);
    reg.register(WriteFileTool);
    reg.register(EditFileTool);
    reg.register(BashTool);
    reg.register(GlobTool);
    reg.register(SearchTool);
    reg.register(FindSymbolTool);
    reg.register(ListDirectoryTool);
    reg.register(TodoWriteTool);
    reg.register(TodoReadTool);
    reg.register(WebFetchTool);
    reg.register(ScoutTool);
    reg.register(LintFileTool);
    reg.register(AskUserQuestionTool);
    reg.register(ProposePlanTool);
    reg
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
