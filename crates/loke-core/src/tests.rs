// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turn-engine integration tests over the scripted provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use loke_config::Config;
use loke_model::ScriptedProvider;
use loke_workspace::Workspace;

use crate::events::Event;
use crate::history::unpaired_tool_uses;
use crate::manager::{ClientCommand, SessionManager, SessionRuntime};
use crate::store::SessionStore;

struct Harness {
    _ws_dir: tempfile::TempDir,
    _state_dir: tempfile::TempDir,
    pub workspace: Arc<Workspace>,
    pub provider: Arc<ScriptedProvider>,
    pub session: Arc<SessionRuntime>,
}

async fn harness(turns: Vec<Vec<loke_model::StreamEvent>>) -> Harness {
    let ws_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let workspace = Arc::new(Workspace::local(ws_dir.path()).unwrap());
    let store = SessionStore::open(state_dir.path(), 32 * 1024).unwrap();
    let provider = Arc::new(ScriptedProvider::new(turns));
    let config = Arc::new(Config::default());
    let manager = SessionManager::new(store, workspace.clone(), provider.clone(), config);
    let session = manager.create("test").await;
    Harness {
        _ws_dir: ws_dir,
        _state_dir: state_dir,
        workspace,
        provider,
        session,
    }
}

/// Receive events until the predicate returns true, with a global timeout.
async fn drain_until(
    rx: &mut broadcast::Receiver<Event>,
    mut until: impl FnMut(&Event) -> bool,
) -> Vec<Event> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let ev = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let stop = until(&ev);
        out.push(ev);
        if stop {
            return out;
        }
    }
}

fn kinds(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            serde_json::to_value(e).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

fn is_terminal(ev: &Event) -> bool {
    matches!(
        ev,
        Event::Done { .. } | Event::Cancelled | Event::Error { .. } | Event::StreamFailed { .. }
    )
}

// ── Scenario: direct-mode read on an empty workspace ─────────────────────────

#[tokio::test]
async fn direct_read_of_missing_file() {
    let h = harness(vec![
        ScriptedProvider::tool_turn("c1", "read_file", json!({"path": "README.md"})),
        ScriptedProvider::text_turn("README.md does not exist in this workspace."),
    ])
    .await;
    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "read README.md".into(),
            images: vec![],
            context: None,
        })
        .await;

    let events = drain_until(&mut rx, is_terminal).await;
    let ks = kinds(&events);

    let order = ["phase_start", "tool_call", "tool_result", "text", "phase_end", "done"];
    let mut cursor = 0;
    for want in order {
        cursor = ks[cursor..]
            .iter()
            .position(|k| k == want)
            .unwrap_or_else(|| panic!("missing {want} after index {cursor} in {ks:?}"))
            + cursor
            + 1;
    }

    // The read failed but the turn completed.
    let failed = events.iter().any(|e| {
        matches!(e, Event::ToolResult { data, .. } if data.tool_use_id == "c1" && !data.success)
    });
    assert!(failed, "read_file should fail with not-found");
    assert!(!h.session.agent_running().await);

    // Pairing invariant over persisted history.
    let state = h.session.state_snapshot().await;
    assert!(unpaired_tool_uses(&state.history).is_empty());
}

// ── Scenario: plan → build → keep ────────────────────────────────────────────

#[tokio::test]
async fn plan_build_keep_flow() {
    let h = harness(vec![]).await;
    h.workspace.write("a.txt", b"hi\n").await.unwrap();

    // PLAN round proposes one step; BUILD round edits, then wraps up in text.
    h.provider.push_turn(ScriptedProvider::tool_turn(
        "p1",
        "propose_plan",
        json!({"steps": ["Append line"]}),
    ));
    h.provider.push_turn(ScriptedProvider::tool_turn(
        "e1",
        "edit_file",
        json!({"path": "a.txt", "old": "hi\n", "new": "hi\nanother line\n"}),
    ));
    h.provider
        .push_turn(ScriptedProvider::text_turn("Appended the line."));

    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "append a line to a.txt".into(),
            images: vec![],
            context: None,
        })
        .await;

    // Wait for the plan proposal, approve it.
    let events = drain_until(&mut rx, |e| matches!(e, Event::Plan { .. })).await;
    assert!(kinds(&events).contains(&"phase_start".to_string()));
    match events.last().unwrap() {
        Event::Plan { data } => assert_eq!(data.steps, vec!["Append line"]),
        other => panic!("expected plan, got {other:?}"),
    }
    h.session
        .handle(ClientCommand::Build { steps: vec!["Append line".into()] })
        .await;

    // Wait for the cumulative diff, then keep.
    let events = drain_until(&mut rx, |e| matches!(e, Event::Diff { .. })).await;
    let ks = kinds(&events);
    assert!(ks.contains(&"plan_step_progress".to_string()), "{ks:?}");
    match events.last().unwrap() {
        Event::Diff { data } => {
            assert!(data.cumulative);
            assert_eq!(data.files.len(), 1);
            assert_eq!(data.files[0].path, "a.txt");
            assert_eq!(data.files[0].additions, 1);
            assert_eq!(data.files[0].deletions, 0);
        }
        other => panic!("expected diff, got {other:?}"),
    }
    h.session.handle(ClientCommand::Keep).await;

    let events = drain_until(&mut rx, is_terminal).await;
    let ks = kinds(&events);
    assert!(ks.contains(&"kept".to_string()), "{ks:?}");
    assert_eq!(ks.last().unwrap(), "done");

    assert_eq!(
        h.workspace.read_text("a.txt").await.unwrap(),
        "hi\nanother line\n"
    );
    let state = h.session.state_snapshot().await;
    assert!(state.pending_diffs.is_empty());
    assert!(!state.agent_running);
}

// ── Scenario: revert restores baseline bytes ─────────────────────────────────

#[tokio::test]
async fn plan_build_revert_restores_files() {
    let h = harness(vec![]).await;
    h.workspace.write("a.txt", b"original\n").await.unwrap();

    h.provider.push_turn(ScriptedProvider::tool_turn(
        "p1",
        "propose_plan",
        json!({"steps": ["Rewrite a.txt"]}),
    ));
    h.provider.push_turn(ScriptedProvider::tool_turn(
        "w1",
        "write_file",
        json!({"path": "a.txt", "content": "replaced\n"}),
    ));
    h.provider.push_turn(ScriptedProvider::text_turn("Rewrote it."));

    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "/plan rewrite a.txt".into(),
            images: vec![],
            context: None,
        })
        .await;
    drain_until(&mut rx, |e| matches!(e, Event::Plan { .. })).await;
    h.session.handle(ClientCommand::Build { steps: vec![] }).await;
    drain_until(&mut rx, |e| matches!(e, Event::Diff { .. })).await;
    h.session.handle(ClientCommand::Revert).await;
    let events = drain_until(&mut rx, is_terminal).await;

    let reverted = events.iter().find_map(|e| match e {
        Event::Reverted { data } => Some(data.files.clone()),
        _ => None,
    });
    assert_eq!(reverted.unwrap(), vec!["a.txt".to_string()]);
    assert_eq!(h.workspace.read_text("a.txt").await.unwrap(), "original\n");
}

// ── Scenario: clarification question ─────────────────────────────────────────

#[tokio::test]
async fn clarification_suspends_and_resumes() {
    let h = harness(vec![
        ScriptedProvider::tool_turn(
            "T1",
            "ask_user_question",
            json!({"question": "Which file?", "options": ["a.py", "b.py"]}),
        ),
        ScriptedProvider::text_turn("Working on a.py then."),
    ])
    .await;

    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "check the failing module".into(),
            images: vec![],
            context: None,
        })
        .await;

    let events = drain_until(&mut rx, |e| matches!(e, Event::UserQuestion { .. })).await;
    match events.last().unwrap() {
        Event::UserQuestion { data } => {
            assert_eq!(data.tool_use_id, "T1");
            assert_eq!(data.question, "Which file?");
            assert_eq!(data.options, vec!["a.py", "b.py"]);
        }
        other => panic!("expected user_question, got {other:?}"),
    }

    h.session
        .handle(ClientCommand::UserAnswer {
            tool_use_id: "T1".into(),
            answer: "a.py".into(),
        })
        .await;

    let events = drain_until(&mut rx, is_terminal).await;
    let answered = events.iter().any(|e| {
        matches!(e, Event::ToolResult { data, content }
            if data.tool_use_id == "T1" && data.success && content == "a.py")
    });
    assert!(answered, "answer should become the tool result");
    assert_eq!(kinds(&events).last().unwrap(), "done");
}

// ── Scenario: cancel closes pairing with synthetic failures ──────────────────

#[tokio::test]
async fn cancel_during_suspension_synthesizes_failures() {
    let h = harness(vec![ScriptedProvider::tool_turn(
        "T1",
        "ask_user_question",
        json!({"question": "Proceed?"}),
    )])
    .await;

    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "check something risky".into(),
            images: vec![],
            context: None,
        })
        .await;
    drain_until(&mut rx, |e| matches!(e, Event::UserQuestion { .. })).await;

    h.session.handle(ClientCommand::Cancel).await;
    let events = drain_until(&mut rx, is_terminal).await;
    assert_eq!(kinds(&events).last().unwrap(), "cancelled");

    let state = h.session.state_snapshot().await;
    assert!(
        unpaired_tool_uses(&state.history).is_empty(),
        "cancel must close every tool_use with a result"
    );
    assert!(!state.agent_running);
}

// ── Scenario: plan rejection ends the turn ───────────────────────────────────

#[tokio::test]
async fn reject_plan_ends_turn() {
    let h = harness(vec![ScriptedProvider::tool_turn(
        "p1",
        "propose_plan",
        json!({"steps": ["Do the thing"]}),
    )])
    .await;

    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "/plan do the thing".into(),
            images: vec![],
            context: None,
        })
        .await;
    drain_until(&mut rx, |e| matches!(e, Event::Plan { .. })).await;
    h.session.handle(ClientCommand::RejectPlan).await;

    let events = drain_until(&mut rx, is_terminal).await;
    let ks = kinds(&events);
    assert!(ks.contains(&"plan_rejected".to_string()), "{ks:?}");
    assert_eq!(ks.last().unwrap(), "done");
    assert!(h.session.state_snapshot().await.pending_plan.is_none());
}

// ── Replay mirrors the live stream ───────────────────────────────────────────

#[tokio::test]
async fn replay_after_done_matches_history() {
    let h = harness(vec![
        ScriptedProvider::tool_turn("c1", "read_file", json!({"path": "x"})),
        ScriptedProvider::text_turn("No such file."),
    ])
    .await;
    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "read x".into(),
            images: vec![],
            context: None,
        })
        .await;
    drain_until(&mut rx, is_terminal).await;

    let state = h.session.state_snapshot().await;
    let replay = crate::replay::replay_events(&state);
    let ks: Vec<String> = kinds(&replay);
    assert_eq!(
        ks,
        vec![
            "replay_user",
            "replay_tool_call",
            "replay_tool_result",
            "replay_text",
            "replay_done"
        ]
    );
}

// ── Stream failure ends the turn cleanly ─────────────────────────────────────

#[tokio::test]
async fn exhausted_provider_fails_the_turn() {
    // No scripted turns at all: every completion attempt errors.
    let h = harness(vec![]).await;
    let mut rx = h.session.subscribe();
    h.session
        .handle(ClientCommand::Task {
            content: "read the readme".into(),
            images: vec![],
            context: None,
        })
        .await;
    let events = drain_until(&mut rx, is_terminal).await;
    let ks = kinds(&events);
    assert_eq!(ks.last().unwrap(), "stream_failed");
    assert!(
        ks.contains(&"stream_retry".to_string()),
        "retries surface before giving up: {ks:?}"
    );
    assert!(!h.session.agent_running().await);
}
