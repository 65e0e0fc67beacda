// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The turn engine: one user message driven through
//!
//! ```text
//!            ┌──> DIRECT ──> tool loop ──────────────┐
//!   INIT ────┤                                       ├──> review ──> DONE
//!            └──> SCOUT ──> PLAN ──(build)──> BUILD ─┘
//!                            │  └─(replan)──> SCOUT
//!                            └──(reject)───────────────────────────> DONE
//! ```
//!
//! The turn runs in its own task.  Suspensions (plan approval, keep/revert,
//! user questions) await channels; no thread ever parks on the user.  The
//! cancel token is polled at every suspension point, and cancellation closes
//! the in-flight assistant message with synthetic failed tool results so the
//! pairing invariant holds in persisted history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loke_model::{
    complete_with_retry, CompletedToolUse, ContentKind, ModelRequest, RetryPolicy, StreamEvent,
    ToolUseAccumulator,
};
use loke_tools::builtin::PLAN_TOOL_NAME;
use loke_tools::events::ToolEvent;
use loke_tools::{ToolCall, ToolCtx};

use crate::events::{
    CommandOutputData, DiffData, Event, PlanData, StepProgressData, ToolCallData, ToolResultData,
    UserQuestionData,
};
use crate::history::{AssistantBlock, ChatMessage};
use crate::manager::{ResumeSignal, SessionRuntime};
use crate::mode::{self, TurnMode};
use crate::prompts::{self, Phase};
use crate::session::PendingPlan;

/// How a turn (or one of its phases) ended.
#[derive(Debug)]
enum TurnOutcome {
    Done,
    Cancelled,
    StreamFailed(String),
    Error(String),
}

/// How one model↔tools loop ended.
enum LoopOutcome {
    /// The model stopped issuing tool calls.
    Completed,
    /// PLAN only: the model proposed a plan.
    PlanProposed(PendingPlan),
    Cancelled,
    StreamFailed(String),
    Error(String),
}

struct RoundData {
    blocks: Vec<AssistantBlock>,
    tool_uses: Vec<CompletedToolUse>,
}

enum RoundResult {
    Done(RoundData),
    Cancelled(RoundData),
    StreamErr(String),
}

impl SessionRuntime {
    pub(crate) async fn run_turn(self: Arc<Self>, content: String, images: Vec<String>) {
        // Fresh per-turn control: cancel token and resume channel.
        let cancel = CancellationToken::new();
        let (resume_tx, mut resume_rx) = mpsc::channel::<ResumeSignal>(4);
        {
            let mut turn = self.turn.lock().unwrap();
            turn.cancel = cancel.clone();
            turn.resume = Some(resume_tx);
        }

        // Tool side-channel → outbound events, forwarded as they happen.
        let (tool_tx, tool_rx) = mpsc::channel::<ToolEvent>(256);
        let forwarder = tokio::spawn(Arc::clone(&self).forward_tool_events(tool_rx));
        let ctx = ToolCtx {
            workspace: self.workspace.clone(),
            todos: self.todos.clone(),
            events: tool_tx,
            questions: self.questions.clone(),
            cancel: cancel.clone(),
            deny: self.deny.clone(),
            config: Arc::new(self.config.tools.clone()),
        };

        let outcome = self
            .drive(&content, images, &ctx, &mut resume_rx, &cancel)
            .await;

        // Tear down the turn: no more resumes, forwarder drains and exits.
        self.turn.lock().unwrap().resume = None;
        drop(ctx);
        let _ = forwarder.await;

        // Flush durably before the terminal event reaches the client.
        let stats = {
            let mut state = self.state.lock().await;
            state.agent_running = false;
            state.touch();
            state.token_stats.as_event_data()
        };
        self.flush().await;
        match outcome {
            TurnOutcome::Done => self.emit(Event::Done { data: stats }),
            TurnOutcome::Cancelled => self.emit(Event::Cancelled),
            TurnOutcome::StreamFailed(msg) => self.emit(Event::StreamFailed { content: msg }),
            TurnOutcome::Error(msg) => self.emit(Event::Error { content: msg }),
        }
        info!(session = %self.id, "turn finished");
    }

    async fn drive(
        &self,
        content: &str,
        images: Vec<String>,
        ctx: &ToolCtx,
        resume_rx: &mut mpsc::Receiver<ResumeSignal>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let (mode, task_text) = {
            let state = self.state.lock().await;
            let (_, rest) = mode::strip_override(content);
            (mode::select(content, &state.recent_files), rest.to_string())
        };
        debug!(session = %self.id, ?mode, "turn mode selected");

        {
            let mut state = self.state.lock().await;
            state.history.push(ChatMessage::User {
                text: task_text.clone(),
                images,
            });
        }
        self.mark_dirty();

        match mode {
            TurnMode::Direct => self.run_direct(ctx, resume_rx, cancel).await,
            TurnMode::Plan => self.run_plan(ctx, resume_rx, cancel).await,
        }
    }

    // ── DIRECT ───────────────────────────────────────────────────────────────

    async fn run_direct(
        &self,
        ctx: &ToolCtx,
        resume_rx: &mut mpsc::Receiver<ResumeSignal>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.emit(Event::PhaseStart {
            content: "direct".into(),
        });
        let started = Instant::now();

        self.workspace.begin_turn();
        self.workspace.open_checkpoint("turn", None);
        let outcome = self.tool_loop(Phase::Direct, ctx, cancel, None).await;
        self.workspace.seal_checkpoint();

        match outcome {
            LoopOutcome::Completed => {}
            LoopOutcome::PlanProposed(_) => {
                // Not reachable: the plan tool is only in the PLAN catalog.
                warn!(session = %self.id, "plan proposed outside PLAN phase, ignoring");
            }
            LoopOutcome::Cancelled => return TurnOutcome::Cancelled,
            LoopOutcome::StreamFailed(m) => return TurnOutcome::StreamFailed(m),
            LoopOutcome::Error(m) => return TurnOutcome::Error(m),
        }

        if let Err(outcome) = self.run_review(resume_rx, cancel, false).await {
            return outcome;
        }
        self.emit(Event::PhaseEnd {
            content: "direct".into(),
            elapsed: humantime::format_duration(round_secs(started.elapsed())).to_string(),
        });
        TurnOutcome::Done
    }

    // ── SCOUT → PLAN → BUILD ─────────────────────────────────────────────────

    async fn run_plan(
        &self,
        ctx: &ToolCtx,
        resume_rx: &mut mpsc::Receiver<ResumeSignal>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.emit(Event::PhaseStart {
            content: "plan".into(),
        });
        let started = Instant::now();

        loop {
            let summary = match self.run_scout(ctx, cancel).await {
                Ok(s) => s,
                Err(outcome) => return outcome,
            };

            let outcome = self
                .tool_loop(Phase::Plan, ctx, cancel, summary.as_deref())
                .await;
            let plan = match outcome {
                LoopOutcome::PlanProposed(plan) => plan,
                LoopOutcome::Completed => {
                    self.emit(Event::NoPlan);
                    self.emit(Event::PhaseEnd {
                        content: "plan".into(),
                        elapsed: humantime::format_duration(round_secs(started.elapsed()))
                            .to_string(),
                    });
                    return TurnOutcome::Done;
                }
                LoopOutcome::Cancelled => return TurnOutcome::Cancelled,
                LoopOutcome::StreamFailed(m) => return TurnOutcome::StreamFailed(m),
                LoopOutcome::Error(m) => return TurnOutcome::Error(m),
            };

            {
                let mut state = self.state.lock().await;
                state.pending_plan = Some(plan.clone());
            }
            self.flush().await;
            self.emit(Event::Plan {
                data: PlanData::from(&plan),
            });

            // Suspend for the user's decision.
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnOutcome::Cancelled,
                signal = resume_rx.recv() => signal,
            };
            match signal {
                Some(ResumeSignal::Build { steps }) => {
                    let mut plan = {
                        let mut state = self.state.lock().await;
                        state.pending_plan.take().unwrap_or(plan)
                    };
                    // Edited steps replace the proposal in memory; the plan
                    // file the model may have written stays as authored.
                    if !steps.is_empty() {
                        plan.steps = steps;
                        self.emit(Event::UpdatedPlan {
                            data: PlanData::from(&plan),
                        });
                    }
                    self.mark_dirty();
                    self.emit(Event::PhaseEnd {
                        content: "plan".into(),
                        elapsed: humantime::format_duration(round_secs(started.elapsed()))
                            .to_string(),
                    });
                    return self.run_build(plan, ctx, resume_rx, cancel).await;
                }
                Some(ResumeSignal::Replan { content }) => {
                    {
                        let mut state = self.state.lock().await;
                        state.pending_plan = None;
                        state.history.push(ChatMessage::user(content));
                    }
                    self.mark_dirty();
                    continue;
                }
                Some(ResumeSignal::Reject) => {
                    {
                        let mut state = self.state.lock().await;
                        state.pending_plan = None;
                    }
                    self.emit(Event::PlanRejected);
                    self.emit(Event::PhaseEnd {
                        content: "plan".into(),
                        elapsed: humantime::format_duration(round_secs(started.elapsed()))
                            .to_string(),
                    });
                    return TurnOutcome::Done;
                }
                Some(ResumeSignal::Keep) | Some(ResumeSignal::Revert) => {
                    self.emit(Event::Status {
                        content: "no pending changes; awaiting a plan decision".into(),
                    });
                    continue;
                }
                None => return TurnOutcome::Cancelled,
            }
        }
    }

    /// Run the scout pass and return its summary for prompt injection.
    async fn run_scout(
        &self,
        ctx: &ToolCtx,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, TurnOutcome> {
        self.emit(Event::ScoutStart);
        let call = ToolCall {
            id: format!("scout_{}", uuid::Uuid::new_v4().simple()),
            name: "scout".into(),
            args: serde_json::json!({}),
        };
        let outputs = self.executor.execute_batch(&[call], ctx).await;
        self.emit(Event::ScoutEnd);
        if cancel.is_cancelled() {
            return Err(TurnOutcome::Cancelled);
        }
        match outputs.into_iter().next() {
            Some(out) if !out.is_error => Ok(Some(out.content)),
            Some(out) => {
                // A failed survey degrades planning but does not end it.
                warn!(session = %self.id, error = %out.content, "scout failed");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn run_build(
        &self,
        plan: PendingPlan,
        ctx: &ToolCtx,
        resume_rx: &mut mpsc::Receiver<ResumeSignal>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.emit(Event::PhaseStart {
            content: "build".into(),
        });
        let started = Instant::now();
        self.workspace.begin_turn();

        let total = plan.steps.len() as u32;
        for (i, step) in plan.steps.iter().enumerate() {
            let step_no = i as u32 + 1;
            self.emit(Event::PlanStepProgress {
                data: StepProgressData {
                    step: step_no,
                    total,
                },
            });
            let checkpoint_id = self
                .workspace
                .open_checkpoint(&format!("step:{step_no}"), Some(step_no));
            self.emit(Event::CheckpointCreated {
                data: crate::events::CheckpointIdData { checkpoint_id },
            });
            {
                let mut state = self.state.lock().await;
                state
                    .history
                    .push(ChatMessage::user(prompts::step_message(step_no, total, step)));
            }

            let outcome = self.tool_loop(Phase::Build, ctx, cancel, None).await;
            self.workspace.seal_checkpoint();
            match outcome {
                LoopOutcome::Completed => {}
                LoopOutcome::PlanProposed(_) => {}
                LoopOutcome::Cancelled => return TurnOutcome::Cancelled,
                LoopOutcome::StreamFailed(m) => return TurnOutcome::StreamFailed(m),
                LoopOutcome::Error(m) => return TurnOutcome::Error(m),
            }
        }

        if let Err(outcome) = self.run_review(resume_rx, cancel, true).await {
            return outcome;
        }
        self.emit(Event::PhaseEnd {
            content: "build".into(),
            elapsed: humantime::format_duration(round_secs(started.elapsed())).to_string(),
        });
        TurnOutcome::Done
    }

    // ── REVIEW ───────────────────────────────────────────────────────────────

    /// Compute cumulative diffs and suspend for keep/revert.
    ///
    /// `announce_empty` controls the no-changes case: BUILD always reports
    /// `no_changes`, DIRECT stays silent when the turn never touched a file.
    async fn run_review(
        &self,
        resume_rx: &mut mpsc::Receiver<ResumeSignal>,
        cancel: &CancellationToken,
        announce_empty: bool,
    ) -> Result<(), TurnOutcome> {
        let diffs = match self.workspace.pending_changes().await {
            Ok(d) => d,
            Err(e) => return Err(TurnOutcome::Error(format!("diff computation failed: {e}"))),
        };
        if diffs.is_empty() {
            if announce_empty {
                self.emit(Event::NoChanges);
            }
            self.workspace.keep_turn();
            return Ok(());
        }

        {
            let mut state = self.state.lock().await;
            state.pending_diffs = diffs.clone();
        }
        self.flush().await;
        self.emit(Event::Diff {
            data: DiffData {
                files: diffs,
                cumulative: true,
            },
        });

        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnOutcome::Cancelled),
                signal = resume_rx.recv() => signal,
            };
            match signal {
                Some(ResumeSignal::Keep) => {
                    self.workspace.keep_turn();
                    self.state.lock().await.pending_diffs.clear();
                    self.emit(Event::Kept);
                    self.emit(Event::ClearKeepRevert);
                    return Ok(());
                }
                Some(ResumeSignal::Revert) => {
                    let files = match self.workspace.revert_turn().await {
                        Ok(f) => f,
                        Err(e) => {
                            return Err(TurnOutcome::Error(format!("revert failed: {e}")))
                        }
                    };
                    self.state.lock().await.pending_diffs.clear();
                    self.emit(Event::Reverted {
                        data: crate::events::RevertedData { files },
                    });
                    self.emit(Event::ClearKeepRevert);
                    return Ok(());
                }
                Some(_) => {
                    self.emit(Event::Status {
                        content: "awaiting keep/revert".into(),
                    });
                }
                None => return Err(TurnOutcome::Cancelled),
            }
        }
    }

    // ── Model ↔ tools loop ───────────────────────────────────────────────────

    async fn tool_loop(
        &self,
        phase: Phase,
        ctx: &ToolCtx,
        cancel: &CancellationToken,
        scout_summary: Option<&str>,
    ) -> LoopOutcome {
        let registry = self.executor.registry();
        let catalog: Vec<loke_model::ToolSchema> = match phase {
            Phase::Plan => registry.read_only_schemas(),
            _ => registry
                .schemas()
                .into_iter()
                .filter(|s| s.name != PLAN_TOOL_NAME)
                .collect(),
        }
        .into_iter()
        .map(|s| loke_model::ToolSchema {
            name: s.name,
            description: s.description,
            parameters: s.parameters,
        })
        .collect();

        let policy = RetryPolicy::from_config(&self.config.model);
        let idle = Duration::from_secs(self.config.model.idle_timeout_secs.max(5));
        let max_rounds = self.config.session.max_tool_rounds;
        let mut stream_errors: u32 = 0;

        for round in 0u32.. {
            if round >= max_rounds {
                self.emit(Event::Status {
                    content: format!("tool budget of {max_rounds} rounds exhausted"),
                });
                return LoopOutcome::Completed;
            }
            if cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }

            let req = {
                let state = self.state.lock().await;
                ModelRequest {
                    system: prompts::system_prompt(
                        phase,
                        &state.working_directory,
                        scout_summary,
                    ),
                    messages: crate::history::to_wire(&state.history),
                    tools: catalog.clone(),
                    max_tokens: self.config.model.max_tokens,
                    temperature: self.config.model.temperature,
                }
            };

            let open = complete_with_retry(self.provider.as_ref(), &req, policy, |n| {
                self.emit(Event::StreamRetry {
                    content: format!(
                        "model stream error (attempt {}/{}): {}",
                        n.attempt, n.max_attempts, n.error
                    ),
                });
            });
            // Cancellable even through retry backoff sleeps.
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LoopOutcome::Cancelled,
                opened = open => opened,
            };
            let stream = match opened {
                Ok(s) => {
                    if stream_errors > 0 {
                        self.emit(Event::StreamRecovering);
                    }
                    s
                }
                Err(gave_up) => return LoopOutcome::StreamFailed(gave_up.to_string()),
            };

            let round_result = self.drain_stream(stream, cancel, idle).await;
            let round_data = match round_result {
                RoundResult::Done(data) => {
                    stream_errors = 0;
                    data
                }
                RoundResult::Cancelled(mut data) => {
                    // Close the message: synthetic failures for every call
                    // that will never run.
                    for tu in &data.tool_uses {
                        data.blocks.push(AssistantBlock::ToolResult {
                            id: tu.id.clone(),
                            content: "cancelled".into(),
                            success: false,
                        });
                    }
                    if !data.blocks.is_empty() {
                        let mut state = self.state.lock().await;
                        state.history.push(ChatMessage::Assistant {
                            blocks: data.blocks,
                        });
                    }
                    self.mark_dirty();
                    return LoopOutcome::Cancelled;
                }
                RoundResult::StreamErr(err) => {
                    stream_errors += 1;
                    if stream_errors >= policy.max_attempts {
                        return LoopOutcome::StreamFailed(err);
                    }
                    self.emit(Event::StreamRetry {
                        content: format!(
                            "model stream error (attempt {}/{}): {}",
                            stream_errors, policy.max_attempts, err
                        ),
                    });
                    tokio::time::sleep(Duration::from_millis(500 * stream_errors as u64)).await;
                    continue;
                }
            };

            // PLAN interception: a propose_plan call suspends the turn
            // instead of dispatching.
            if phase == Phase::Plan {
                if let Some(plan_call) = round_data
                    .tool_uses
                    .iter()
                    .find(|tu| tu.name == PLAN_TOOL_NAME)
                {
                    let plan = parse_plan(&plan_call.input);
                    let mut blocks = round_data.blocks;
                    blocks.push(AssistantBlock::ToolResult {
                        id: plan_call.id.clone(),
                        content: "Plan recorded; awaiting user approval.".into(),
                        success: true,
                    });
                    // Other calls in the same batch are not dispatched.
                    for tu in round_data
                        .tool_uses
                        .iter()
                        .filter(|tu| tu.name != PLAN_TOOL_NAME)
                    {
                        blocks.push(AssistantBlock::ToolResult {
                            id: tu.id.clone(),
                            content: "skipped: plan proposed in the same message".into(),
                            success: false,
                        });
                    }
                    let mut state = self.state.lock().await;
                    state.history.push(ChatMessage::Assistant { blocks });
                    drop(state);
                    self.mark_dirty();
                    return LoopOutcome::PlanProposed(plan);
                }
            }

            let message_index = {
                let mut state = self.state.lock().await;
                state.history.push(ChatMessage::Assistant {
                    blocks: round_data.blocks,
                });
                state.history.len() - 1
            };
            self.mark_dirty();

            if round_data.tool_uses.is_empty() {
                return LoopOutcome::Completed;
            }

            // Dispatch the batch.
            let calls: Vec<ToolCall> = round_data
                .tool_uses
                .iter()
                .map(|tu| {
                    self.emit(Event::ToolCall {
                        data: ToolCallData {
                            id: tu.id.clone(),
                            name: tu.name.clone(),
                            input: tu.input.clone(),
                        },
                    });
                    ToolCall {
                        id: tu.id.clone(),
                        name: tu.name.clone(),
                        args: tu.input.clone(),
                    }
                })
                .collect();
            let outputs = self.executor.execute_batch(&calls, ctx).await;

            {
                let mut state = self.state.lock().await;
                for (call, output) in calls.iter().zip(outputs.iter()) {
                    if let Some(path) = call.args.get("path").and_then(|v| v.as_str()) {
                        state.note_recent_file(path);
                    }
                    if let Some(ChatMessage::Assistant { blocks }) =
                        state.history.get_mut(message_index)
                    {
                        blocks.push(AssistantBlock::ToolResult {
                            id: output.call_id.clone(),
                            content: output.content.clone(),
                            success: !output.is_error,
                        });
                    }
                }
            }
            for (call, output) in calls.iter().zip(outputs.iter()) {
                self.emit(Event::ToolResult {
                    data: ToolResultData {
                        tool_use_id: output.call_id.clone(),
                        success: !output.is_error,
                        exit_code: output.exit_code,
                        duration_ms: output.duration_ms,
                    },
                    content: output.content.clone(),
                });
                if call.name == "bash" && output.is_error && output.content != "cancelled" {
                    self.emit(Event::CommandPartialFailure {
                        data: ToolResultData {
                            tool_use_id: output.call_id.clone(),
                            success: false,
                            exit_code: output.exit_code,
                            duration_ms: output.duration_ms,
                        },
                        content: output.content.clone(),
                    });
                }
            }
            self.mark_dirty();

            if cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }
        }
        unreachable!("round loop exits via return");
    }

    /// Drain one model stream into blocks + tool uses, emitting live events.
    async fn drain_stream(
        &self,
        mut stream: loke_model::EventStream,
        cancel: &CancellationToken,
        idle: Duration,
    ) -> RoundResult {
        let mut blocks: Vec<AssistantBlock> = Vec::new();
        let mut acc = ToolUseAccumulator::default();
        let mut thinking_buf = String::new();
        let mut text_buf = String::new();

        let finish_partial = |blocks: &mut Vec<AssistantBlock>,
                              thinking_buf: &mut String,
                              text_buf: &mut String,
                              acc: ToolUseAccumulator| {
            if !thinking_buf.is_empty() {
                blocks.push(AssistantBlock::Thinking {
                    text: std::mem::take(thinking_buf),
                });
            }
            if !text_buf.is_empty() {
                blocks.push(AssistantBlock::Text {
                    text: std::mem::take(text_buf),
                });
            }
            let tool_uses = acc.finish();
            for tu in &tool_uses {
                blocks.push(AssistantBlock::ToolUse {
                    id: tu.id.clone(),
                    name: tu.name.clone(),
                    input: tu.input.clone(),
                });
            }
            tool_uses
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let tool_uses =
                        finish_partial(&mut blocks, &mut thinking_buf, &mut text_buf, acc);
                    return RoundResult::Cancelled(RoundData { blocks, tool_uses });
                }
                next = tokio::time::timeout(idle, stream.next()) => next,
            };
            let event = match next {
                Err(_) => return RoundResult::StreamErr("model stream idle timeout".into()),
                Ok(None) => {
                    return RoundResult::StreamErr("model stream ended unexpectedly".into())
                }
                Ok(Some(Err(e))) => return RoundResult::StreamErr(e.to_string()),
                Ok(Some(Ok(ev))) => ev,
            };

            match event {
                StreamEvent::ContentStart(ContentKind::Thinking) => {
                    self.emit(Event::ThinkingStart)
                }
                StreamEvent::ContentStart(ContentKind::Text) => self.emit(Event::TextStart),
                StreamEvent::ContentDelta(ContentKind::Thinking, delta) => {
                    thinking_buf.push_str(&delta);
                    self.emit(Event::Thinking { content: delta });
                }
                StreamEvent::ContentDelta(ContentKind::Text, delta) => {
                    text_buf.push_str(&delta);
                    self.emit(Event::Text { content: delta });
                }
                StreamEvent::ContentEnd(ContentKind::Thinking) => {
                    self.emit(Event::ThinkingEnd);
                    if !thinking_buf.is_empty() {
                        blocks.push(AssistantBlock::Thinking {
                            text: std::mem::take(&mut thinking_buf),
                        });
                    }
                }
                StreamEvent::ContentEnd(ContentKind::Text) => {
                    self.emit(Event::TextEnd);
                    if !text_buf.is_empty() {
                        blocks.push(AssistantBlock::Text {
                            text: std::mem::take(&mut text_buf),
                        });
                    }
                }
                StreamEvent::ToolUse {
                    index,
                    id,
                    name,
                    input_fragment,
                } => acc.push(index, &id, &name, &input_fragment),
                StreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                    cache_read_tokens,
                } => {
                    let mut state = self.state.lock().await;
                    state.token_stats.add_usage(
                        input_tokens,
                        output_tokens,
                        cache_read_tokens,
                        self.provider.context_window(),
                    );
                }
                StreamEvent::MessageEnd => break,
            }
        }

        let tool_uses = finish_partial(&mut blocks, &mut thinking_buf, &mut text_buf, acc);
        RoundResult::Done(RoundData { blocks, tool_uses })
    }

    /// Map tool side-channel events onto the outbound protocol.
    async fn forward_tool_events(self: Arc<Self>, mut rx: mpsc::Receiver<ToolEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                ToolEvent::CommandStart {
                    tool_use_id,
                    command,
                } => self.emit(Event::CommandStart {
                    data: CommandOutputData {
                        tool_use_id,
                        is_stderr: false,
                    },
                    content: command,
                }),
                ToolEvent::CommandOutput {
                    tool_use_id,
                    chunk,
                    is_stderr,
                } => self.emit(Event::CommandOutput {
                    data: CommandOutputData {
                        tool_use_id,
                        is_stderr,
                    },
                    content: chunk,
                }),
                ToolEvent::TodosUpdated(todos) => {
                    self.sync_todos(todos).await;
                }
                ToolEvent::ScoutProgress { message } => {
                    self.emit(Event::ScoutProgress { content: message })
                }
                ToolEvent::UserQuestion {
                    tool_use_id,
                    question,
                    context,
                    options,
                } => self.emit(Event::UserQuestion {
                    data: UserQuestionData {
                        tool_use_id,
                        question,
                        context,
                        options,
                    },
                }),
                ToolEvent::FileChanged { path } => {
                    self.state.lock().await.note_recent_file(&path);
                    self.emit(Event::FileChanged {
                        data: crate::events::FileChangedData { path },
                    });
                    self.mark_dirty();
                }
                ToolEvent::AutoApproved { tool_use_id, name } => {
                    self.emit(Event::AutoApproved {
                        data: ToolCallData {
                            id: tool_use_id,
                            name,
                            input: serde_json::Value::Null,
                        },
                    })
                }
            }
        }
    }
}

fn parse_plan(input: &serde_json::Value) -> PendingPlan {
    PendingPlan {
        steps: input
            .get("steps")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        plan_text: input
            .get("plan_text")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        plan_file: input
            .get("plan_file")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

/// Whole-second resolution for human-facing elapsed times.
fn round_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_plan_extracts_all_fields() {
        let plan = parse_plan(&json!({
            "steps": ["one", "two"],
            "plan_text": "rationale",
            "plan_file": "PLAN.md"
        }));
        assert_eq!(plan.steps, vec!["one", "two"]);
        assert_eq!(plan.plan_text.as_deref(), Some("rationale"));
        assert_eq!(plan.plan_file.as_deref(), Some("PLAN.md"));
    }

    #[test]
    fn parse_plan_tolerates_missing_fields() {
        let plan = parse_plan(&json!({}));
        assert!(plan.steps.is_empty());
        assert!(plan.plan_text.is_none());
    }
}
