// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Line-level diff used for review diffs, the `/api/file-diff` endpoint and
//! edit-tool result summaries.
//!
//! Below [`DP_LINE_LIMIT`] lines the ops come from an exact LCS (dynamic
//! programming over the trimmed middle of the two files).  Above it, a
//! position-aligned resync heuristic keeps memory bounded; for the huge
//! generated files where that triggers, exact minimality stops mattering
//! before correctness does.

use serde::{Deserialize, Serialize};

/// Files larger than this (in lines, after common prefix/suffix trimming)
/// take the heuristic path instead of full DP.
const DP_LINE_LIMIT: usize = 5_000;

/// Resync lookahead for the heuristic path.
const RESYNC_WINDOW: usize = 64;

/// Deletion/addition pairs within this many lines are classified as a
/// modification for gutter marks.
const MODIFY_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

/// How a changed file is labelled on the wire.  `NewFile` is signalled via
/// this field, not via diff headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeLabel {
    Modified,
    NewFile,
}

/// A complete per-file diff as sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub label: ChangeLabel,
    pub diff: String,
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GutterKind {
    Added,
    Removed,
    Modified,
}

/// One gutter mark, anchored to a line number in the *new* file (1-based).
/// `Removed` marks anchor to the line after the removal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GutterMark {
    pub line: usize,
    pub kind: GutterKind,
}

/// Compute line ops between two texts.
pub fn line_ops(old: &str, new: &str) -> Vec<(LineOp, String)> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    // Trim common prefix and suffix; the DP only needs the changed middle.
    let mut start = 0;
    while start < a.len() && start < b.len() && a[start] == b[start] {
        start += 1;
    }
    let mut end_a = a.len();
    let mut end_b = b.len();
    while end_a > start && end_b > start && a[end_a - 1] == b[end_b - 1] {
        end_a -= 1;
        end_b -= 1;
    }

    let mut ops: Vec<(LineOp, String)> = Vec::with_capacity(a.len().max(b.len()));
    for line in &a[..start] {
        ops.push((LineOp::Equal, (*line).to_string()));
    }

    let mid_a = &a[start..end_a];
    let mid_b = &b[start..end_b];
    if mid_a.len().max(mid_b.len()) <= DP_LINE_LIMIT {
        lcs_ops(mid_a, mid_b, &mut ops);
    } else {
        aligned_ops(mid_a, mid_b, &mut ops);
    }

    for line in &a[end_a..] {
        ops.push((LineOp::Equal, (*line).to_string()));
    }
    ops
}

/// Exact LCS via the classic DP table, emitting deletes before inserts
/// within each changed run.
fn lcs_ops(a: &[&str], b: &[&str], ops: &mut Vec<(LineOp, String)>) {
    let n = a.len();
    let m = b.len();
    // lcs[i][j] = LCS length of a[i..], b[j..]
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[idx(i, j)] = if a[i] == b[j] {
                table[idx(i + 1, j + 1)] + 1
            } else {
                table[idx(i + 1, j)].max(table[idx(i, j + 1)])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push((LineOp::Equal, a[i].to_string()));
            i += 1;
            j += 1;
        } else if table[idx(i + 1, j)] >= table[idx(i, j + 1)] {
            ops.push((LineOp::Delete, a[i].to_string()));
            i += 1;
        } else {
            ops.push((LineOp::Insert, b[j].to_string()));
            j += 1;
        }
    }
    while i < n {
        ops.push((LineOp::Delete, a[i].to_string()));
        i += 1;
    }
    while j < m {
        ops.push((LineOp::Insert, b[j].to_string()));
        j += 1;
    }
}

/// Position-aligned heuristic for oversized inputs: advance both sides in
/// lockstep, resyncing on the nearest matching line within a bounded window.
fn aligned_ops(a: &[&str], b: &[&str], ops: &mut Vec<(LineOp, String)>) {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            ops.push((LineOp::Equal, a[i].to_string()));
            i += 1;
            j += 1;
            continue;
        }
        // Nearest resync: does a[i] reappear soon in b, or b[j] soon in a?
        let in_b = b[j..b.len().min(j + RESYNC_WINDOW)]
            .iter()
            .position(|l| *l == a[i]);
        let in_a = a[i..a.len().min(i + RESYNC_WINDOW)]
            .iter()
            .position(|l| *l == b[j]);
        match (in_a, in_b) {
            (Some(da), Some(db)) if da <= db => {
                for line in &a[i..i + da] {
                    ops.push((LineOp::Delete, (*line).to_string()));
                }
                i += da;
            }
            (_, Some(db)) => {
                for line in &b[j..j + db] {
                    ops.push((LineOp::Insert, (*line).to_string()));
                }
                j += db;
            }
            (Some(da), None) => {
                for line in &a[i..i + da] {
                    ops.push((LineOp::Delete, (*line).to_string()));
                }
                i += da;
            }
            (None, None) => {
                ops.push((LineOp::Delete, a[i].to_string()));
                ops.push((LineOp::Insert, b[j].to_string()));
                i += 1;
                j += 1;
            }
        }
    }
    for line in &a[i..] {
        ops.push((LineOp::Delete, (*line).to_string()));
    }
    for line in &b[j..] {
        ops.push((LineOp::Insert, (*line).to_string()));
    }
}

/// Render ops as a unified diff with 3 lines of context.
pub fn unified(old: &str, new: &str, path: &str) -> (String, DiffStats) {
    let ops = line_ops(old, new);
    let stats = DiffStats {
        additions: ops.iter().filter(|(op, _)| *op == LineOp::Insert).count(),
        deletions: ops.iter().filter(|(op, _)| *op == LineOp::Delete).count(),
    };
    if stats.additions == 0 && stats.deletions == 0 {
        return (String::new(), stats);
    }

    const CONTEXT: usize = 3;
    let mut text = format!("--- {path}\n+++ {path}\n");

    // Group ops into hunks: runs of changes plus surrounding context.
    let mut hunk_ranges: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (k, (op, _)) in ops.iter().enumerate() {
        if *op != LineOp::Equal {
            let lo = k.saturating_sub(CONTEXT);
            let hi = (k + CONTEXT + 1).min(ops.len());
            match &mut current {
                Some((_, end)) if lo <= *end => *end = hi,
                Some(range) => {
                    hunk_ranges.push(*range);
                    current = Some((lo, hi));
                }
                None => current = Some((lo, hi)),
            }
        }
    }
    if let Some(range) = current {
        hunk_ranges.push(range);
    }

    // Track old/new line numbers as we walk the full op list.
    let mut old_line = 1usize;
    let mut new_line = 1usize;
    let mut cursor = 0usize;
    for (lo, hi) in hunk_ranges {
        while cursor < lo {
            let (op, _) = &ops[cursor];
            match op {
                LineOp::Equal => {
                    old_line += 1;
                    new_line += 1;
                }
                LineOp::Delete => old_line += 1,
                LineOp::Insert => new_line += 1,
            }
            cursor += 1;
        }
        let hunk_old_start = old_line;
        let hunk_new_start = new_line;
        let mut body = String::new();
        let mut old_count = 0usize;
        let mut new_count = 0usize;
        while cursor < hi {
            let (op, line) = &ops[cursor];
            match op {
                LineOp::Equal => {
                    body.push_str(&format!(" {line}\n"));
                    old_line += 1;
                    new_line += 1;
                    old_count += 1;
                    new_count += 1;
                }
                LineOp::Delete => {
                    body.push_str(&format!("-{line}\n"));
                    old_line += 1;
                    old_count += 1;
                }
                LineOp::Insert => {
                    body.push_str(&format!("+{line}\n"));
                    new_line += 1;
                    new_count += 1;
                }
            }
            cursor += 1;
        }
        text.push_str(&format!(
            "@@ -{hunk_old_start},{old_count} +{hunk_new_start},{new_count} @@\n"
        ));
        text.push_str(&body);
    }

    (text, stats)
}

/// Classify change runs for editor gutter marks.
///
/// A deletion immediately followed (within [`MODIFY_WINDOW`] lines) by an
/// insertion — or the reverse — reads as an edit of the same region, so it
/// gets a single `Modified` mark instead of separate removed/added marks.
pub fn gutter_marks(old: &str, new: &str) -> Vec<GutterMark> {
    let ops = line_ops(old, new);
    let mut marks = Vec::new();
    let mut new_line = 0usize; // last emitted new-file line
    let mut k = 0usize;
    while k < ops.len() {
        match ops[k].0 {
            LineOp::Equal => {
                new_line += 1;
                k += 1;
            }
            _ => {
                // Collect the whole changed run (deletes + inserts with at
                // most MODIFY_WINDOW equal lines between them are one run).
                let run_start_line = new_line;
                let mut deletes = 0usize;
                let mut inserts = 0usize;
                let mut gap = 0usize;
                let mut end = k;
                while end < ops.len() {
                    match ops[end].0 {
                        LineOp::Delete => {
                            deletes += 1;
                            gap = 0;
                        }
                        LineOp::Insert => {
                            inserts += 1;
                            new_line += 1;
                            gap = 0;
                        }
                        LineOp::Equal => {
                            gap += 1;
                            if gap > MODIFY_WINDOW {
                                break;
                            }
                            new_line += 1;
                        }
                    }
                    end += 1;
                }
                // Back out trailing equals that were only lookahead.
                let mut tail = end;
                while tail > k && ops[tail - 1].0 == LineOp::Equal {
                    tail -= 1;
                    new_line -= 1;
                }
                let kind = match (deletes > 0, inserts > 0) {
                    (true, true) => GutterKind::Modified,
                    (false, true) => GutterKind::Added,
                    _ => GutterKind::Removed,
                };
                marks.push(GutterMark {
                    line: run_start_line + 1,
                    kind,
                });
                k = tail;
            }
        }
    }
    marks
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
