//! Structured observability hooks for replication runs.
//!
//! This module provides:
//! - Run- and candidate-scoped tracing spans
//! - Emission functions for lifecycle events: run start/finish, candidate
//!   classification, acquisition attempts
//!
//! Events are emitted at `info!` (failures at `warn!`) with an `event` field
//! so JSON log lines can be filtered by event name.

use tracing::{info, warn, Span};

use crate::model::{CandidateOutcome, RunSummary};

/// Span for a whole run; attach with `tracing::Instrument`.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("replica.run", run_id = %run_id)
}

/// Span carrying the identifying fields of one candidate.
pub fn candidate_span(number: u64, title: &str, branch: &str) -> Span {
    tracing::info_span!("replica.candidate", pr = number, title = %title, branch = %branch)
}

pub fn emit_run_started(run_id: &str, upstream: &str, fork: &str) {
    info!(event = "run.started", run_id = %run_id, upstream = %upstream, fork = %fork);
}

pub fn emit_run_finished(run_id: &str, summary: &RunSummary, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        replicated = summary.replicated,
        skipped = summary.skipped,
        errored = summary.errored,
        total = summary.total,
        duration_ms = duration_ms,
    );
}

/// Emit the terminal classification of a candidate.
pub fn emit_candidate_outcome(outcome: &CandidateOutcome) {
    match outcome {
        CandidateOutcome::SkippedIneligible { reason } => {
            info!(event = "candidate.skipped", kind = "ineligible", reason = %reason);
        }
        CandidateOutcome::SkippedDuplicate { reason } => {
            info!(event = "candidate.skipped", kind = "duplicate", reason = %reason);
        }
        CandidateOutcome::Replicated {
            pr_number,
            url,
            strategy,
            forced_push,
            labels,
        } => {
            info!(
                event = "candidate.replicated",
                tracking_pr = pr_number,
                url = %url,
                strategy = %strategy,
                forced_push = forced_push,
                labels = %labels.join(","),
            );
        }
        CandidateOutcome::Errored { stage, reason } => {
            warn!(event = "candidate.errored", stage = stage.as_str(), reason = %reason);
        }
    }
}

pub fn emit_attempt(strategy: &str, success: bool, duration_ms: u64, diagnostic: &str) {
    if success {
        info!(event = "acquire.attempt", strategy = %strategy, success, duration_ms);
    } else {
        warn!(
            event = "acquire.attempt",
            strategy = %strategy,
            success,
            duration_ms,
            diagnostic = %diagnostic,
        );
    }
}
