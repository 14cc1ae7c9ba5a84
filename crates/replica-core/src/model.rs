//! Domain types shared by the pipeline components.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RepoSlug;
use crate::error::Result;
use crate::ladder::StrategyTag;

/// Repository identity plus the visibility facts the ladder cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub slug: RepoSlug,
    pub private: bool,
    pub fork: bool,
}

/// Snapshot of one open upstream pull request, taken at listing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCandidate {
    pub number: u64,
    pub title: String,
    /// Head branch of the contributor's pull request.
    pub branch: String,
    /// Head repository. `None` once the contributor deleted their fork.
    pub source: Option<RepoRef>,
    pub author: String,
    pub description: Option<String>,
    pub base_branch: String,
    pub html_url: String,
}

/// Outcome of the title filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl EligibilityVerdict {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn ineligible(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Pipeline stage at which a candidate errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Guard,
    Acquire,
    Publish,
    /// A panic escaped the pipeline for this candidate.
    Internal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Guard => "guard",
            Stage::Acquire => "acquire",
            Stage::Publish => "publish",
            Stage::Internal => "internal",
        }
    }
}

/// Terminal state of one candidate. Exactly one per candidate per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    SkippedIneligible {
        reason: String,
    },
    SkippedDuplicate {
        reason: String,
    },
    Replicated {
        pr_number: u64,
        url: String,
        strategy: StrategyTag,
        forced_push: bool,
        /// Labels attached to the tracking request; empty when labelling failed.
        labels: Vec<String>,
    },
    Errored {
        stage: Stage,
        reason: String,
    },
}

/// Per-candidate entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub number: u64,
    pub title: String,
    pub branch: String,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Monotonic counters accumulated across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub replicated: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::SkippedIneligible { .. }
            | CandidateOutcome::SkippedDuplicate { .. } => self.skipped += 1,
            CandidateOutcome::Replicated { .. } => self.replicated += 1,
            CandidateOutcome::Errored { .. } => self.errored += 1,
        }
        self.total += 1;
    }

    pub fn disposition(&self) -> RunDisposition {
        match (self.errored, self.replicated) {
            (0, _) => RunDisposition::Success,
            (_, 0) => RunDisposition::Failed,
            _ => RunDisposition::Degraded,
        }
    }
}

/// Process-level verdict derived from the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDisposition {
    Success,
    /// Errors occurred but at least one replication succeeded.
    Degraded,
    Failed,
}

impl RunDisposition {
    /// Binary view: degraded runs count as success with warnings.
    pub fn is_success(&self) -> bool {
        !matches!(self, RunDisposition::Failed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Everything a run decided, in listing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub upstream: RepoSlug,
    pub fork: RepoSlug,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub disposition: RunDisposition,
    pub candidates: Vec<CandidateReport>,
}

impl RunReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
