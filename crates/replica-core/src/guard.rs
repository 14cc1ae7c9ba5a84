//! Duplicate suppression against what the fork already holds.
//!
//! The guard over-approximates: any one matching signal marks a candidate as
//! already replicated, trading a missed replication for never opening a
//! duplicate.

use std::collections::HashSet;

use tracing::warn;

use crate::config::RepoSlug;
use crate::error::ForgeResult;
use crate::forge::{Forge, ForkPull};
use crate::model::ReplicationCandidate;

/// Title prefix of every tracking request this tool opens.
pub const REPLICA_MARKER: &str = "Replica: ";

/// Tracking-request title for an upstream title.
pub fn replica_title(title: &str) -> String {
    format!("{REPLICA_MARKER}{title}")
}

/// Point-in-time view of the fork's pull requests (any state).
#[derive(Debug, Clone, Default)]
pub struct ForkSnapshot {
    titles: HashSet<String>,
    head_branches: HashSet<String>,
}

impl ForkSnapshot {
    pub fn from_pulls(pulls: &[ForkPull]) -> Self {
        Self {
            titles: pulls.iter().map(|p| p.title.clone()).collect(),
            head_branches: pulls.iter().map(|p| p.head_branch.clone()).collect(),
        }
    }

    /// Read the fork's pull requests, degrading to an empty snapshot when the
    /// forge cannot be queried.
    pub async fn load(forge: &dyn Forge, fork: &RepoSlug) -> Self {
        match forge.list_all_pulls(fork).await {
            Ok(pulls) => Self::from_pulls(&pulls),
            Err(err) => {
                warn!(
                    fork = %fork,
                    status = ?err.status(),
                    error = %err,
                    "could not list fork pull requests; assuming none are replicated"
                );
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty() && self.head_branches.is_empty()
    }
}

/// Why a candidate counts as already replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateReason {
    TitleMatch,
    HeadBranchMatch,
    BranchExists,
}

impl DuplicateReason {
    pub fn describe(&self, candidate: &ReplicationCandidate) -> String {
        match self {
            DuplicateReason::TitleMatch => format!(
                "fork already has a pull request titled '{}'",
                replica_title(&candidate.title)
            ),
            DuplicateReason::HeadBranchMatch => format!(
                "fork already has a pull request from branch '{}'",
                candidate.branch
            ),
            DuplicateReason::BranchExists => {
                format!("branch '{}' already exists in the fork", candidate.branch)
            }
        }
    }
}

/// Pure duplicate check over the snapshot and a known branch-existence fact.
pub fn already_replicated(
    candidate: &ReplicationCandidate,
    snapshot: &ForkSnapshot,
    branch_exists: bool,
) -> Option<DuplicateReason> {
    if snapshot.titles.contains(&replica_title(&candidate.title)) {
        Some(DuplicateReason::TitleMatch)
    } else if snapshot.head_branches.contains(&candidate.branch) {
        Some(DuplicateReason::HeadBranchMatch)
    } else if branch_exists {
        Some(DuplicateReason::BranchExists)
    } else {
        None
    }
}

/// Full guard: snapshot first, then the live branch query. A failing
/// branch query is returned as an error so the caller never pushes blind.
pub async fn check(
    forge: &dyn Forge,
    fork: &RepoSlug,
    candidate: &ReplicationCandidate,
    snapshot: &ForkSnapshot,
) -> ForgeResult<Option<DuplicateReason>> {
    if let Some(reason) = already_replicated(candidate, snapshot, false) {
        return Ok(Some(reason));
    }
    let exists = forge.branch_exists(fork, &candidate.branch).await?;
    Ok(already_replicated(candidate, snapshot, exists))
}
