//! Push an acquired working copy to the fork and open its tracking request.

use tracing::{info, warn};

use crate::config::{RepoSlug, ReplicaConfig};
use crate::error::{ForgeError, GitError};
use crate::forge::{Forge, NewPull};
use crate::git::GitOps;
use crate::guard::replica_title;
use crate::ladder::WorkingCopy;
use crate::model::ReplicationCandidate;

/// Remote name used for the fork inside a working copy.
pub const FORK_REMOTE: &str = "fork";

/// Labels attached to tracking requests when the fork defines them.
pub const REPLICA_LABELS: [&str; 2] = ["replica", "upstream"];

const EMPTY_DESCRIPTION: &str = "_No description provided._";

/// A tracking request that now exists in the fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub pr_number: u64,
    pub url: String,
    pub labels: Vec<String>,
    pub forced_push: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("push of {local} to {target} failed: {source}")]
    Push {
        local: String,
        target: String,
        #[source]
        source: GitError,
    },

    #[error("preparing working copy failed: {0}")]
    Prepare(#[source] GitError),

    #[error("creating tracking request failed: {0}")]
    CreatePull(#[source] ForgeError),
}

pub type PublicationOutcome = Result<Publication, PublishError>;

/// Body of a tracking request. Downstream tooling parses this layout.
pub fn tracking_body(candidate: &ReplicationCandidate, source: &RepoSlug) -> String {
    let description = candidate
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(EMPTY_DESCRIPTION);
    format!(
        "This PR replicates the original upstream PR: {url}\n\n\
         **Original author:** @{author}\n\
         **Original branch:** `{branch}`\n\
         **Source repository:** {source}\n\n\
         ---\n\n\
         {description}",
        url = candidate.html_url,
        author = candidate.author,
        branch = candidate.branch,
    )
}

pub struct Publisher<'a> {
    git: &'a dyn GitOps,
    forge: &'a dyn Forge,
    config: &'a ReplicaConfig,
}

impl<'a> Publisher<'a> {
    pub fn new(git: &'a dyn GitOps, forge: &'a dyn Forge, config: &'a ReplicaConfig) -> Self {
        Self { git, forge, config }
    }

    /// Transfer `copy` to `target_branch` on the fork and open a tracking
    /// request against `default_branch`.
    pub async fn publish(
        &self,
        copy: &WorkingCopy,
        target_branch: &str,
        candidate: &ReplicationCandidate,
        source: &RepoSlug,
        default_branch: &str,
    ) -> PublicationOutcome {
        let fork = &self.config.fork;
        let fork_url = self.config.authenticated_url(fork);
        self.git
            .ensure_remote(&copy.path, FORK_REMOTE, &fork_url)
            .await
            .map_err(PublishError::Prepare)?;
        let local = self
            .git
            .current_branch(&copy.path)
            .await
            .map_err(PublishError::Prepare)?;

        let forced_push = self.push(copy, &local, target_branch).await?;

        let pull = NewPull {
            title: replica_title(&candidate.title),
            body: tracking_body(candidate, source),
            head: target_branch.to_string(),
            base: default_branch.to_string(),
        };
        let created = self
            .forge
            .create_pull(fork, &pull)
            .await
            .map_err(PublishError::CreatePull)?;
        info!(pr = created.number, url = %created.html_url, "opened tracking request");

        let labels = self.apply_labels(created.number).await;

        Ok(Publication {
            pr_number: created.number,
            url: created.html_url,
            labels,
            forced_push,
        })
    }

    /// Returns whether the forced fallback was needed.
    async fn push(
        &self,
        copy: &WorkingCopy,
        local: &str,
        target: &str,
    ) -> Result<bool, PublishError> {
        let push_error = |source| PublishError::Push {
            local: local.to_string(),
            target: target.to_string(),
            source,
        };
        match self
            .git
            .push(&copy.path, FORK_REMOTE, local, target, false)
            .await
        {
            Ok(()) => Ok(false),
            Err(err) if err.is_push_rejection() => {
                warn!(
                    branch = %target,
                    error = %err,
                    "push rejected; overwriting fork branch with forced push"
                );
                self.git
                    .push(&copy.path, FORK_REMOTE, local, target, true)
                    .await
                    .map_err(push_error)?;
                Ok(true)
            }
            Err(err) => Err(push_error(err)),
        }
    }

    /// Attach whichever of [`REPLICA_LABELS`] the fork defines.
    async fn apply_labels(&self, number: u64) -> Vec<String> {
        let fork = &self.config.fork;
        let available = match self.forge.list_labels(fork).await {
            Ok(labels) => labels,
            Err(err) => {
                warn!(pr = number, error = %err, "could not list fork labels; skipping labels");
                return Vec::new();
            }
        };
        let wanted: Vec<String> = REPLICA_LABELS
            .iter()
            .filter(|label| available.iter().any(|a| a == *label))
            .map(|label| label.to_string())
            .collect();
        if wanted.is_empty() {
            return wanted;
        }
        match self.forge.add_labels(fork, number, &wanted).await {
            Ok(()) => wanted,
            Err(err) => {
                warn!(pr = number, error = %err, "could not label tracking request");
                Vec::new()
            }
        }
    }
}
