//! Escalating acquisition of a contributor's branch.
//!
//! [`Ladder::acquire`] walks [`StrategyTag::LADDER`] in order, each rung in a
//! freshly cleaned checkout directory, and stops at the first rung that
//! produces a working copy on a local branch. Every rung tried is recorded,
//! successful or not.

mod strategy;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{GitIdentity, ReplicaConfig};
use crate::error::{ForgeError, GitError};
use crate::forge::Forge;
use crate::git::GitOps;
use crate::model::RepoRef;
use crate::obs;

/// Name of the checkout directory inside a candidate's scratch space.
pub const CHECKOUT_DIR: &str = "checkout";

/// One rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// `--depth 1 --branch B --single-branch` over the credentialed URL.
    ShallowClone,
    /// Full clone over the credentialed URL, then checkout (fetching the
    /// branch by name if needed).
    FullClone,
    /// Full clone over the anonymous URL, for public sources.
    PublicRetry,
    /// Forge tarball, extracted and committed into a fresh history.
    Archive,
}

impl StrategyTag {
    pub const LADDER: [StrategyTag; 4] = [
        StrategyTag::ShallowClone,
        StrategyTag::FullClone,
        StrategyTag::PublicRetry,
        StrategyTag::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTag::ShallowClone => "shallow_clone",
            StrategyTag::FullClone => "full_clone",
            StrategyTag::PublicRetry => "public_retry",
            StrategyTag::Archive => "archive",
        }
    }
}

impl std::fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single rung failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("attempt timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Record of one rung.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub strategy: StrategyTag,
    /// What was run, with credentials redacted.
    pub operation: String,
    pub outcome: AttemptOutcome,
    pub diagnostic: String,
    pub duration_ms: u64,
}

impl AcquisitionAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Usable local content for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    pub path: PathBuf,
    /// Checked-out local branch. Differs from the source branch after the
    /// archive rung.
    pub local_branch: String,
    pub strategy: StrategyTag,
}

#[derive(Debug, Clone)]
pub enum AcquisitionResult {
    Acquired {
        copy: WorkingCopy,
        attempts: Vec<AcquisitionAttempt>,
    },
    Exhausted {
        attempts: Vec<AcquisitionAttempt>,
    },
}

impl AcquisitionResult {
    pub fn attempts(&self) -> &[AcquisitionAttempt] {
        match self {
            AcquisitionResult::Acquired { attempts, .. } => attempts,
            AcquisitionResult::Exhausted { attempts } => attempts,
        }
    }

    pub fn working_copy(&self) -> Option<&WorkingCopy> {
        match self {
            AcquisitionResult::Acquired { copy, .. } => Some(copy),
            AcquisitionResult::Exhausted { .. } => None,
        }
    }

    /// One line per attempt, for error reports.
    pub fn failure_report(&self) -> String {
        self.attempts()
            .iter()
            .map(|a| {
                format!(
                    "{} [{}] {}: {}",
                    a.strategy,
                    match a.outcome {
                        AttemptOutcome::Success => "ok",
                        AttemptOutcome::Failure => "failed",
                    },
                    a.operation,
                    a.diagnostic
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Inputs shared by every rung of one acquisition.
pub(crate) struct AttemptContext<'a> {
    pub source: &'a RepoRef,
    pub branch: &'a str,
    pub work_dir: &'a Path,
    pub checkout: PathBuf,
}

/// Runs the acquisition strategies against borrowed capabilities.
pub struct Ladder<'a> {
    git: &'a dyn GitOps,
    forge: &'a dyn Forge,
    config: &'a ReplicaConfig,
    identity: &'a GitIdentity,
}

impl<'a> Ladder<'a> {
    pub fn new(
        git: &'a dyn GitOps,
        forge: &'a dyn Forge,
        config: &'a ReplicaConfig,
        identity: &'a GitIdentity,
    ) -> Self {
        Self {
            git,
            forge,
            config,
            identity,
        }
    }

    /// Fetch `branch` of `source` into `work_dir/checkout`.
    pub async fn acquire(
        &self,
        source: &RepoRef,
        branch: &str,
        work_dir: &Path,
    ) -> AcquisitionResult {
        let ctx = AttemptContext {
            source,
            branch,
            work_dir,
            checkout: work_dir.join(CHECKOUT_DIR),
        };
        let mut attempts = Vec::with_capacity(StrategyTag::LADDER.len());

        for tag in StrategyTag::LADDER {
            let start = Instant::now();
            let operation = self.describe(tag, &ctx);
            let result = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.attempt(tag, &ctx),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AttemptError::TimedOut(self.config.attempt_timeout)),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(local_branch) => {
                    obs::emit_attempt(tag.as_str(), true, duration_ms, "");
                    attempts.push(AcquisitionAttempt {
                        strategy: tag,
                        operation,
                        outcome: AttemptOutcome::Success,
                        diagnostic: format!("checked out {local_branch}"),
                        duration_ms,
                    });
                    info!(strategy = %tag, local_branch = %local_branch, "acquired working copy");
                    return AcquisitionResult::Acquired {
                        copy: WorkingCopy {
                            path: ctx.checkout,
                            local_branch,
                            strategy: tag,
                        },
                        attempts,
                    };
                }
                Err(err) => {
                    let diagnostic = crate::git::redact_credentials(&err.to_string());
                    obs::emit_attempt(tag.as_str(), false, duration_ms, &diagnostic);
                    attempts.push(AcquisitionAttempt {
                        strategy: tag,
                        operation,
                        outcome: AttemptOutcome::Failure,
                        diagnostic,
                        duration_ms,
                    });
                }
            }
        }

        warn!(
            source = %source.slug,
            branch = %branch,
            attempts = attempts.len(),
            "every acquisition strategy failed"
        );
        AcquisitionResult::Exhausted { attempts }
    }

    /// Run one rung and leave identity configured in the working copy.
    async fn attempt(
        &self,
        tag: StrategyTag,
        ctx: &AttemptContext<'_>,
    ) -> Result<String, AttemptError> {
        strategy::reset_dir(&ctx.checkout).await?;
        let local_branch = match tag {
            StrategyTag::ShallowClone => self.shallow_clone(ctx).await?,
            StrategyTag::FullClone => {
                let url = self.config.authenticated_url(&ctx.source.slug);
                self.full_clone(&url, ctx).await?
            }
            StrategyTag::PublicRetry => self.public_retry(ctx).await?,
            StrategyTag::Archive => self.archive(ctx).await?,
        };
        self.git
            .configure_identity(&ctx.checkout, self.identity)
            .await?;
        Ok(local_branch)
    }
}
