//! Run loop: list, filter, guard, acquire, publish, one candidate at a time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tempfile::TempDir;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::{GitIdentity, ReplicaConfig};
use crate::eligibility::is_eligible;
use crate::error::{ReplicaError, Result};
use crate::forge::Forge;
use crate::git::GitOps;
use crate::guard::{self, ForkSnapshot};
use crate::ladder::{AcquisitionResult, Ladder};
use crate::model::{
    CandidateOutcome, CandidateReport, RepoRef, ReplicationCandidate, RunReport, RunSummary,
    Stage,
};
use crate::obs;
use crate::publisher::Publisher;

/// Facts read once at the start of a run and shared by every candidate.
struct RunContext {
    identity: GitIdentity,
    default_branch: String,
    snapshot: ForkSnapshot,
}

/// Mirrors open upstream pull requests into the configured fork.
pub struct Replicator {
    config: ReplicaConfig,
    forge: Arc<dyn Forge>,
    git: Arc<dyn GitOps>,
}

impl Replicator {
    pub fn new(config: ReplicaConfig, forge: Arc<dyn Forge>, git: Arc<dyn GitOps>) -> Self {
        Self { config, forge, git }
    }

    /// Process every open upstream pull request once.
    ///
    /// Per-candidate failures are recorded in the report and never abort the
    /// run. An `Err` means the run could not start: the fork's metadata or
    /// the upstream listing was unavailable.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        obs::emit_run_started(
            &run_id,
            &self.config.upstream.to_string(),
            &self.config.fork.to_string(),
        );

        let ctx = self.prepare().await?;
        let mut candidates = self
            .forge
            .list_open_pulls(&self.config.upstream)
            .await
            .map_err(|e| ReplicaError::forge("listing upstream pull requests", e))?;
        if let Some(max) = self.config.max_candidates {
            candidates.truncate(max);
        }
        info!(count = candidates.len(), "considering upstream pull requests");

        let mut summary = RunSummary::default();
        let mut reports = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let span = obs::candidate_span(candidate.number, &candidate.title, &candidate.branch);
            let outcome = async {
                let outcome = self.guarded(&candidate, &ctx).await;
                obs::emit_candidate_outcome(&outcome);
                outcome
            }
            .instrument(span)
            .await;

            summary.record(&outcome);
            reports.push(CandidateReport {
                number: candidate.number,
                title: candidate.title,
                branch: candidate.branch,
                outcome,
            });
        }

        let disposition = summary.disposition();
        obs::emit_run_finished(&run_id, &summary, clock.elapsed().as_millis() as u64);
        Ok(RunReport {
            run_id,
            upstream: self.config.upstream.clone(),
            fork: self.config.fork.clone(),
            started_at,
            finished_at: Utc::now(),
            summary,
            disposition,
            candidates: reports,
        })
    }

    async fn prepare(&self) -> Result<RunContext> {
        let identity = self.resolve_identity().await;

        let fork = self
            .forge
            .get_repository(&self.config.fork)
            .await
            .map_err(|e| ReplicaError::forge("reading fork metadata", e))?;
        if fork.can_push == Some(false) {
            warn!(fork = %fork.slug, "token lacks push permission on the fork; pushes will fail");
        }

        let snapshot = ForkSnapshot::load(self.forge.as_ref(), &self.config.fork).await;
        info!(
            default_branch = %fork.default_branch,
            existing_pulls = snapshot.len(),
            "loaded fork state"
        );

        Ok(RunContext {
            identity,
            default_branch: fork.default_branch,
            snapshot,
        })
    }

    /// Explicit identity, else the token's account, else the bot default.
    async fn resolve_identity(&self) -> GitIdentity {
        if let Some(identity) = &self.config.identity {
            return identity.clone();
        }
        match self.forge.current_user().await {
            Ok(user) => {
                info!(login = %user.login, "authenticated");
                GitIdentity::for_account(&user.login, user.id)
            }
            Err(err) => {
                warn!(error = %err, "could not read authenticated identity; using default");
                GitIdentity::default()
            }
        }
    }

    /// Outermost per-candidate boundary: a panic becomes an errored candidate.
    async fn guarded(
        &self,
        candidate: &ReplicationCandidate,
        ctx: &RunContext,
    ) -> CandidateOutcome {
        match AssertUnwindSafe(self.process(candidate, ctx))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                CandidateOutcome::Errored {
                    stage: Stage::Internal,
                    reason: format!("internal error: {detail}"),
                }
            }
        }
    }

    async fn process(
        &self,
        candidate: &ReplicationCandidate,
        ctx: &RunContext,
    ) -> CandidateOutcome {
        let verdict = is_eligible(&candidate.title);
        if !verdict.eligible {
            return CandidateOutcome::SkippedIneligible {
                reason: verdict.reason.unwrap_or_default(),
            };
        }

        match guard::check(
            self.forge.as_ref(),
            &self.config.fork,
            candidate,
            &ctx.snapshot,
        )
        .await
        {
            Ok(Some(reason)) => {
                return CandidateOutcome::SkippedDuplicate {
                    reason: reason.describe(candidate),
                }
            }
            Ok(None) => {}
            Err(err) => {
                return CandidateOutcome::Errored {
                    stage: Stage::Guard,
                    reason: format!(
                        "could not confirm branch '{}' is absent from the fork: {err}",
                        candidate.branch
                    ),
                }
            }
        }

        let Some(source) = &candidate.source else {
            return CandidateOutcome::Errored {
                stage: Stage::Source,
                reason: "source repository no longer exists".to_string(),
            };
        };

        let scratch = match self.scratch_dir(candidate.number) {
            Ok(dir) => dir,
            Err(err) => {
                return CandidateOutcome::Errored {
                    stage: Stage::Acquire,
                    reason: format!("could not create working directory: {err}"),
                }
            }
        };

        let outcome = self.transfer(candidate, source, &scratch, ctx).await;

        let path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!(path = %path.display(), error = %err, "could not remove working directory");
        }
        outcome
    }

    async fn transfer(
        &self,
        candidate: &ReplicationCandidate,
        source: &RepoRef,
        scratch: &TempDir,
        ctx: &RunContext,
    ) -> CandidateOutcome {
        let ladder = Ladder::new(
            self.git.as_ref(),
            self.forge.as_ref(),
            &self.config,
            &ctx.identity,
        );
        let acquired = ladder
            .acquire(source, &candidate.branch, scratch.path())
            .await;
        let copy = match &acquired {
            AcquisitionResult::Acquired { copy, .. } => copy,
            AcquisitionResult::Exhausted { attempts } => {
                return CandidateOutcome::Errored {
                    stage: Stage::Acquire,
                    reason: format!(
                        "all {} acquisition strategies failed for {}@{}: {}",
                        attempts.len(),
                        source.slug,
                        candidate.branch,
                        acquired.failure_report()
                    ),
                };
            }
        };

        let publisher = Publisher::new(self.git.as_ref(), self.forge.as_ref(), &self.config);
        match publisher
            .publish(
                copy,
                &candidate.branch,
                candidate,
                &source.slug,
                &ctx.default_branch,
            )
            .await
        {
            Ok(publication) => CandidateOutcome::Replicated {
                pr_number: publication.pr_number,
                url: publication.url,
                strategy: copy.strategy,
                forced_push: publication.forced_push,
                labels: publication.labels,
            },
            Err(err) => CandidateOutcome::Errored {
                stage: Stage::Publish,
                reason: err.to_string(),
            },
        }
    }

    fn scratch_dir(&self, number: u64) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("replica-pr-{number}-");
        builder.prefix(&prefix);
        match &self.config.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}
