//! End-to-end runs of the replicator against in-memory capabilities.

use std::path::Path;
use std::sync::Arc;

use replica_core::fakes::{ForgeOp, GitOp, MemoryForge, ScriptedGit};
use replica_core::{
    CandidateOutcome, ForkPull, GitIdentity, RepoMetadata, RepoRef, RepoSlug, ReplicaConfig,
    ReplicaError, ReplicationCandidate, Replicator, RunDisposition, RunReport, Stage, StrategyTag,
};

const TOKEN: &str = "ghp_pipeline_secret";

fn upstream() -> RepoSlug {
    RepoSlug::new("upstream", "project")
}

fn fork() -> RepoSlug {
    RepoSlug::new("me", "project")
}

fn config(work_root: &Path) -> ReplicaConfig {
    ReplicaConfig::new(TOKEN, "upstream/project", "me/project")
        .unwrap()
        .with_work_root(work_root.to_path_buf())
        .with_identity(GitIdentity::new("Replica Test", "replica@example.com"))
}

fn fork_metadata() -> RepoMetadata {
    RepoMetadata {
        slug: fork(),
        default_branch: "main".to_string(),
        private: false,
        fork: true,
        can_push: Some(true),
    }
}

fn candidate(number: u64, title: &str, branch: &str, owner: &str) -> ReplicationCandidate {
    ReplicationCandidate {
        number,
        title: title.to_string(),
        branch: branch.to_string(),
        source: Some(RepoRef {
            slug: RepoSlug::new(owner, "project"),
            private: false,
            fork: true,
        }),
        author: owner.to_string(),
        description: Some(format!("Body of #{number}")),
        base_branch: "main".to_string(),
        html_url: format!("https://github.com/upstream/project/pull/{number}"),
    }
}

fn base_forge() -> MemoryForge {
    MemoryForge::new()
        .with_repository(fork_metadata())
        .with_labels(&fork(), &["bug", "replica", "upstream"])
}

async fn run(
    forge: &Arc<MemoryForge>,
    git: &Arc<ScriptedGit>,
    config: ReplicaConfig,
) -> RunReport {
    Replicator::new(config, forge.clone(), git.clone())
        .run()
        .await
        .expect("run starts")
}

fn assert_summary_consistent(report: &RunReport) {
    let s = report.summary;
    assert_eq!(s.total, s.replicated + s.skipped + s.errored);
    assert_eq!(s.total, report.candidates.len());
}

#[tokio::test]
async fn replicates_feature_pull_request() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(base_forge().with_open_pull(
        &upstream(),
        candidate(12, "Add retry support", "feature/retry", "contrib"),
    ));
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.replicated, 1);
    assert_eq!(report.summary.skipped, 0);
    assert_eq!(report.summary.errored, 0);
    assert_eq!(report.disposition, RunDisposition::Success);
    assert_summary_consistent(&report);

    match &report.candidates[0].outcome {
        CandidateOutcome::Replicated {
            strategy,
            forced_push,
            pr_number,
            url,
            labels,
        } => {
            assert_eq!(*strategy, StrategyTag::ShallowClone);
            assert!(!forced_push);
            assert!(url.ends_with(&format!("/pull/{pr_number}")));
            assert_eq!(labels, &["replica".to_string(), "upstream".to_string()]);
        }
        other => panic!("expected replication, got {other:?}"),
    }

    let created = forge.created_pulls();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Replica: Add retry support");
    assert_eq!(created[0].head, "feature/retry");
    assert_eq!(created[0].base, "main");
    assert!(created[0].body.starts_with(
        "This PR replicates the original upstream PR: https://github.com/upstream/project/pull/12"
    ));
    assert!(created[0].body.contains("**Source repository:** contrib/project"));

    let labels = forge.applied_labels();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].1, vec!["replica".to_string(), "upstream".to_string()]);

    let pushes = git.calls_of(GitOp::Push);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].subject, "feature/retry:feature/retry");
}

#[tokio::test]
async fn ineligible_candidate_makes_no_remote_calls() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(base_forge().with_open_pull(
        &upstream(),
        candidate(3, "chore: tidy up", "chore/tidy", "contrib"),
    ));
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.skipped, 1);
    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::SkippedIneligible { .. }
    ));
    assert_eq!(forge.call_count(ForgeOp::BranchExists), 0);
    assert_eq!(forge.call_count(ForgeOp::CreatePull), 0);
    assert!(git.calls().is_empty());
}

#[tokio::test]
async fn one_exhausted_candidate_degrades_the_run() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Fix parser", "fix/parser", "gone"))
            .with_open_pull(
                &upstream(),
                candidate(2, "Add retry support", "feature/retry", "contrib"),
            ),
    );
    let git = Arc::new(ScriptedGit::new().fail(
        GitOp::Clone,
        Some("gone/project"),
        "remote: Repository not found.",
    ));

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.replicated, 1);
    assert_eq!(report.summary.errored, 1);
    assert_eq!(report.disposition, RunDisposition::Degraded);
    assert_eq!(report.disposition.exit_code(), 0);
    assert_summary_consistent(&report);

    match &report.candidates[0].outcome {
        CandidateOutcome::Errored { stage, reason } => {
            assert_eq!(*stage, Stage::Acquire);
            for tag in StrategyTag::LADDER {
                assert!(reason.contains(tag.as_str()), "{reason}");
            }
            assert!(!reason.contains(TOKEN));
        }
        other => panic!("expected acquisition error, got {other:?}"),
    }
}

#[tokio::test]
async fn only_errors_fail_the_run() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge().with_open_pull(&upstream(), candidate(1, "Fix parser", "fix/parser", "gone")),
    );
    let git = Arc::new(ScriptedGit::new().fail(GitOp::Clone, None, "fatal: unreachable"));

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.disposition, RunDisposition::Failed);
    assert_eq!(report.disposition.exit_code(), 1);
}

#[tokio::test]
async fn second_run_skips_everything_replicated_by_the_first() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a"))
            .with_open_pull(&upstream(), candidate(2, "Support IPv6", "feature/ipv6", "b")),
    );
    let git = Arc::new(ScriptedGit::new());

    let first = run(&forge, &git, config(work.path())).await;
    assert_eq!(first.summary.replicated, 2);

    let second = run(&forge, &git, config(work.path())).await;
    assert_eq!(second.summary.replicated, 0);
    assert_eq!(second.summary.skipped, 2);
    assert!(second
        .candidates
        .iter()
        .all(|c| matches!(c.outcome, CandidateOutcome::SkippedDuplicate { .. })));
    assert_eq!(forge.created_pulls().len(), 2);
    assert_eq!(git.calls_of(GitOp::Push).len(), 2);
}

#[tokio::test]
async fn existing_fork_pull_or_branch_is_a_duplicate() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_pull(
                &fork(),
                ForkPull {
                    number: 9,
                    title: "Replica: Add retry support".to_string(),
                    head_branch: "something-else".to_string(),
                },
            )
            .with_branch(&fork(), "feature/ipv6")
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a"))
            .with_open_pull(&upstream(), candidate(2, "Support IPv6", "feature/ipv6", "b")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.skipped, 2);
    assert!(git.calls().is_empty());
}

#[tokio::test]
async fn failing_branch_check_errors_the_candidate() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .failing(ForgeOp::BranchExists, 502)
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Errored {
            stage: Stage::Guard,
            ..
        }
    ));
    assert!(git.calls_of(GitOp::Push).is_empty());
}

#[tokio::test]
async fn failing_snapshot_query_degrades_to_branch_check() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .failing(ForgeOp::ListAllPulls, 500)
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.replicated, 1);
    assert_eq!(forge.call_count(ForgeOp::BranchExists), 1);
}

#[tokio::test]
async fn rejected_push_falls_back_to_forced_push() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new().fail_once(
        GitOp::Push,
        Some("feature/retry"),
        " ! [rejected]        feature/retry -> feature/retry (non-fast-forward)",
    ));

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Replicated {
            forced_push: true,
            ..
        }
    ));
    let pushes = git.calls_of(GitOp::Push);
    assert_eq!(pushes.len(), 2);
    assert!(pushes[1].subject.ends_with(":force"));
}

#[tokio::test]
async fn other_push_failures_are_not_forced() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new().fail(
        GitOp::Push,
        None,
        "remote: Permission to me/project.git denied",
    ));

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Errored {
            stage: Stage::Publish,
            ..
        }
    ));
    assert_eq!(git.calls_of(GitOp::Push).len(), 1);
    assert_eq!(forge.call_count(ForgeOp::CreatePull), 0);
}

#[tokio::test]
async fn archive_snapshot_is_pushed_to_the_source_branch_name() {
    let work = tempfile::tempdir().unwrap();
    let mut private = candidate(4, "Add retry support", "feature/retry", "secretive");
    if let Some(source) = private.source.as_mut() {
        source.private = true;
    }
    let forge = Arc::new(
        base_forge()
            .with_archive(
                &RepoSlug::new("secretive", "project"),
                "feature/retry",
                b"snapshot".to_vec(),
            )
            .with_open_pull(&upstream(), private),
    );
    let git = Arc::new(ScriptedGit::new().fail(
        GitOp::Clone,
        None,
        "remote: Repository not found.",
    ));

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Replicated {
            strategy: StrategyTag::Archive,
            ..
        }
    ));
    let pushes = git.calls_of(GitOp::Push);
    assert_eq!(pushes[0].subject, "main:feature/retry");
    assert_eq!(forge.created_pulls()[0].head, "feature/retry");
}

#[tokio::test]
async fn deleted_source_repository_is_an_error() {
    let work = tempfile::tempdir().unwrap();
    let mut orphan = candidate(5, "Add retry support", "feature/retry", "a");
    orphan.source = None;
    let forge = Arc::new(base_forge().with_open_pull(&upstream(), orphan));
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Errored {
            stage: Stage::Source,
            ..
        }
    ));
    assert!(git.calls().is_empty());
}

#[tokio::test]
async fn scratch_directories_are_removed() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a"))
            .with_open_pull(&upstream(), candidate(2, "Fix parser", "fix/parser", "gone")),
    );
    let git = Arc::new(ScriptedGit::new().fail(GitOp::Clone, Some("gone/"), "fatal"));

    run(&forge, &git, config(work.path())).await;

    let leftovers: Vec<_> = std::fs::read_dir(work.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn missing_labels_do_not_block_replication() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        MemoryForge::new()
            .with_repository(fork_metadata())
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;

    assert_eq!(report.summary.replicated, 1);
    assert_eq!(forge.call_count(ForgeOp::AddLabels), 0);
}

#[tokio::test]
async fn identity_is_derived_from_the_authenticated_account() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_user("mirror-bot", 4242)
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new());
    let config = ReplicaConfig::new(TOKEN, "upstream/project", "me/project")
        .unwrap()
        .with_work_root(work.path().to_path_buf());

    run(&forge, &git, config).await;

    let identities = git.identities();
    assert!(!identities.is_empty());
    assert_eq!(identities[0].name, "mirror-bot");
    assert_eq!(
        identities[0].email,
        "4242+mirror-bot@users.noreply.github.com"
    );
}

#[tokio::test]
async fn failing_label_calls_do_not_block_replication() {
    for op in [ForgeOp::ListLabels, ForgeOp::AddLabels] {
        let work = tempfile::tempdir().unwrap();
        let forge = Arc::new(base_forge().failing(op, 403).with_open_pull(
            &upstream(),
            candidate(1, "Add retry support", "feature/retry", "a"),
        ));
        let git = Arc::new(ScriptedGit::new());

        let report = run(&forge, &git, config(work.path())).await;

        assert_eq!(report.summary.replicated, 1, "{op:?}");
        assert_eq!(report.summary.errored, 0, "{op:?}");
        assert_eq!(report.disposition, RunDisposition::Success);
        match &report.candidates[0].outcome {
            CandidateOutcome::Replicated { labels, .. } => assert!(labels.is_empty(), "{op:?}"),
            other => panic!("expected replication with {op:?} failing, got {other:?}"),
        }
        assert_eq!(forge.created_pulls().len(), 1);
        assert!(forge.applied_labels().is_empty());
    }
}

#[tokio::test]
async fn unknown_account_falls_back_to_default_identity() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(base_forge().with_open_pull(
        &upstream(),
        candidate(1, "Add retry support", "feature/retry", "a"),
    ));
    let git = Arc::new(ScriptedGit::new());
    let config = ReplicaConfig::new(TOKEN, "upstream/project", "me/project")
        .unwrap()
        .with_work_root(work.path().to_path_buf());

    let report = run(&forge, &git, config).await;

    assert_eq!(forge.call_count(ForgeOp::CurrentUser), 1);
    assert_eq!(report.summary.replicated, 1);
    let identities = git.identities();
    assert!(!identities.is_empty());
    assert!(identities.iter().all(|id| *id == GitIdentity::default()));
}

#[tokio::test]
async fn panicking_candidate_is_isolated() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Fix parser", "fix/parser", "boom"))
            .with_open_pull(
                &upstream(),
                candidate(2, "Add retry support", "feature/retry", "contrib"),
            ),
    );
    let git = Arc::new(ScriptedGit::new().panic_on(GitOp::Clone, Some("boom/")));

    let report = run(&forge, &git, config(work.path())).await;

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Errored {
            stage: Stage::Internal,
            ..
        }
    ));
    assert!(matches!(
        report.candidates[1].outcome,
        CandidateOutcome::Replicated { .. }
    ));
    assert_eq!(report.summary.errored, 1);
    assert_eq!(report.summary.replicated, 1);
    assert_eq!(report.disposition, RunDisposition::Degraded);
    assert_summary_consistent(&report);

    let leftovers: Vec<_> = std::fs::read_dir(work.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn max_candidates_caps_the_run() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a"))
            .with_open_pull(&upstream(), candidate(2, "Support IPv6", "feature/ipv6", "b")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path()).with_max_candidates(1)).await;

    assert_eq!(report.summary.total, 1);
    assert_eq!(report.candidates[0].number, 1);
}

#[tokio::test]
async fn unreadable_fork_aborts_before_any_candidate() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        MemoryForge::new()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a")),
    );
    let git = Arc::new(ScriptedGit::new());

    let err = Replicator::new(config(work.path()), forge.clone(), git.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplicaError::Forge { .. }));
    assert_eq!(forge.call_count(ForgeOp::ListOpenPulls), 0);
}

#[tokio::test]
async fn failing_upstream_listing_aborts_the_run() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(base_forge().failing(ForgeOp::ListOpenPulls, 401));
    let git = Arc::new(ScriptedGit::new());

    let result = Replicator::new(config(work.path()), forge.clone(), git.clone())
        .run()
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn report_serializes_with_summary_and_outcomes() {
    let work = tempfile::tempdir().unwrap();
    let forge = Arc::new(
        base_forge()
            .with_open_pull(&upstream(), candidate(1, "Add retry support", "feature/retry", "a"))
            .with_open_pull(&upstream(), candidate(2, "docs: typo", "docs/typo", "b")),
    );
    let git = Arc::new(ScriptedGit::new());

    let report = run(&forge, &git, config(work.path())).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["summary"]["total"], 2);
    assert_eq!(json["disposition"], "success");
    assert_eq!(json["candidates"][0]["outcome"], "replicated");
    assert_eq!(json["candidates"][1]["outcome"], "skipped_ineligible");
    assert_eq!(json["fork"]["owner"], "me");
    assert_eq!(json["fork"]["name"], "project");
}
