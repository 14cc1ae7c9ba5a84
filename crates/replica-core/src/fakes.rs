//! In-memory fakes for the capability traits (testing only)
//!
//! [`MemoryForge`] keeps repositories, branches, pull requests and labels in
//! maps; [`ScriptedGit`] pretends to run git, creating directories where a
//! real clone would and failing on scripted rules.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{GitIdentity, RepoSlug};
use crate::error::{ForgeError, ForgeResult, GitError, GitResult};
use crate::forge::{CreatedPull, Forge, ForgeUser, ForkPull, NewPull, RepoMetadata};
use crate::git::{CloneOptions, GitOps};
use crate::model::ReplicationCandidate;

// ---------------------------------------------------------------------------
// MemoryForge
// ---------------------------------------------------------------------------

/// Forge operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForgeOp {
    ListOpenPulls,
    ListAllPulls,
    GetRepository,
    BranchExists,
    CreatePull,
    ListLabels,
    AddLabels,
    CurrentUser,
    DownloadArchive,
}

#[derive(Debug, Default)]
struct ForgeState {
    open_pulls: HashMap<RepoSlug, Vec<ReplicationCandidate>>,
    repos: HashMap<RepoSlug, RepoMetadata>,
    branches: HashMap<RepoSlug, HashSet<String>>,
    pulls: HashMap<RepoSlug, Vec<ForkPull>>,
    labels: HashMap<RepoSlug, Vec<String>>,
    applied_labels: Vec<(u64, Vec<String>)>,
    created: Vec<NewPull>,
    archives: HashMap<(RepoSlug, String), Vec<u8>>,
    user: Option<ForgeUser>,
    failures: HashMap<ForgeOp, u16>,
    calls: Vec<ForgeOp>,
    next_number: u64,
}

/// In-memory forge. Created pull requests become visible to later listings,
/// so consecutive runs observe each other.
#[derive(Debug, Default)]
pub struct MemoryForge {
    state: Mutex<ForgeState>,
}

impl MemoryForge {
    pub fn new() -> Self {
        let forge = Self::default();
        forge.state.lock().unwrap().next_number = 1000;
        forge
    }

    pub fn with_repository(self, meta: RepoMetadata) -> Self {
        self.state
            .lock()
            .unwrap()
            .repos
            .insert(meta.slug.clone(), meta);
        self
    }

    pub fn with_open_pull(self, repo: &RepoSlug, candidate: ReplicationCandidate) -> Self {
        self.state
            .lock()
            .unwrap()
            .open_pulls
            .entry(repo.clone())
            .or_default()
            .push(candidate);
        self
    }

    pub fn with_branch(self, repo: &RepoSlug, branch: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(repo.clone())
            .or_default()
            .insert(branch.to_string());
        self
    }

    pub fn with_pull(self, repo: &RepoSlug, pull: ForkPull) -> Self {
        self.state
            .lock()
            .unwrap()
            .pulls
            .entry(repo.clone())
            .or_default()
            .push(pull);
        self
    }

    pub fn with_labels(self, repo: &RepoSlug, labels: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .insert(repo.clone(), labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_archive(self, repo: &RepoSlug, branch: &str, bytes: Vec<u8>) -> Self {
        self.state
            .lock()
            .unwrap()
            .archives
            .insert((repo.clone(), branch.to_string()), bytes);
        self
    }

    pub fn with_user(self, login: &str, id: u64) -> Self {
        self.state.lock().unwrap().user = Some(ForgeUser {
            login: login.to_string(),
            id,
        });
        self
    }

    /// Make every call of `op` fail with HTTP `status`.
    pub fn failing(self, op: ForgeOp, status: u16) -> Self {
        self.state.lock().unwrap().failures.insert(op, status);
        self
    }

    pub fn created_pulls(&self) -> Vec<NewPull> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn applied_labels(&self) -> Vec<(u64, Vec<String>)> {
        self.state.lock().unwrap().applied_labels.clone()
    }

    pub fn calls(&self) -> Vec<ForgeOp> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: ForgeOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    fn enter(&self, op: ForgeOp) -> ForgeResult<std::sync::MutexGuard<'_, ForgeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        if let Some(status) = state.failures.get(&op) {
            return Err(ForgeError::from_status(
                *status,
                format!("injected failure for {op:?}"),
                false,
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl Forge for MemoryForge {
    async fn list_open_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ReplicationCandidate>> {
        let state = self.enter(ForgeOp::ListOpenPulls)?;
        Ok(state.open_pulls.get(repo).cloned().unwrap_or_default())
    }

    async fn list_all_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ForkPull>> {
        let state = self.enter(ForgeOp::ListAllPulls)?;
        Ok(state.pulls.get(repo).cloned().unwrap_or_default())
    }

    async fn get_repository(&self, repo: &RepoSlug) -> ForgeResult<RepoMetadata> {
        let state = self.enter(ForgeOp::GetRepository)?;
        state
            .repos
            .get(repo)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(repo.to_string()))
    }

    async fn branch_exists(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<bool> {
        let state = self.enter(ForgeOp::BranchExists)?;
        Ok(state
            .branches
            .get(repo)
            .is_some_and(|branches| branches.contains(branch)))
    }

    async fn create_pull(&self, repo: &RepoSlug, pull: &NewPull) -> ForgeResult<CreatedPull> {
        let mut state = self.enter(ForgeOp::CreatePull)?;
        state.next_number += 1;
        let number = state.next_number;
        state.created.push(pull.clone());
        state.pulls.entry(repo.clone()).or_default().push(ForkPull {
            number,
            title: pull.title.clone(),
            head_branch: pull.head.clone(),
        });
        state
            .branches
            .entry(repo.clone())
            .or_default()
            .insert(pull.head.clone());
        Ok(CreatedPull {
            number,
            html_url: format!("https://github.com/{repo}/pull/{number}"),
        })
    }

    async fn list_labels(&self, repo: &RepoSlug) -> ForgeResult<Vec<String>> {
        let state = self.enter(ForgeOp::ListLabels)?;
        Ok(state.labels.get(repo).cloned().unwrap_or_default())
    }

    async fn add_labels(
        &self,
        _repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> ForgeResult<()> {
        let mut state = self.enter(ForgeOp::AddLabels)?;
        state.applied_labels.push((number, labels.to_vec()));
        Ok(())
    }

    async fn current_user(&self) -> ForgeResult<ForgeUser> {
        let state = self.enter(ForgeOp::CurrentUser)?;
        state
            .user
            .clone()
            .ok_or_else(|| ForgeError::Unauthorized("no user configured".to_string()))
    }

    async fn download_archive(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<Vec<u8>> {
        let state = self.enter(ForgeOp::DownloadArchive)?;
        state
            .archives
            .get(&(repo.clone(), branch.to_string()))
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("{repo}@{branch}")))
    }
}

// ---------------------------------------------------------------------------
// ScriptedGit
// ---------------------------------------------------------------------------

/// Git operations, for scripting and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitOp {
    Clone,
    Checkout,
    Fetch,
    CurrentBranch,
    EnsureRemote,
    Push,
    ConfigureIdentity,
    Init,
    AddAll,
    Commit,
    UnpackArchive,
}

/// A recorded invocation. `subject` is the clone arguments plus url for
/// clones, the branch for checkout/fetch, `local:target[:force]` for pushes,
/// and the path otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCall {
    pub op: GitOp,
    pub subject: String,
}

#[derive(Debug, Clone)]
enum RuleAction {
    Fail(String),
    Hang,
    Panic,
}

#[derive(Debug, Clone)]
struct Rule {
    op: GitOp,
    contains: Option<String>,
    action: RuleAction,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct GitState {
    rules: Vec<Rule>,
    calls: Vec<GitCall>,
    heads: HashMap<PathBuf, String>,
    identities: Vec<GitIdentity>,
}

/// Scripted [`GitOps`]: succeeds unless a rule says otherwise.
#[derive(Debug, Default)]
pub struct ScriptedGit {
    state: Mutex<GitState>,
}

impl ScriptedGit {
    /// Branch checked out by a full clone or a fresh `init`.
    pub const DEFAULT_BRANCH: &'static str = "main";

    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `op` whose subject contains `contains` (any when `None`).
    pub fn fail(self, op: GitOp, contains: Option<&str>, stderr: &str) -> Self {
        self.rule(op, contains, RuleAction::Fail(stderr.to_string()), None)
    }

    /// Fail only the next matching `op`.
    pub fn fail_once(self, op: GitOp, contains: Option<&str>, stderr: &str) -> Self {
        self.rule(op, contains, RuleAction::Fail(stderr.to_string()), Some(1))
    }

    /// Never complete a matching `op`.
    pub fn hang(self, op: GitOp, contains: Option<&str>) -> Self {
        self.rule(op, contains, RuleAction::Hang, None)
    }

    /// Panic inside a matching `op`, after the call is recorded.
    pub fn panic_on(self, op: GitOp, contains: Option<&str>) -> Self {
        self.rule(op, contains, RuleAction::Panic, None)
    }

    fn rule(
        self,
        op: GitOp,
        contains: Option<&str>,
        action: RuleAction,
        remaining: Option<usize>,
    ) -> Self {
        self.state.lock().unwrap().rules.push(Rule {
            op,
            contains: contains.map(str::to_string),
            action,
            remaining,
        });
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, op: GitOp) -> Vec<GitCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn identities(&self) -> Vec<GitIdentity> {
        self.state.lock().unwrap().identities.clone()
    }

    /// Record the call and apply the first matching rule.
    async fn step(&self, op: GitOp, subject: &str) -> GitResult<()> {
        let action = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(GitCall {
                op,
                subject: subject.to_string(),
            });
            let matched = state.rules.iter_mut().find(|rule| {
                rule.op == op
                    && rule.remaining != Some(0)
                    && rule
                        .contains
                        .as_deref()
                        .map_or(true, |needle| subject.contains(needle))
            });
            match matched {
                Some(rule) => {
                    if let Some(remaining) = rule.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    Some(rule.action.clone())
                }
                None => None,
            }
        };

        match action {
            None => Ok(()),
            Some(RuleAction::Fail(stderr)) => Err(GitError::Failed {
                command: format!("git {op:?} {subject}"),
                code: Some(128),
                stderr,
            }),
            Some(RuleAction::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(GitError::TimedOut {
                    command: format!("git {op:?} {subject}"),
                    timeout: Duration::from_secs(24 * 60 * 60),
                })
            }
            Some(RuleAction::Panic) => panic!("scripted panic in git {op:?} {subject}"),
        }
    }

    fn set_head(&self, repo: &Path, branch: &str) {
        self.state
            .lock()
            .unwrap()
            .heads
            .insert(repo.to_path_buf(), branch.to_string());
    }
}

#[async_trait]
impl GitOps for ScriptedGit {
    async fn clone_repo(&self, url: &str, dest: &Path, options: &CloneOptions) -> GitResult<()> {
        let subject = format!("{} {url}", options.to_args().join(" "));
        self.step(GitOp::Clone, subject.trim_start()).await?;
        tokio::fs::create_dir_all(dest).await?;
        let head = options.branch.as_deref().unwrap_or(Self::DEFAULT_BRANCH);
        self.set_head(dest, head);
        Ok(())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> GitResult<()> {
        self.step(GitOp::Checkout, branch).await?;
        self.set_head(repo, branch);
        Ok(())
    }

    async fn fetch_branch(&self, _repo: &Path, _remote: &str, branch: &str) -> GitResult<()> {
        self.step(GitOp::Fetch, branch).await
    }

    async fn current_branch(&self, repo: &Path) -> GitResult<String> {
        self.step(GitOp::CurrentBranch, &repo.display().to_string())
            .await?;
        self.state
            .lock()
            .unwrap()
            .heads
            .get(repo)
            .cloned()
            .ok_or_else(|| GitError::UnexpectedOutput {
                command: "git rev-parse --abbrev-ref HEAD".to_string(),
                detail: format!("{} is not a working copy", repo.display()),
            })
    }

    async fn ensure_remote(&self, repo: &Path, _name: &str, _url: &str) -> GitResult<()> {
        self.step(GitOp::EnsureRemote, &repo.display().to_string())
            .await
    }

    async fn push(
        &self,
        _repo: &Path,
        _remote: &str,
        local_branch: &str,
        target_branch: &str,
        force: bool,
    ) -> GitResult<()> {
        let subject = if force {
            format!("{local_branch}:{target_branch}:force")
        } else {
            format!("{local_branch}:{target_branch}")
        };
        self.step(GitOp::Push, &subject).await
    }

    async fn configure_identity(&self, repo: &Path, identity: &GitIdentity) -> GitResult<()> {
        self.step(GitOp::ConfigureIdentity, &repo.display().to_string())
            .await?;
        self.state.lock().unwrap().identities.push(identity.clone());
        Ok(())
    }

    async fn init(&self, repo: &Path) -> GitResult<()> {
        self.step(GitOp::Init, &repo.display().to_string()).await?;
        tokio::fs::create_dir_all(repo).await?;
        self.set_head(repo, Self::DEFAULT_BRANCH);
        Ok(())
    }

    async fn add_all(&self, repo: &Path) -> GitResult<()> {
        self.step(GitOp::AddAll, &repo.display().to_string()).await
    }

    async fn commit(&self, repo: &Path, _message: &str) -> GitResult<()> {
        self.step(GitOp::Commit, &repo.display().to_string()).await
    }

    async fn unpack_archive(&self, archive: &Path, dest: &Path) -> GitResult<()> {
        self.step(GitOp::UnpackArchive, &dest.display().to_string())
            .await?;
        let bytes = tokio::fs::read(archive).await?;
        tokio::fs::write(dest.join("ARCHIVE_CONTENTS"), bytes).await?;
        Ok(())
    }
}
