//! Capability trait for the hosted code forge.
//!
//! The pipeline never talks HTTP directly; it consumes these operations so
//! it can run against [`crate::fakes::MemoryForge`] in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RepoSlug;
use crate::error::ForgeResult;
use crate::model::ReplicationCandidate;

/// Existing pull request in the fork, any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPull {
    pub number: u64,
    pub title: String,
    pub head_branch: String,
}

/// Repository metadata relevant to replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub slug: RepoSlug,
    pub default_branch: String,
    pub private: bool,
    pub fork: bool,
    /// Whether the authenticated account may push. `None` if not reported.
    pub can_push: Option<bool>,
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeUser {
    pub login: String,
    pub id: u64,
}

/// Request body for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPull {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// A pull request the forge just created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPull {
    pub number: u64,
    pub html_url: String,
}

/// Remote operations consumed by the pipeline.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Open pull requests, in the forge's listing order.
    async fn list_open_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ReplicationCandidate>>;

    /// Pull requests in any state.
    async fn list_all_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ForkPull>>;

    async fn get_repository(&self, repo: &RepoSlug) -> ForgeResult<RepoMetadata>;

    async fn branch_exists(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<bool>;

    async fn create_pull(&self, repo: &RepoSlug, pull: &NewPull) -> ForgeResult<CreatedPull>;

    /// Names of the labels defined on the repository.
    async fn list_labels(&self, repo: &RepoSlug) -> ForgeResult<Vec<String>>;

    async fn add_labels(&self, repo: &RepoSlug, number: u64, labels: &[String])
        -> ForgeResult<()>;

    async fn current_user(&self) -> ForgeResult<ForgeUser>;

    /// Gzip tarball of `branch`, with a single top-level directory.
    async fn download_archive(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<Vec<u8>>;
}
