//! Version-control capability trait and its process-backed implementation.

mod cli;

use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::GitIdentity;
use crate::error::GitResult;

pub use cli::GitCli;

/// Restrictions applied to a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Clone only this branch (`--branch B --single-branch`).
    pub branch: Option<String>,
    /// History depth (`--depth N`).
    pub depth: Option<u32>,
}

impl CloneOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn shallow_branch(branch: &str) -> Self {
        Self {
            branch: Some(branch.to_string()),
            depth: Some(1),
        }
    }

    /// Arguments for `git clone`, excluding the URL and destination.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(depth) = self.depth {
            args.push("--depth".to_string());
            args.push(depth.to_string());
        }
        if let Some(branch) = &self.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
            args.push("--single-branch".to_string());
        }
        args
    }
}

/// Local version-control operations consumed by the ladder and publisher.
///
/// Every path argument names a working copy except for `clone_repo`'s
/// destination and `unpack_archive`'s target directory.
#[async_trait]
pub trait GitOps: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path, options: &CloneOptions) -> GitResult<()>;

    async fn checkout(&self, repo: &Path, branch: &str) -> GitResult<()>;

    /// Fetch `branch` from `remote` into a local ref of the same name.
    async fn fetch_branch(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<()>;

    async fn current_branch(&self, repo: &Path) -> GitResult<String>;

    /// Add `name` pointing at `url`, or repoint it if it already exists.
    async fn ensure_remote(&self, repo: &Path, name: &str, url: &str) -> GitResult<()>;

    /// Push `local_branch` to `refs/heads/<target_branch>` on `remote`.
    async fn push(
        &self,
        repo: &Path,
        remote: &str,
        local_branch: &str,
        target_branch: &str,
        force: bool,
    ) -> GitResult<()>;

    async fn configure_identity(&self, repo: &Path, identity: &GitIdentity) -> GitResult<()>;

    async fn init(&self, repo: &Path) -> GitResult<()>;

    async fn add_all(&self, repo: &Path) -> GitResult<()>;

    async fn commit(&self, repo: &Path, message: &str) -> GitResult<()>;

    /// Extract a gzip tarball into `dest`, dropping its top-level directory.
    async fn unpack_archive(&self, archive: &Path, dest: &Path) -> GitResult<()>;
}

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.-]*://)[^/@\s]+@")
            .expect("credential pattern is valid")
    })
}

/// Replace `user:secret@` in any URL inside `text` with `***@`.
pub fn redact_credentials(text: &str) -> String {
    credential_pattern()
        .replace_all(text, "${scheme}***@")
        .into_owned()
}
