//! The individual rungs.

use std::path::Path;

use tracing::debug;

use super::{AttemptContext, AttemptError, Ladder, StrategyTag};
use crate::git::{redact_credentials, CloneOptions};

const ORIGIN: &str = "origin";
const ARCHIVE_FILE: &str = "source.tar.gz";

/// Remove whatever a previous rung left behind.
pub(super) async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

impl Ladder<'_> {
    /// Redacted, human-readable summary of what a rung runs.
    pub(super) fn describe(&self, tag: StrategyTag, ctx: &AttemptContext<'_>) -> String {
        let slug = &ctx.source.slug;
        let authenticated = self.config.authenticated_url(slug);
        let text = match tag {
            StrategyTag::ShallowClone => format!(
                "git clone {} {authenticated}",
                CloneOptions::shallow_branch(ctx.branch).to_args().join(" ")
            ),
            StrategyTag::FullClone => format!(
                "git clone {authenticated} && git checkout {}",
                ctx.branch
            ),
            StrategyTag::PublicRetry => format!(
                "git clone {} && git checkout {}",
                self.config.anonymous_url(slug),
                ctx.branch
            ),
            StrategyTag::Archive => format!(
                "download {slug}@{} archive && git init && git commit",
                ctx.branch
            ),
        };
        redact_credentials(&text)
    }

    pub(super) async fn shallow_clone(
        &self,
        ctx: &AttemptContext<'_>,
    ) -> Result<String, AttemptError> {
        let url = self.config.authenticated_url(&ctx.source.slug);
        self.git
            .clone_repo(&url, &ctx.checkout, &CloneOptions::shallow_branch(ctx.branch))
            .await?;
        Ok(self.git.current_branch(&ctx.checkout).await?)
    }

    pub(super) async fn full_clone(
        &self,
        url: &str,
        ctx: &AttemptContext<'_>,
    ) -> Result<String, AttemptError> {
        self.git
            .clone_repo(url, &ctx.checkout, &CloneOptions::full())
            .await?;
        if let Err(err) = self.git.checkout(&ctx.checkout, ctx.branch).await {
            debug!(branch = %ctx.branch, error = %err, "checkout failed, fetching branch by name");
            self.git
                .fetch_branch(&ctx.checkout, ORIGIN, ctx.branch)
                .await?;
            self.git.checkout(&ctx.checkout, ctx.branch).await?;
        }
        Ok(self.git.current_branch(&ctx.checkout).await?)
    }

    pub(super) async fn public_retry(
        &self,
        ctx: &AttemptContext<'_>,
    ) -> Result<String, AttemptError> {
        if ctx.source.private {
            return Err(AttemptError::NotApplicable(format!(
                "{} is private; anonymous access cannot succeed",
                ctx.source.slug
            )));
        }
        let url = self.config.anonymous_url(&ctx.source.slug);
        self.full_clone(&url, ctx).await
    }

    /// Snapshot without upstream history: only the tree is needed downstream.
    pub(super) async fn archive(&self, ctx: &AttemptContext<'_>) -> Result<String, AttemptError> {
        let bytes = self
            .forge
            .download_archive(&ctx.source.slug, ctx.branch)
            .await?;
        let archive_path = ctx.work_dir.join(ARCHIVE_FILE);
        tokio::fs::write(&archive_path, &bytes).await?;
        tokio::fs::create_dir_all(&ctx.checkout).await?;

        let unpacked = self.git.unpack_archive(&archive_path, &ctx.checkout).await;
        // The tarball is scratch regardless of how extraction went.
        let _ = tokio::fs::remove_file(&archive_path).await;
        unpacked?;

        self.git.init(&ctx.checkout).await?;
        self.git
            .configure_identity(&ctx.checkout, self.identity)
            .await?;
        self.git.add_all(&ctx.checkout).await?;
        self.git
            .commit(
                &ctx.checkout,
                &format!(
                    "Import {} from {} (archive snapshot)",
                    ctx.branch, ctx.source.slug
                ),
            )
            .await?;
        Ok(self.git.current_branch(&ctx.checkout).await?)
    }
}
