//! `git` and `tar` invoked as child processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{redact_credentials, CloneOptions, GitOps};
use crate::config::GitIdentity;
use crate::error::{GitError, GitResult};

/// Process-backed [`GitOps`]. Each invocation is bounded by `timeout`; a
/// command that overruns is killed.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
    tar: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: PathBuf::from("git"),
            tar: PathBuf::from("tar"),
            timeout,
        }
    }

    /// Override the executables (e.g. for a vendored git).
    pub fn with_programs(mut self, git: impl Into<PathBuf>, tar: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self.tar = tar.into();
        self
    }

    /// Run git and return its stdout.
    async fn run_git(&self, cwd: Option<&Path>, args: &[&str]) -> GitResult<String> {
        self.run(&self.git, cwd, args).await
    }

    async fn run(
        &self,
        program: &Path,
        cwd: Option<&Path>,
        args: &[&str],
    ) -> GitResult<String> {
        let start = Instant::now();
        let description = redact_credentials(&format!(
            "{} {}",
            program.display(),
            args.join(" ")
        ));

        let mut command = Command::new(program);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        debug!(command = %description, "running");
        let child = command.spawn().map_err(|source| GitError::Spawn {
            command: description.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GitError::TimedOut {
                command: description.clone(),
                timeout: self.timeout,
            })??;

        let duration_ms = start.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::Failed {
                command: description,
                code: output.status.code(),
                stderr: redact_credentials(stderr.trim()),
            });
        }

        debug!(command = %description, duration_ms, "completed");
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ATTEMPT_TIMEOUT)
    }
}

#[async_trait]
impl GitOps for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path, options: &CloneOptions) -> GitResult<()> {
        let dest = dest.to_string_lossy();
        let extra = options.to_args();
        let mut args = vec!["clone", "--quiet"];
        args.extend(extra.iter().map(String::as_str));
        args.push(url);
        args.push(&*dest);
        self.run_git(None, &args).await.map(|_| ())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> GitResult<()> {
        // `--` makes git read `branch` as a revision, never a pathspec.
        self.run_git(Some(repo), &["checkout", "--quiet", branch, "--"])
            .await
            .map(|_| ())
    }

    async fn fetch_branch(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<()> {
        let refspec = format!("{branch}:{branch}");
        self.run_git(Some(repo), &["fetch", "--quiet", remote, refspec.as_str()])
            .await
            .map(|_| ())
    }

    async fn current_branch(&self, repo: &Path) -> GitResult<String> {
        let args = ["rev-parse", "--abbrev-ref", "HEAD"];
        let output = self.run_git(Some(repo), &args).await?;
        let branch = output.trim().to_string();
        if branch.is_empty() || branch == "HEAD" {
            return Err(GitError::UnexpectedOutput {
                command: format!("git {}", args.join(" ")),
                detail: "working copy has no checked-out branch".to_string(),
            });
        }
        Ok(branch)
    }

    async fn ensure_remote(&self, repo: &Path, name: &str, url: &str) -> GitResult<()> {
        let existing = self.run_git(Some(repo), &["remote"]).await?;
        if existing.lines().any(|line| line.trim() == name) {
            self.run_git(Some(repo), &["remote", "set-url", name, url])
                .await
                .map(|_| ())
        } else {
            self.run_git(Some(repo), &["remote", "add", name, url])
                .await
                .map(|_| ())
        }
    }

    async fn push(
        &self,
        repo: &Path,
        remote: &str,
        local_branch: &str,
        target_branch: &str,
        force: bool,
    ) -> GitResult<()> {
        let refspec = format!("{local_branch}:refs/heads/{target_branch}");
        let mut args = vec!["push", "--quiet"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(refspec.as_str());
        self.run_git(Some(repo), &args).await.map(|_| ())
    }

    async fn configure_identity(&self, repo: &Path, identity: &GitIdentity) -> GitResult<()> {
        self.run_git(Some(repo), &["config", "user.name", identity.name.as_str()])
            .await?;
        self.run_git(Some(repo), &["config", "user.email", identity.email.as_str()])
            .await?;
        Ok(())
    }

    async fn init(&self, repo: &Path) -> GitResult<()> {
        self.run_git(Some(repo), &["init", "--quiet"]).await.map(|_| ())
    }

    async fn add_all(&self, repo: &Path) -> GitResult<()> {
        self.run_git(Some(repo), &["add", "--all"]).await.map(|_| ())
    }

    async fn commit(&self, repo: &Path, message: &str) -> GitResult<()> {
        self.run_git(
            Some(repo),
            &["commit", "--quiet", "--allow-empty", "-m", message],
        )
        .await
        .map(|_| ())
    }

    async fn unpack_archive(&self, archive: &Path, dest: &Path) -> GitResult<()> {
        let archive = archive.to_string_lossy();
        let dest = dest.to_string_lossy();
        self.run(
            &self.tar,
            None,
            &[
                "-xzf",
                &*archive,
                "-C",
                &*dest,
                "--strip-components=1",
            ],
        )
        .await
        .map(|_| ())
    }
}
