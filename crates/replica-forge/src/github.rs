//! [`Forge`] over the GitHub REST API.

use std::fmt;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use replica_core::error::ForgeResult;
use replica_core::{
    CreatedPull, Forge, ForgeError, ForgeUser, ForkPull, NewPull, RepoMetadata, RepoSlug,
    ReplicationCandidate,
};

use crate::wire::{CreatedPullWire, ErrorWire, LabelWire, PullWire, RepoWire, UserWire};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;
const USER_AGENT: &str = concat!("replica-prs/", env!("CARGO_PKG_VERSION"));

/// GitHub client authenticated with a single token.
pub struct GitHubForge {
    api_url: String,
    token: String,
    http: reqwest::Client,
}

impl fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubForge")
            .field("api_url", &self.api_url)
            .field("token", &"***")
            .finish()
    }
}

impl GitHubForge {
    pub fn new(api_url: &str, token: &str) -> ForgeResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ForgeError::Transport(e.to_string()))?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send and map any non-success status to a [`ForgeError`].
    async fn send(&self, request: RequestBuilder, what: &str) -> ForgeResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ForgeError::Transport(format!("{what}: {e}")))?;
        let status = response.status();
        debug!(%status, what, "forge response");
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorWire>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        Err(ForgeError::from_status(
            status.as_u16(),
            format!("{what}: {message}"),
            rate_limited,
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> ForgeResult<T> {
        let response = self.send(self.request(Method::GET, path), what).await?;
        response
            .json()
            .await
            .map_err(|e| ForgeError::Decode(format!("{what}: {e}")))
    }

    /// Follow `page=N` until a short page comes back.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> ForgeResult<Vec<T>> {
        let mut items = Vec::new();
        let per_page = PAGE_SIZE.to_string();
        for page in 1usize.. {
            let page_str = page.to_string();
            let request = self
                .request(Method::GET, path)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = self
                .send(request, what)
                .await?
                .json()
                .await
                .map_err(|e| ForgeError::Decode(format!("{what}: {e}")))?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }
}

fn repo_path(repo: &RepoSlug) -> String {
    format!("/repos/{}/{}", repo.owner, repo.name)
}

/// Percent-encode each segment of a branch name; `/` separators stay literal.
fn branch_path(branch: &str) -> String {
    branch
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl Forge for GitHubForge {
    async fn list_open_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ReplicationCandidate>> {
        let pulls: Vec<PullWire> = self
            .get_all(
                &format!("{}/pulls", repo_path(repo)),
                &[("state", "open")],
                "listing open pull requests",
            )
            .await?;
        pulls.into_iter().map(PullWire::into_candidate).collect()
    }

    async fn list_all_pulls(&self, repo: &RepoSlug) -> ForgeResult<Vec<ForkPull>> {
        let pulls: Vec<PullWire> = self
            .get_all(
                &format!("{}/pulls", repo_path(repo)),
                &[("state", "all")],
                "listing pull requests",
            )
            .await?;
        Ok(pulls.into_iter().map(PullWire::into_fork_pull).collect())
    }

    async fn get_repository(&self, repo: &RepoSlug) -> ForgeResult<RepoMetadata> {
        let wire: RepoWire = self
            .get_json(&repo_path(repo), "reading repository")
            .await?;
        wire.into_metadata()
    }

    async fn branch_exists(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<bool> {
        let request = self.request(
            Method::GET,
            &format!("{}/branches/{}", repo_path(repo), branch_path(branch)),
        );
        match self.send(request, "checking branch").await {
            Ok(_) => Ok(true),
            Err(ForgeError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_pull(&self, repo: &RepoSlug, pull: &NewPull) -> ForgeResult<CreatedPull> {
        let request = self
            .request(Method::POST, &format!("{}/pulls", repo_path(repo)))
            .json(pull);
        let created: CreatedPullWire = self
            .send(request, "creating pull request")
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(CreatedPull {
            number: created.number,
            html_url: created.html_url,
        })
    }

    async fn list_labels(&self, repo: &RepoSlug) -> ForgeResult<Vec<String>> {
        let labels: Vec<LabelWire> = self
            .get_all(
                &format!("{}/labels", repo_path(repo)),
                &[],
                "listing labels",
            )
            .await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn add_labels(&self, repo: &RepoSlug, number: u64, labels: &[String]) -> ForgeResult<()> {
        let request = self
            .request(
                Method::POST,
                &format!("{}/issues/{number}/labels", repo_path(repo)),
            )
            .json(&json!({ "labels": labels }));
        self.send(request, "adding labels").await?;
        Ok(())
    }

    async fn current_user(&self) -> ForgeResult<ForgeUser> {
        let user: UserWire = self.get_json("/user", "reading authenticated user").await?;
        Ok(user.into())
    }

    async fn download_archive(&self, repo: &RepoSlug, branch: &str) -> ForgeResult<Vec<u8>> {
        let request = self.request(
            Method::GET,
            &format!("{}/tarball/{}", repo_path(repo), branch_path(branch)),
        );
        let response = self.send(request, "downloading archive").await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Err(ForgeError::Decode("archive response was empty".to_string()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForgeError::Transport(format!("downloading archive: {e}")))?;
        Ok(bytes.to_vec())
    }
}
