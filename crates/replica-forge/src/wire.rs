//! Response shapes of the GitHub REST API, reduced to the fields we read.

use serde::Deserialize;

use replica_core::{
    ForgeError, ForgeUser, ForkPull, RepoMetadata, RepoRef, RepoSlug, ReplicationCandidate,
};

#[derive(Debug, Deserialize)]
pub(crate) struct PullWire {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    /// `null` for deleted ("ghost") accounts.
    #[serde(default)]
    pub user: Option<UserWire>,
    pub head: RefWire,
    pub base: RefWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefWire {
    #[serde(rename = "ref")]
    pub name: String,
    /// `null` once the head repository has been deleted.
    #[serde(default)]
    pub repo: Option<RepoWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoWire {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub permissions: Option<PermissionsWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PermissionsWire {
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserWire {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelWire {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedPullWire {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorWire {
    pub message: String,
}

fn parse_slug(full_name: &str) -> Result<RepoSlug, ForgeError> {
    full_name
        .parse()
        .map_err(|e| ForgeError::Decode(format!("repository name '{full_name}': {e}")))
}

impl RepoWire {
    pub fn into_ref(self) -> Result<RepoRef, ForgeError> {
        Ok(RepoRef {
            slug: parse_slug(&self.full_name)?,
            private: self.private,
            fork: self.fork,
        })
    }

    pub fn into_metadata(self) -> Result<RepoMetadata, ForgeError> {
        Ok(RepoMetadata {
            slug: parse_slug(&self.full_name)?,
            default_branch: self.default_branch.ok_or_else(|| {
                ForgeError::Decode(format!("{} has no default branch", self.full_name))
            })?,
            private: self.private,
            fork: self.fork,
            can_push: self.permissions.map(|p| p.push),
        })
    }
}

impl PullWire {
    pub fn into_candidate(self) -> Result<ReplicationCandidate, ForgeError> {
        let source = self.head.repo.map(RepoWire::into_ref).transpose()?;
        Ok(ReplicationCandidate {
            number: self.number,
            title: self.title,
            branch: self.head.name,
            source,
            author: self
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "ghost".to_string()),
            description: self.body,
            base_branch: self.base.name,
            html_url: self.html_url,
        })
    }

    pub fn into_fork_pull(self) -> ForkPull {
        ForkPull {
            number: self.number,
            title: self.title,
            head_branch: self.head.name,
        }
    }
}

impl From<UserWire> for ForgeUser {
    fn from(user: UserWire) -> Self {
        ForgeUser {
            login: user.login,
            id: user.id,
        }
    }
}
