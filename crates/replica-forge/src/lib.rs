//! Replica Forge: GitHub REST backend for `replica-core`
//!
//! Implements the [`replica_core::Forge`] capability with `reqwest`.
//! Listings are paginated at 100 items per page; a 404 from the branch
//! endpoint means the branch is absent, and an exhausted rate limit is
//! reported as [`replica_core::ForgeError::RateLimited`].

mod github;
mod wire;

pub use github::{GitHubForge, DEFAULT_API_URL};
