//! Replica Core: mirror open upstream pull requests into a fork
//!
//! Each open upstream pull request passes through a fixed pipeline:
//!
//! - `eligibility`: title filter that drops dependency bumps and maintenance churn
//! - `guard`: skips candidates the fork already carries
//! - `ladder`: four escalating strategies to obtain the contributor's branch
//! - `publisher`: pushes to the fork and opens a labelled tracking request
//! - `orchestrator`: runs the pipeline per candidate and aggregates a report
//!
//! The forge API and git are reached through the [`Forge`] and [`GitOps`]
//! traits; `fakes` provides in-memory versions of both.

pub mod config;
pub mod eligibility;
pub mod error;
pub mod fakes;
pub mod forge;
pub mod git;
pub mod guard;
pub mod ladder;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod publisher;
pub mod telemetry;

pub use config::{GitIdentity, RepoSlug, ReplicaConfig};
pub use eligibility::is_eligible;
pub use error::{ConfigError, ForgeError, GitError, ReplicaError, Result};
pub use forge::{CreatedPull, Forge, ForgeUser, ForkPull, NewPull, RepoMetadata};
pub use git::{GitCli, GitOps};
pub use guard::{ForkSnapshot, REPLICA_MARKER};
pub use ladder::{AcquisitionAttempt, AcquisitionResult, Ladder, StrategyTag, WorkingCopy};
pub use model::{
    CandidateOutcome, CandidateReport, RepoRef, ReplicationCandidate, RunDisposition, RunReport,
    RunSummary, Stage,
};
pub use orchestrator::Replicator;
pub use publisher::{Publication, PublishError, Publisher};
pub use telemetry::{init_tracing, LogFormat};

/// Version of the replica-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
