//! Replica - mirror open upstream pull requests into a fork
//!
//! The `replica-prs` command lists the open pull requests of an upstream
//! repository and recreates each eligible one in a fork, so contributions
//! can be reviewed and CI-tested there.
//!
//! ## Exit codes
//!
//! - `0`: every candidate replicated or skipped, or at least one replicated
//! - `1`: the run could not start, or only errors were recorded
//! - `2`: invalid configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, Level};

use replica_core::{
    init_tracing, CandidateOutcome, ConfigError, GitCli, GitIdentity, LogFormat, ReplicaConfig,
    Replicator, RunDisposition, RunReport,
};
use replica_forge::{GitHubForge, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(name = "replica-prs")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replicate open upstream pull requests into a fork", long_about = None)]
struct Cli {
    /// Access token with read access to the upstream and write access to the fork
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Upstream repository, as owner/name
    #[arg(long, env = "UPSTREAM_REPO")]
    upstream: Option<String>,

    /// Fork receiving the replicas, as owner/name
    #[arg(long, env = "FORK_REPO")]
    fork: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Host used to build clone and push URLs
    #[arg(long, env = "REPLICA_GIT_HOST", default_value = replica_core::config::DEFAULT_GIT_HOST)]
    git_host: String,

    /// Per-strategy acquisition timeout, in seconds
    #[arg(long, env = "REPLICA_ATTEMPT_TIMEOUT_SECS", default_value_t = 300)]
    attempt_timeout_secs: u64,

    /// Commit author name for working copies
    #[arg(long, env = "REPLICA_GIT_USER_NAME", requires = "git_user_email")]
    git_user_name: Option<String>,

    /// Commit author email for working copies
    #[arg(long, env = "REPLICA_GIT_USER_EMAIL", requires = "git_user_name")]
    git_user_email: Option<String>,

    /// Directory for per-candidate scratch space (default: system temp)
    #[arg(long, env = "REPLICA_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Process at most this many open pull requests
    #[arg(long, env = "REPLICA_MAX_CANDIDATES")]
    max_candidates: Option<usize>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Write the full run report as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Result<ReplicaConfig, ConfigError> {
        let mut config = ReplicaConfig::new(
            self.token.as_deref().unwrap_or_default(),
            self.upstream.as_deref().unwrap_or_default(),
            self.fork.as_deref().unwrap_or_default(),
        )?
        .with_git_host(self.git_host.as_str())?
        .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))?;

        if let (Some(name), Some(email)) = (&self.git_user_name, &self.git_user_email) {
            config = config.with_identity(GitIdentity::new(name.as_str(), email.as_str()));
        }
        if let Some(root) = &self.work_root {
            config = config.with_work_root(root.clone());
        }
        if let Some(max) = self.max_candidates {
            config = config.with_max_candidates(max);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    match run(config, &cli.api_url, cli.summary_json.as_deref()).await {
        Ok(disposition) => ExitCode::from(disposition.exit_code() as u8),
        Err(err) => {
            error!(error = %format!("{err:#}"), "replication run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(
    config: ReplicaConfig,
    api_url: &str,
    summary_json: Option<&Path>,
) -> Result<RunDisposition> {
    let forge = GitHubForge::new(api_url, config.token()).context("Failed to build GitHub client")?;
    let git = GitCli::new(config.attempt_timeout);

    let replicator = Replicator::new(config, Arc::new(forge), Arc::new(git));
    let report = replicator.run().await.context("Replication run failed to start")?;

    print_report(&report);
    if let Some(path) = summary_json {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    }
    Ok(report.disposition)
}

fn describe(outcome: &CandidateOutcome) -> String {
    match outcome {
        CandidateOutcome::SkippedIneligible { reason } => format!("skipped ({reason})"),
        CandidateOutcome::SkippedDuplicate { reason } => format!("skipped ({reason})"),
        CandidateOutcome::Replicated {
            pr_number,
            url,
            strategy,
            forced_push,
            labels,
        } => {
            let forced = if *forced_push { ", forced push" } else { "" };
            let labelled = if labels.is_empty() {
                String::new()
            } else {
                format!(" [{}]", labels.join(", "))
            };
            format!("replicated as #{pr_number} via {strategy}{forced}{labelled}: {url}")
        }
        CandidateOutcome::Errored { stage, reason } => {
            format!("error during {}: {reason}", stage.as_str())
        }
    }
}

fn print_report(report: &RunReport) {
    println!("Replicating {} -> {}", report.upstream, report.fork);
    for candidate in &report.candidates {
        println!(
            "  #{} {} [{}]: {}",
            candidate.number,
            candidate.title,
            candidate.branch,
            describe(&candidate.outcome)
        );
    }
    let s = &report.summary;
    println!();
    println!(
        "Replicated: {}  Skipped: {}  Errored: {}  Total: {}",
        s.replicated, s.skipped, s.errored, s.total
    );
    match report.disposition {
        RunDisposition::Success => {}
        RunDisposition::Degraded => println!("Completed with errors"),
        RunDisposition::Failed => println!("Failed: no candidate could be replicated"),
    }
}
