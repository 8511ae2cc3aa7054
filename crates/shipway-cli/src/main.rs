//! Shipway - staged release orchestration CLI
//!
//! The `shipway` command plans and executes staged releases of
//! multi-module artifact sets against a Nexus-style staging repository
//! manager.
//!
//! ## Commands
//!
//! - `snapshot`: publish straight to the snapshot repository
//! - `candidate`: stage and close a release candidate
//! - `final`: stage, close and promote a final release
//! - `plan`: print the release plan without executing it
//!
//! ## Exit codes
//!
//! - `0` success
//! - `1` planning failure, lifecycle error or hard failure
//! - `2` partial failure (e.g. a marker publication failed)

mod manifest;
mod signing;
mod source;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use shipway_core::{
    ArtifactPublisher, FixedVersion, OutcomeStatus, ReleaseChannel, ReleaseError, ReleaseOptions,
    ReleaseOutcome, ReleaseOrchestrator, ReleaseRequest, StagingLifecycleCoordinator, StepOutcome,
    StepScope, VersionResolver,
};
use shipway_nexus::{HttpArtifactStore, NexusConfig, NexusStagingClient};

use manifest::Manifest;
use signing::GpgCommandSigner;
use source::FsArtifactSource;

#[derive(Parser)]
#[command(name = "shipway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged release orchestration for multi-module artifact sets", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and results
    #[arg(long, global = true)]
    json: bool,

    /// Path to the release manifest
    #[arg(long, global = true, default_value = "shipway.toml")]
    manifest: PathBuf,

    /// Repository username
    #[arg(long, global = true, env = "SHIPWAY_USERNAME")]
    username: Option<String>,

    /// Repository password
    #[arg(long, global = true, env = "SHIPWAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct RunFlags {
    /// Verify and sign without mutating any remote state
    #[arg(long)]
    validate_only: bool,

    /// Report the full plan without executing any step
    #[arg(long)]
    dry_run: bool,

    /// Version for modules that do not pin one in the manifest
    #[arg(long)]
    version: Option<String>,

    /// Upper bound on concurrent module publications
    #[arg(long, default_value = "4")]
    max_parallel: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish snapshots straight to the snapshot repository
    Snapshot {
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Stage a release candidate: closed, never promoted
    Candidate {
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Stage, close and promote a final release
    Final {
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Print the release plan for a channel without executing it
    Plan {
        /// Release channel: snapshot, candidate or final
        channel: String,

        #[command(flatten)]
        flags: RunFlags,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            if lifecycle_aborted(&err) {
                eprintln!("a staging repository may have been left behind; check the staging manager");
            }
            ExitCode::FAILURE
        }
    }
}

/// Whether the failure aborted the staging lifecycle mid-transition, so a
/// staging repository may still exist on the remote.
fn lifecycle_aborted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ReleaseError>()
        .is_some_and(ReleaseError::is_lifecycle_fatal)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let manifest = Manifest::load(&cli.manifest)?;

    let (channel, flags, plan_only) = match &cli.command {
        Commands::Snapshot { flags } => (ReleaseChannel::Snapshot, flags.clone(), false),
        Commands::Candidate { flags } => (ReleaseChannel::Candidate, flags.clone(), false),
        Commands::Final { flags } => (ReleaseChannel::Final, flags.clone(), false),
        Commands::Plan { channel, flags } => (
            channel
                .parse::<ReleaseChannel>()
                .map_err(|err| anyhow::anyhow!(err))?,
            flags.clone(),
            true,
        ),
    };

    let request = build_request(&manifest, channel, &flags).await?;
    let orchestrator = build_orchestrator(&manifest, &cli)?;

    if plan_only {
        let plan = orchestrator.plan(&request)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("plan for {channel} release:");
            for step in &plan.steps {
                let scope = match &step.scope {
                    StepScope::Global => String::new(),
                    StepScope::Module(coordinates) => format!(" {coordinates}"),
                };
                match &step.skip_reason {
                    Some(reason) => println!("  {}{} (skipped: {reason})", step.kind, scope),
                    None => println!("  {}{}", step.kind, scope),
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // An interrupt aborts the run through the coordinator, which drops an
    // open staging repository instead of abandoning it.
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting release run");
            cancel.cancel();
        }
    });

    let outcome = orchestrator.release(&request).await?;
    report(&outcome, cli.json)?;

    Ok(match outcome.status {
        OutcomeStatus::Success => ExitCode::SUCCESS,
        OutcomeStatus::PartialFailure => ExitCode::from(2),
        OutcomeStatus::HardFailure => ExitCode::FAILURE,
    })
}

async fn build_request(
    manifest: &Manifest,
    channel: ReleaseChannel,
    flags: &RunFlags,
) -> Result<ReleaseRequest> {
    let version_override = match &flags.version {
        Some(version) => {
            let resolver = FixedVersion::new(version, channel);
            let (version, _) = resolver.resolve().await?;
            Some(version)
        }
        None => None,
    };

    let modules = manifest.module_descriptors(version_override.as_deref())?;
    let options = ReleaseOptions {
        validate_only: flags.validate_only,
        dry_run: flags.dry_run,
        signing_enabled: manifest.signing_enabled(),
        staging_configured: true,
        snapshot_repository: manifest.repository.snapshot_repository.clone(),
        max_parallel: flags.max_parallel,
    };
    Ok(ReleaseRequest::new(channel, modules).with_options(options))
}

fn build_orchestrator(manifest: &Manifest, cli: &Cli) -> Result<ReleaseOrchestrator> {
    let mut nexus = NexusConfig::new(&manifest.repository.url);
    if let Some(profile) = &manifest.repository.staging_profile {
        nexus = nexus.with_profile(profile);
    }
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        nexus = nexus.with_credentials(username, password);
    }

    let client = Arc::new(NexusStagingClient::new(nexus).context("failed to set up staging client")?);
    let mut store = HttpArtifactStore::new(&manifest.repository.url)
        .context("failed to set up artifact store")?;
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        store = store.with_credentials(username, password);
    }

    let publisher = Arc::new(ArtifactPublisher::new(
        Arc::new(store),
        Arc::new(FsArtifactSource::from_manifest(manifest)?),
        Arc::new(GpgCommandSigner::from_config(&manifest.signing)),
    ));
    let coordinator = StagingLifecycleCoordinator::new(client, Arc::clone(&publisher));
    Ok(ReleaseOrchestrator::new(coordinator, publisher))
}

fn report(outcome: &ReleaseOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    for step in &outcome.steps {
        let scope = match &step.scope {
            StepScope::Global => String::new(),
            StepScope::Module(coordinates) => format!(" {coordinates}"),
        };
        let state = match &step.outcome {
            StepOutcome::Succeeded => "ok".to_string(),
            StepOutcome::Failed { reason } => format!("FAILED: {reason}"),
            StepOutcome::Skipped => "skipped".to_string(),
            StepOutcome::NotReached => "not reached".to_string(),
        };
        println!("  {}{}: {state}", step.kind, scope);
    }

    if let Some(id) = &outcome.repository_id {
        let state = outcome
            .staging_state
            .map(|s| s.name())
            .unwrap_or("unknown");
        println!("staging repository {id}: {state}");
    }
    match outcome.status {
        OutcomeStatus::Success => println!("release succeeded ({})", outcome.channel),
        OutcomeStatus::PartialFailure => println!(
            "release partially failed ({}): markers failed for {}",
            outcome.channel,
            outcome.failed_markers().join(", ")
        ),
        OutcomeStatus::HardFailure => println!(
            "release failed ({}): {}",
            outcome.channel,
            outcome.failed_modules().join(", ")
        ),
    }
    Ok(())
}
