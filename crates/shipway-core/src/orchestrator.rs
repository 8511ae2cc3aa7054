//! Top-level release entry point.
//!
//! Plans first, executes second: if planning fails the request is rejected
//! with no remote I/O performed; otherwise the full lifecycle run is
//! driven. A plan is never partially applied.

use std::sync::Arc;

use tracing::info;

use crate::coordinator::{CancelHandle, StagingLifecycleCoordinator};
use crate::domain::{ModuleDescriptor, ReleaseChannel, ReleaseOutcome, Result};
use crate::plan::{ReleaseOptions, ReleasePlan, ReleasePlanner};
use crate::publisher::ArtifactPublisher;

/// A complete release request: channel, module set and options.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub channel: ReleaseChannel,
    pub modules: Vec<ModuleDescriptor>,
    pub options: ReleaseOptions,
}

impl ReleaseRequest {
    pub fn new(channel: ReleaseChannel, modules: Vec<ModuleDescriptor>) -> Self {
        Self {
            channel,
            modules,
            options: ReleaseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReleaseOptions) -> Self {
        self.options = options;
        self
    }
}

/// Accepts release requests, plans them and drives the lifecycle
/// coordinator, reporting one aggregated outcome per run.
pub struct ReleaseOrchestrator {
    coordinator: StagingLifecycleCoordinator,
    publisher: Arc<ArtifactPublisher>,
}

impl ReleaseOrchestrator {
    pub fn new(coordinator: StagingLifecycleCoordinator, publisher: Arc<ArtifactPublisher>) -> Self {
        Self {
            coordinator,
            publisher,
        }
    }

    /// Handle for aborting an in-flight [`ReleaseOrchestrator::release`]
    /// call, e.g. from a signal handler.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.coordinator.cancel_handle()
    }

    /// Plan the request without executing it. Pure; usable for plan audits.
    pub fn plan(&self, request: &ReleaseRequest) -> Result<ReleasePlan> {
        let options = self.effective_options(&request.options);
        ReleasePlanner::plan(request.channel, &request.modules, &options)
    }

    /// Execute a release run end to end.
    ///
    /// Planning failures return immediately; no remote call has been made
    /// at that point. Otherwise the plan is handed to the lifecycle
    /// coordinator in full.
    pub async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseOutcome> {
        let options = self.effective_options(&request.options);
        let plan = ReleasePlanner::plan(request.channel, &request.modules, &options)?;

        info!(
            channel = %plan.channel,
            modules = request.modules.len(),
            validate_only = options.validate_only,
            dry_run = options.dry_run,
            "starting release run"
        );
        self.coordinator.run(&plan, &request.modules, &options).await
    }

    /// Signing applicability comes from the configured provider, not from
    /// the caller's guess.
    fn effective_options(&self, options: &ReleaseOptions) -> ReleaseOptions {
        let mut options = options.clone();
        options.signing_enabled = self.publisher.signing_enabled();
        options
    }
}
