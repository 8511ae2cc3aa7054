//! Staging lifecycle coordination: the state machine that owns the staging
//! repository across all modules of one release run.
//!
//! One run drives at most one staging repository: open it, fan publication
//! out across modules, join, then close and promote — or drop and leave a
//! recoverable state behind. The staging transitions themselves are
//! strictly sequential relative to the fan-out join; no module publish
//! starts before Open completes, and Close waits for every module result.
//!
//! Close and promote are acknowledged asynchronously by the remote, so the
//! coordinator polls status with exponential backoff until the repository
//! settles or a bounded timeout elapses. Every mutating call is preceded by
//! an advisory status check: re-closing an already-closed repository is
//! observed as success, never re-attempted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{RepositoryId, StagingClient, StagingState};
use crate::domain::{
    ModuleDescriptor, OutcomeStatus, PublicationResult, ReleaseError, ReleaseOutcome, Result,
    StepOutcome, StepReport,
};
use crate::plan::{ReleaseOptions, ReleasePlan, StepKind};
use crate::publisher::ArtifactPublisher;

/// Bounds for polling a staging transition until it settles.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Total budget for one transition to settle (milliseconds).
    pub timeout_ms: u64,

    /// Base delay between status queries (milliseconds), doubled per poll.
    pub backoff_base_ms: u64,

    /// Upper bound on the delay between status queries (milliseconds).
    pub max_backoff_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            backoff_base_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Bounded retries for the idempotent status read. Mutating calls are
/// never retried.
const STATUS_RETRY_LIMIT: u32 = 3;

/// Per-module result of the fan-out phase.
#[derive(Debug)]
struct ModuleRun {
    coordinates: String,
    verify_error: Option<String>,
    sign_error: Option<String>,
    target_error: Option<String>,
    publication: Option<PublicationResult>,
}

impl ModuleRun {
    fn mandatory_failed(&self) -> bool {
        self.verify_error.is_some()
            || self.sign_error.is_some()
            || self.target_error.is_some()
            || self
                .publication
                .as_ref()
                .is_some_and(|p| !p.primary_succeeded())
    }
}

/// Aborts an in-flight release run. Cloneable; safe to trigger from a
/// signal handler task.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives the staging repository lifecycle for one release run.
pub struct StagingLifecycleCoordinator {
    client: Arc<dyn StagingClient>,
    publisher: Arc<ArtifactPublisher>,
    poll: PollConfig,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancelled: watch::Receiver<bool>,
}

impl StagingLifecycleCoordinator {
    pub fn new(client: Arc<dyn StagingClient>, publisher: Arc<ArtifactPublisher>) -> Self {
        let (cancel_tx, cancelled) = watch::channel(false);
        Self {
            client,
            publisher,
            poll: PollConfig::default(),
            cancel_tx: Arc::new(cancel_tx),
            cancelled,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Handle for aborting this coordinator's runs from another task. A
    /// cancelled run never abandons an open staging repository silently:
    /// it is dropped best-effort before the run returns.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Execute a planned release run.
    ///
    /// Returns `Ok` with the aggregated outcome for determinate runs,
    /// including hard failures where the repository was driven to a
    /// recoverable state. Returns `Err` only for lifecycle-level errors
    /// that abort the remaining plan mid-transition (conflict, timeout,
    /// transport failure on a mutation).
    pub async fn run(
        &self,
        plan: &ReleasePlan,
        modules: &[ModuleDescriptor],
        options: &ReleaseOptions,
    ) -> Result<ReleaseOutcome> {
        let mut reports = initial_reports(plan);
        let mut repository_id: Option<RepositoryId> = None;
        let mut staging_state: Option<StagingState> = None;

        if self.is_cancelled() {
            return Err(ReleaseError::Cancelled);
        }

        // Uninitialized -> Open. Without an applicable OpenStaging step the
        // run proceeds without a staging area.
        if plan.is_applicable(StepKind::OpenStaging) {
            match self.client.create().await {
                Ok(id) => {
                    info!(repository = %id, "staging repository opened");
                    set_report(&mut reports, StepKind::OpenStaging, None, StepOutcome::Succeeded);
                    repository_id = Some(id);
                    staging_state = Some(StagingState::Open);
                }
                Err(err) => {
                    set_report(
                        &mut reports,
                        StepKind::OpenStaging,
                        None,
                        StepOutcome::Failed {
                            reason: err.to_string(),
                        },
                    );
                    return Err(err);
                }
            }
        }

        let target = match &repository_id {
            Some(id) => Some(self.client.deploy_target(id)),
            None => options.snapshot_repository.clone(),
        };
        let release_pointer = plan.channel.uses_staging();

        let runs = self
            .fan_out(plan, modules, target.as_deref(), release_pointer, options)
            .await?;

        let mut publications = Vec::new();
        let mut mandatory_failed = false;
        for run in &runs {
            record_module_reports(&mut reports, plan, run);
            mandatory_failed |= run.mandatory_failed();
            if let Some(publication) = &run.publication {
                publications.push(publication.clone());
            }
        }
        publications.sort_by(|a, b| a.module.cmp(&b.module));

        // Join: a mandatory module failure prevents Close and drives the
        // repository to Dropped, best-effort.
        if mandatory_failed {
            if let Some(id) = &repository_id {
                if let Some(state) = self.drop_best_effort(id, "publish failure").await {
                    staging_state = Some(state);
                }
            }
            let outcome = self.finish(
                plan,
                &mut reports,
                publications,
                repository_id,
                staging_state,
                OutcomeStatus::HardFailure,
            );
            return Ok(outcome);
        }

        // Operator abort at the join: the repository is dropped, never
        // silently abandoned.
        if self.is_cancelled() {
            if let Some(id) = &repository_id {
                self.drop_best_effort(id, "run cancelled").await;
            }
            return Err(ReleaseError::Cancelled);
        }

        // Open -> Closed.
        if plan.is_applicable(StepKind::CloseStaging) {
            if let Some(id) = repository_id.clone() {
                match self.settle(&id, StagingState::Closed, "close").await {
                    Ok(state) => {
                        info!(repository = %id, "staging repository closed");
                        set_report(
                            &mut reports,
                            StepKind::CloseStaging,
                            None,
                            StepOutcome::Succeeded,
                        );
                        staging_state = Some(state);
                    }
                    Err(err) => {
                        set_report(
                            &mut reports,
                            StepKind::CloseStaging,
                            None,
                            StepOutcome::Failed {
                                reason: err.to_string(),
                            },
                        );
                        if matches!(err, ReleaseError::Cancelled) {
                            self.drop_best_effort(&id, "run cancelled").await;
                        }
                        return Err(err);
                    }
                }
            }
        }

        // Closed -> Released.
        if plan.is_applicable(StepKind::Promote) {
            if let Some(id) = repository_id.clone() {
                match self.settle(&id, StagingState::Released, "promote").await {
                    Ok(state) => {
                        info!(repository = %id, "staging repository released");
                        set_report(&mut reports, StepKind::Promote, None, StepOutcome::Succeeded);
                        staging_state = Some(state);
                    }
                    Err(err) => {
                        set_report(
                            &mut reports,
                            StepKind::Promote,
                            None,
                            StepOutcome::Failed {
                                reason: err.to_string(),
                            },
                        );
                        if matches!(err, ReleaseError::Cancelled) {
                            self.drop_best_effort(&id, "run cancelled").await;
                        }
                        return Err(err);
                    }
                }
            }
        }

        let status = if publications.iter().any(|p| p.marker_failed()) {
            OutcomeStatus::PartialFailure
        } else {
            OutcomeStatus::Success
        };
        Ok(self.finish(plan, &mut reports, publications, repository_id, staging_state, status))
    }

    /// Fan publication out over all modules with applicable steps, bounded
    /// by the configured worker cap. A failed module does not cancel
    /// siblings already in flight; the failure surfaces at the join.
    async fn fan_out(
        &self,
        plan: &ReleasePlan,
        modules: &[ModuleDescriptor],
        target: Option<&str>,
        release_pointer: bool,
        options: &ReleaseOptions,
    ) -> Result<Vec<ModuleRun>> {
        let mut ordered: Vec<&ModuleDescriptor> = modules.iter().collect();
        ordered.sort_by_key(|m| m.coordinates());

        let cap = options.max_parallel.max(1).min(ordered.len().max(1));
        let semaphore = Arc::new(Semaphore::new(cap));
        let mut handles: Vec<JoinHandle<ModuleRun>> = Vec::new();

        for module in ordered {
            let coordinates = module.coordinates();
            let verify = plan.module_step_applicable(StepKind::Verify, &coordinates);
            let sign = plan.module_step_applicable(StepKind::Sign, &coordinates);
            let publish = plan.module_step_applicable(StepKind::Publish, &coordinates);
            if !verify && !sign && !publish {
                continue;
            }

            let publisher = Arc::clone(&self.publisher);
            let semaphore = Arc::clone(&semaphore);
            let module = module.clone();
            let target = target.map(str::to_string);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fan-out semaphore closed");
                run_module(publisher, module, verify, sign, publish, target, release_pointer)
                    .await
            }));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            let run = handle.await.map_err(|err| {
                ReleaseError::Publication {
                    module: "unknown".to_string(),
                    reason: format!("publication task panicked: {err}"),
                }
            })?;
            runs.push(run);
        }
        runs.sort_by(|a, b| a.coordinates.cmp(&b.coordinates));
        Ok(runs)
    }

    /// Drive the repository to `target`, observing already-settled states
    /// as success and mutating only when a transition is actually needed.
    async fn settle(
        &self,
        id: &RepositoryId,
        target: StagingState,
        operation: &str,
    ) -> Result<StagingState> {
        if self.is_cancelled() {
            return Err(ReleaseError::Cancelled);
        }

        // Advisory status check: never assume query-then-mutate is atomic,
        // but skip the mutation when the remote is already there.
        let status = self.status_with_retry(id).await?;
        if !status.transitioning {
            if status.state.satisfies(target) {
                debug!(repository = %id, state = %status.state, "{operation} already settled");
                return Ok(status.state);
            }
            match (status.state, target) {
                (StagingState::Open, StagingState::Closed) => self.client.close(id).await?,
                (StagingState::Closed, StagingState::Released) => {
                    self.client.promote(id).await?
                }
                (from, to) => {
                    return Err(ReleaseError::Protocol(format!(
                        "cannot {operation} repository {id}: state {from} cannot reach {to}"
                    )))
                }
            }
        }
        self.poll_until_settled(id, target, operation, status.state).await
    }

    /// Poll status with exponential backoff until the remote settles in
    /// `target` or the budget elapses.
    async fn poll_until_settled(
        &self,
        id: &RepositoryId,
        target: StagingState,
        operation: &str,
        observed: StagingState,
    ) -> Result<StagingState> {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.poll.timeout_ms);
        let mut delay = self.poll.backoff_base_ms.max(1);
        // Seeded from the advisory status so a timeout before the first
        // poll still reports what was actually observed.
        let mut last_state = observed;

        loop {
            if self.is_cancelled() {
                return Err(ReleaseError::Cancelled);
            }
            if started.elapsed() >= timeout {
                return Err(ReleaseError::StagingTimeout {
                    operation: operation.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                    last_state: last_state.name().to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay = (delay * 2).min(self.poll.max_backoff_ms.max(1));

            let status = self.status_with_retry(id).await?;
            last_state = status.state;
            if status.transitioning {
                debug!(repository = %id, state = %status.state, "{operation} still transitioning");
                continue;
            }
            if status.state.satisfies(target) {
                return Ok(status.state);
            }
            if status.state == StagingState::Dropped {
                return Err(ReleaseError::Protocol(format!(
                    "repository {id} was dropped while waiting for {operation}"
                )));
            }
            // Settled but not there yet: the remote queues bulk operations,
            // keep polling within the budget.
        }
    }

    /// Status is an idempotent read: transport failures are retried with
    /// bounded backoff, unlike mutating calls.
    async fn status_with_retry(&self, id: &RepositoryId) -> Result<crate::client::StagingStatus> {
        let mut attempt = 0u32;
        loop {
            match self.client.status(id).await {
                Ok(status) => return Ok(status),
                Err(ReleaseError::RemoteUnavailable(reason)) if attempt < STATUS_RETRY_LIMIT => {
                    attempt += 1;
                    let delay = self.poll.backoff_base_ms.max(1) * 2u64.pow(attempt - 1);
                    warn!(repository = %id, %reason, attempt, "status query failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Best-effort drop; a failure is reported but never masks the failure
    /// that triggered it.
    async fn drop_best_effort(&self, id: &RepositoryId, context: &str) -> Option<StagingState> {
        match self.client.drop_repository(id).await {
            Ok(()) => {
                warn!(repository = %id, context, "staging repository dropped");
                Some(StagingState::Dropped)
            }
            Err(err) => {
                warn!(repository = %id, context, error = %err, "failed to drop staging repository");
                None
            }
        }
    }

    /// PostRelease: emit the aggregated outcome for a run that reached a
    /// determinate state.
    fn finish(
        &self,
        plan: &ReleasePlan,
        reports: &mut Vec<StepReport>,
        publications: Vec<PublicationResult>,
        repository_id: Option<RepositoryId>,
        staging_state: Option<StagingState>,
        status: OutcomeStatus,
    ) -> ReleaseOutcome {
        if plan.is_applicable(StepKind::PostRelease) {
            set_report(reports, StepKind::PostRelease, None, StepOutcome::Succeeded);
        }
        let outcome = ReleaseOutcome {
            channel: plan.channel,
            status,
            steps: reports.clone(),
            publications,
            repository_id: repository_id.map(|id| id.0),
            staging_state,
        };
        info!(
            channel = %outcome.channel,
            status = ?outcome.status,
            modules = outcome.publications.len(),
            staging_state = ?outcome.staging_state,
            "release run finished"
        );
        outcome
    }
}

async fn run_module(
    publisher: Arc<ArtifactPublisher>,
    module: ModuleDescriptor,
    verify: bool,
    sign: bool,
    publish: bool,
    target: Option<String>,
    release_pointer: bool,
) -> ModuleRun {
    let coordinates = module.coordinates();
    let mut run = ModuleRun {
        coordinates: coordinates.clone(),
        verify_error: None,
        sign_error: None,
        target_error: None,
        publication: None,
    };

    if verify {
        if let Err(err) = publisher.verify(&module).await {
            warn!(module = %coordinates, error = %err, "verification failed");
            run.verify_error = Some(err.to_string());
            return run;
        }
    }

    if publish {
        let target = match target {
            Some(target) => target,
            None => {
                run.target_error = Some("no target repository for publication".to_string());
                return run;
            }
        };
        run.publication = Some(publisher.publish(&module, &target, sign, release_pointer).await);
    } else if sign {
        // Validate-only: exercise signing without mutating remote state.
        if let Err(err) = publisher.validate(&module, true).await {
            warn!(module = %coordinates, error = %err, "validation failed");
            run.sign_error = Some(err.to_string());
        }
    }

    run
}

fn initial_reports(plan: &ReleasePlan) -> Vec<StepReport> {
    plan.steps
        .iter()
        .map(|step| StepReport {
            kind: step.kind,
            scope: step.scope.clone(),
            applicable: step.applicable,
            outcome: if step.applicable {
                StepOutcome::NotReached
            } else {
                StepOutcome::Skipped
            },
        })
        .collect()
}

fn set_report(
    reports: &mut [StepReport],
    kind: StepKind,
    module: Option<&str>,
    outcome: StepOutcome,
) {
    if let Some(report) = reports
        .iter_mut()
        .find(|r| r.kind == kind && r.scope.module() == module)
    {
        report.outcome = outcome;
    }
}

fn record_module_reports(reports: &mut [StepReport], plan: &ReleasePlan, run: &ModuleRun) {
    let coordinates = run.coordinates.as_str();

    if plan.module_step_applicable(StepKind::Verify, coordinates) {
        let outcome = match &run.verify_error {
            Some(reason) => StepOutcome::Failed {
                reason: reason.clone(),
            },
            None => StepOutcome::Succeeded,
        };
        set_report(reports, StepKind::Verify, Some(coordinates), outcome);
    }
    if run.verify_error.is_some() {
        return;
    }

    if plan.module_step_applicable(StepKind::Sign, coordinates) {
        // A signer failure hit mid-publish belongs to the sign step, not
        // to the upload that never happened.
        let sign_error = run.sign_error.as_deref().or_else(|| {
            run.publication
                .as_ref()
                .and_then(|p| p.sign_error.as_deref())
        });
        let outcome = match sign_error {
            Some(reason) => StepOutcome::Failed {
                reason: reason.to_string(),
            },
            None => StepOutcome::Succeeded,
        };
        set_report(reports, StepKind::Sign, Some(coordinates), outcome);
    }

    if plan.module_step_applicable(StepKind::Publish, coordinates) {
        let outcome = match &run.publication {
            Some(publication) if publication.primary_succeeded() => StepOutcome::Succeeded,
            Some(publication) => StepOutcome::Failed {
                reason: publication
                    .failure_reason()
                    .unwrap_or("publication failed")
                    .to_string(),
            },
            None => StepOutcome::Failed {
                reason: run
                    .target_error
                    .clone()
                    .unwrap_or_else(|| "publication did not run".to_string()),
            },
        };
        set_report(reports, StepKind::Publish, Some(coordinates), outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactSpec, ReleaseChannel};
    use crate::fakes::{
        MemoryArtifactSource, MemoryArtifactStore, MemoryStagingClient, StubSigner,
    };
    use crate::plan::ReleasePlanner;

    fn fast_poll() -> PollConfig {
        PollConfig {
            timeout_ms: 500,
            backoff_base_ms: 1,
            max_backoff_ms: 4,
        }
    }

    fn coordinator(
        client: Arc<MemoryStagingClient>,
        store: Arc<MemoryArtifactStore>,
    ) -> StagingLifecycleCoordinator {
        coordinator_with_signer(client, store, Arc::new(StubSigner::new()))
    }

    fn coordinator_with_signer(
        client: Arc<MemoryStagingClient>,
        store: Arc<MemoryArtifactStore>,
        signer: Arc<StubSigner>,
    ) -> StagingLifecycleCoordinator {
        let publisher =
            ArtifactPublisher::new(store, Arc::new(MemoryArtifactSource::new()), signer);
        StagingLifecycleCoordinator::new(client, Arc::new(publisher))
            .with_poll_config(fast_poll())
    }

    fn modules() -> Vec<ModuleDescriptor> {
        vec![
            ModuleDescriptor::new("com.acme", "acme-lib")
                .with_version("1.0.0")
                .with_artifact(ArtifactSpec::new("jar")),
            ModuleDescriptor::new("com.acme", "acme-plugin")
                .with_version("1.0.0")
                .with_artifact(ArtifactSpec::new("jar"))
                .with_plugin_marker("com.acme.example"),
        ]
    }

    fn options() -> ReleaseOptions {
        ReleaseOptions {
            signing_enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_final_run_reaches_released() {
        let client = Arc::new(MemoryStagingClient::new());
        client.settle_after_polls(1).await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.staging_state, Some(StagingState::Released));
        assert_eq!(client.current_state().await, Some(StagingState::Released));
        assert_eq!(outcome.publications.len(), 2);
    }

    #[tokio::test]
    async fn test_candidate_run_stays_closed() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Candidate, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.staging_state, Some(StagingState::Closed));
        assert_eq!(client.promote_calls().await, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_drops_repository() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        store.fail_on("acme-lib-1.0.0.jar").await;
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::HardFailure);
        assert_eq!(outcome.staging_state, Some(StagingState::Dropped));
        assert_eq!(client.close_calls().await, 0);
        assert_eq!(outcome.failed_modules(), vec!["com.acme:acme-lib"]);
        // Sibling module's result is still recorded as success.
        let sibling = outcome
            .publications
            .iter()
            .find(|p| p.module == "com.acme:acme-plugin")
            .unwrap();
        assert!(sibling.primary_succeeded());
    }

    #[tokio::test]
    async fn test_drop_failure_reported_but_does_not_mask_publish_failure() {
        let client = Arc::new(MemoryStagingClient::new());
        client.fail_drop().await;
        let store = Arc::new(MemoryArtifactStore::new());
        store.fail_on("acme-lib-1.0.0.jar").await;
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::HardFailure);
        // Drop failed: repository is left Open and reported as such.
        assert_eq!(outcome.staging_state, Some(StagingState::Open));
    }

    #[tokio::test]
    async fn test_close_timeout_leaves_last_observed_state() {
        let client = Arc::new(MemoryStagingClient::new());
        client.never_settle().await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Candidate, &modules, &opts).unwrap();

        let err = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap_err();

        match err {
            ReleaseError::StagingTimeout {
                operation,
                last_state,
                ..
            } => {
                assert_eq!(operation, "close");
                assert_eq!(last_state, "open");
            }
            other => panic!("expected StagingTimeout, got {other}"),
        }
        // Not dropped: the remote operation may still complete.
        assert_eq!(client.drop_calls().await, 0);
    }

    #[tokio::test]
    async fn test_signer_failure_attributed_to_sign_step() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let signer = Arc::new(StubSigner::new());
        signer.fail_with("key expired").await;
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let outcome = coordinator_with_signer(client.clone(), store, signer)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::HardFailure);
        assert_eq!(outcome.staging_state, Some(StagingState::Dropped));
        let sign = outcome
            .steps
            .iter()
            .find(|s| s.kind == StepKind::Sign && s.scope.module() == Some("com.acme:acme-lib"))
            .unwrap();
        assert!(matches!(
            &sign.outcome,
            StepOutcome::Failed { reason } if reason.contains("signing failed: key expired")
        ));
    }

    #[tokio::test]
    async fn test_transient_status_failures_are_retried() {
        let client = Arc::new(MemoryStagingClient::new());
        client.fail_status_times(2).await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Candidate, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.staging_state, Some(StagingState::Closed));
        assert!(client.status_calls().await >= 3);
    }

    #[tokio::test]
    async fn test_status_retry_exhaustion_escalates() {
        let client = Arc::new(MemoryStagingClient::new());
        client.fail_status_times(u32::MAX).await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Candidate, &modules, &opts).unwrap();

        let err = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::RemoteUnavailable(_)));
        // One initial read plus the bounded retries, then give up.
        assert_eq!(client.status_calls().await, 1 + STATUS_RETRY_LIMIT);
        assert_eq!(client.close_calls().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_performs_no_remote_io() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let coordinator = coordinator(client.clone(), store.clone());
        coordinator.cancel_handle().cancel();
        let err = coordinator.run(&plan, &modules, &opts).await.unwrap_err();

        assert!(matches!(err, ReleaseError::Cancelled));
        assert_eq!(client.current_state().await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_mid_close_drops_repository() {
        let client = Arc::new(MemoryStagingClient::new());
        client.never_settle().await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Candidate, &modules, &opts).unwrap();

        let coordinator = coordinator(client.clone(), store).with_poll_config(PollConfig {
            timeout_ms: 10_000,
            backoff_base_ms: 1,
            max_backoff_ms: 4,
        });
        let cancel = coordinator.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = coordinator.run(&plan, &modules, &opts).await.unwrap_err();
        assert!(matches!(err, ReleaseError::Cancelled));
        assert_eq!(client.drop_calls().await, 1);
        assert_eq!(client.current_state().await, Some(StagingState::Dropped));
    }

    #[tokio::test]
    async fn test_promote_timeout_reports_last_advisory_state() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let coordinator = coordinator(client.clone(), store).with_poll_config(PollConfig {
            timeout_ms: 0,
            backoff_base_ms: 1,
            max_backoff_ms: 4,
        });

        let id = client.create().await.unwrap();
        client.close(&id).await.unwrap();
        client.status(&id).await.unwrap();

        // The budget elapses before any poll; the reported state is the one
        // the advisory check observed, not a guess.
        let err = coordinator
            .settle(&id, StagingState::Released, "promote")
            .await
            .unwrap_err();
        match err {
            ReleaseError::StagingTimeout {
                operation,
                last_state,
                ..
            } => {
                assert_eq!(operation, "promote");
                assert_eq!(last_state, "closed");
            }
            other => panic!("expected StagingTimeout, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_staging_conflict_escalates() {
        let client = Arc::new(MemoryStagingClient::new());
        client.occupy_profile().await;
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let err = coordinator(client, store.clone())
            .run(&plan, &modules, &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::StagingConflict(_)));
        // Failed before any module publish.
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_settle_observes_already_closed_repository() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let coordinator = coordinator(client.clone(), store);

        let id = client.create().await.unwrap();
        client.close(&id).await.unwrap();
        client.status(&id).await.unwrap();
        assert_eq!(client.close_calls().await, 1);

        // Settling an already-closed repository observes, never re-closes.
        let state = coordinator
            .settle(&id, StagingState::Closed, "close")
            .await
            .unwrap();
        assert_eq!(state, StagingState::Closed);
        assert_eq!(client.close_calls().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_run_skips_staging_entirely() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let modules = modules();
        let opts = ReleaseOptions {
            snapshot_repository: Some("snapshots".into()),
            signing_enabled: false,
            ..Default::default()
        };
        let plan = ReleasePlanner::plan(ReleaseChannel::Snapshot, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store.clone())
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.staging_state, None);
        assert_eq!(outcome.repository_id, None);
        assert!(store
            .contains("snapshots/com/acme/acme-lib/1.0.0/acme-lib-1.0.0.jar")
            .await);
    }

    #[tokio::test]
    async fn test_marker_failure_downgrades_to_partial() {
        let client = Arc::new(MemoryStagingClient::new());
        let store = Arc::new(MemoryArtifactStore::new());
        store.fail_on("gradle.plugin").await;
        let modules = modules();
        let opts = options();
        let plan = ReleasePlanner::plan(ReleaseChannel::Final, &modules, &opts).unwrap();

        let outcome = coordinator(client.clone(), store)
            .run(&plan, &modules, &opts)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::PartialFailure);
        // Markers are not mandatory: the repository is still released.
        assert_eq!(outcome.staging_state, Some(StagingState::Released));
        assert_eq!(outcome.failed_markers(), vec!["com.acme:acme-plugin"]);
    }
}
