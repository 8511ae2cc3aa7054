//! Aggregated results of a release run.

use serde::{Deserialize, Serialize};

use crate::client::StagingState;
use crate::plan::{StepKind, StepScope};

/// Outcome of one uploaded (or attempted) file within a publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFailure {
    /// Repository-relative path of the file.
    pub path: String,

    /// Why the upload failed.
    pub reason: String,
}

/// Outcome of a module's marker publication, tracked independently of the
/// module's primary publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkerOutcome {
    Published,
    Failed { reason: String },
}

/// Per-module publication outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationResult {
    /// `group:module` coordinates of the module.
    pub module: String,

    /// Repository-relative paths attempted for the primary publication.
    pub attempted: Vec<String>,

    /// Paths that were uploaded successfully.
    pub published: Vec<String>,

    /// Files that failed, with reasons. Any entry here fails the module's
    /// primary publication as a whole.
    pub failed: Vec<FileFailure>,

    /// Marker publication outcome, if the module registers one.
    pub marker: Option<MarkerOutcome>,

    /// Signing failure hit while publishing, attributed to the sign step
    /// rather than the upload that never happened.
    pub sign_error: Option<String>,
}

impl PublicationResult {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            attempted: Vec::new(),
            published: Vec::new(),
            failed: Vec::new(),
            marker: None,
            sign_error: None,
        }
    }

    /// Whether the primary publication succeeded (no failed files).
    pub fn primary_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether the marker publication failed. A missing marker is not a
    /// failure.
    pub fn marker_failed(&self) -> bool {
        matches!(self.marker, Some(MarkerOutcome::Failed { .. }))
    }

    /// First recorded failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failed.first().map(|f| f.reason.as_str())
    }
}

/// How a single plan step ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step ran and succeeded.
    Succeeded,

    /// The step ran and failed.
    Failed { reason: String },

    /// The step was not applicable for this channel/options and was
    /// recorded as skipped, never silently omitted.
    Skipped,

    /// An earlier failure prevented the step from running.
    NotReached,
}

/// Audit record for one plan step: what it was, whether it applied, and how
/// it ended. Lets an operator distinguish "skipped by design for this
/// channel" from "failed".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    pub kind: StepKind,
    pub scope: StepScope,
    pub applicable: bool,
    pub outcome: StepOutcome,
}

/// Overall status of a release run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every mandatory step for the chosen channel succeeded.
    Success,

    /// Some non-mandatory step (e.g. a marker publication) failed.
    PartialFailure,

    /// A mandatory step failed or the run hit a remote conflict.
    HardFailure,
}

/// Aggregation of all publication results plus the final staging state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    /// Channel this run was invoked with.
    pub channel: crate::domain::ReleaseChannel,

    /// Overall run status.
    pub status: OutcomeStatus,

    /// Every plan step with its applicability and result.
    pub steps: Vec<StepReport>,

    /// Per-module publication results in deterministic order (sorted by
    /// module coordinates).
    pub publications: Vec<PublicationResult>,

    /// Remote staging repository id, once assigned.
    pub repository_id: Option<String>,

    /// Final observed staging repository state, if a staging area was used.
    pub staging_state: Option<StagingState>,
}

impl ReleaseOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Coordinates of modules whose primary publication failed.
    pub fn failed_modules(&self) -> Vec<&str> {
        self.publications
            .iter()
            .filter(|p| !p.primary_succeeded())
            .map(|p| p.module.as_str())
            .collect()
    }

    /// Coordinates of modules whose marker publication failed.
    pub fn failed_markers(&self) -> Vec<&str> {
        self.publications
            .iter()
            .filter(|p| p.marker_failed())
            .map(|p| p.module.as_str())
            .collect()
    }
}
