//! Shipway Core Library
//!
//! Staged-release orchestration: channel-aware release planning, staged
//! repository lifecycle coordination and checksum/signature-complete
//! artifact publication, behind injectable backend traits.

pub mod client;
pub mod coordinator;
pub mod domain;
pub mod fakes;
pub mod layout;
pub mod orchestrator;
pub mod plan;
pub mod publisher;
pub mod signing;
pub mod store;
pub mod version;

pub use domain::{
    ArtifactSpec, MarkerOutcome, MarkerPublication, ModuleDescriptor, OutcomeStatus,
    PublicationResult, ReleaseChannel, ReleaseError, ReleaseOutcome, Result, StepOutcome,
    StepReport, MARKER_MODULE_SUFFIX,
};

pub use client::{RepositoryId, StagingClient, StagingState, StagingStatus};
pub use coordinator::{CancelHandle, PollConfig, StagingLifecycleCoordinator};
pub use layout::{checksum, RepositoryLayout, VersionIndex, CHECKSUM_EXTENSIONS};
pub use orchestrator::{ReleaseOrchestrator, ReleaseRequest};
pub use plan::{ReleaseOptions, ReleasePlan, ReleasePlanner, Step, StepKind, StepScope};
pub use publisher::ArtifactPublisher;
pub use signing::{NoSigning, SigningProvider};
pub use store::{ArtifactSource, ArtifactStore};
pub use version::{FixedVersion, VersionResolver};

/// Shipway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
