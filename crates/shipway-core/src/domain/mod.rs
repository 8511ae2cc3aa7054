//! Domain model for a staged release run.

pub mod channel;
pub mod error;
pub mod module;
pub mod outcome;

pub use channel::ReleaseChannel;
pub use error::{ReleaseError, Result};
pub use module::{ArtifactSpec, MarkerPublication, ModuleDescriptor, MARKER_MODULE_SUFFIX};
pub use outcome::{
    MarkerOutcome, OutcomeStatus, PublicationResult, ReleaseOutcome, StepOutcome, StepReport,
};
