//! Release channel: the intent class of a release run.

use serde::{Deserialize, Serialize};

/// The intent class of a release run, fixed before the run starts.
///
/// The channel decides which plan steps are mandatory, which are optional
/// and which are recorded as skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    /// Mutable development publication straight to a snapshot repository.
    /// No staging lifecycle.
    Snapshot,

    /// Release candidate: artifacts are staged and the staging repository
    /// is closed, but never promoted by this run.
    Candidate,

    /// Final release: staged, closed and promoted to consumers.
    Final,
}

impl ReleaseChannel {
    /// Get the channel name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ReleaseChannel::Snapshot => "snapshot",
            ReleaseChannel::Candidate => "candidate",
            ReleaseChannel::Final => "final",
        }
    }

    /// Whether publishes on this channel go through a staging repository.
    pub fn uses_staging(&self) -> bool {
        matches!(self, ReleaseChannel::Candidate | ReleaseChannel::Final)
    }

    /// Whether this channel promotes the staging repository to consumers.
    /// Candidates remain closed unless promoted by a separate action.
    pub fn promotes(&self) -> bool {
        matches!(self, ReleaseChannel::Final)
    }
}

impl std::fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ReleaseChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(ReleaseChannel::Snapshot),
            "candidate" => Ok(ReleaseChannel::Candidate),
            "final" => Ok(ReleaseChannel::Final),
            other => Err(format!("unknown release channel: {other}")),
        }
    }
}
