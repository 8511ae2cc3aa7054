//! Nexus staging repository manager backend.
//!
//! Implements the staging client and artifact store seams over the Nexus
//! staging REST surface: profile discovery, repository start, bulk
//! close/promote/drop and status polling, plus plain HTTP PUT/GET artifact
//! transfer with basic authentication.

pub mod client;
pub mod store;

pub use client::{NexusConfig, NexusStagingClient};
pub use store::HttpArtifactStore;
