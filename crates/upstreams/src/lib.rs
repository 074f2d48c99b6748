//! `efn-upstreams`: boundary traits and stub clients for the external
//! collaborators (orchestrator, cloud observability, traffic volume, policy
//! decision point).
//!
//! Each collaborator is a trait at the seam plus at least one stub
//! implementation; production clients can be slotted in without touching the
//! services.

pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod trafficvolume;

use thiserror::Error;

/// Upstream failure classification. The split drives the broker contract:
/// throttling is returned as a transient failure (the broker redelivers),
/// a permanent failure becomes an error notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream throttled the request: {0}")]
    Throttling(String),

    #[error("permanent upstream failure: {0}")]
    Permanent(String),
}

impl UpstreamError {
    pub fn throttling(msg: impl Into<String>) -> Self {
        Self::Throttling(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_throttling(&self) -> bool {
        matches!(self, UpstreamError::Throttling(_))
    }
}

pub use observability::{CloudObservability, ConfigurableObservability, DummyObservability};
pub use orchestrator::{
    ApplicationInstanceInfo, DummyOrchestrator, GatheredInformation, NeInfo, Orchestrator,
};
pub use policy::{AllowAll, HttpPdp, Policy, PolicyError};
pub use trafficvolume::{
    ConfigurableTrafficVolume, DummyTrafficVolume, TrafficNetworkElement, TrafficVolume,
    TrafficVolumeMeasure,
};
