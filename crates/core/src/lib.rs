//! Core domain for the energy footprint notification system: job and
//! partial-result documents, subscription types, the report calculator and
//! process configuration.

pub mod calculator;
pub mod config;
pub mod error;
pub mod job;
pub mod subscription;

pub use calculator::{CalculationError, Calculator, DEFAULT_CARBON_FACTOR};
pub use config::{ApiConfig, BusConfig, Config, DatabaseConfig, HttpConfig, LogConfig, PdpConfig};
pub use error::{DomainError, DomainResult};
pub use job::{
    Job, JobAppResult, JobAppResultMetadata, JobSpec, JobStatus, NetworkElementResult, RequestKind,
};
pub use subscription::{
    AccessTokenType, CredentialType, ErrorInfo, Protocol, ProtocolSettings, SinkCredential,
    SubscriptionConfig, SubscriptionRequest, TimePeriod,
};
