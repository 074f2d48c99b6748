//! `efn-events`: internal event mechanics.
//!
//! This crate defines the CloudEvents envelope, the internal event-type
//! registry, the typed payloads exchanged between the services, deterministic
//! event-id derivation, and the send/receive plumbing shared by every
//! service. It carries mechanics, not business logic.
//!
//! Delivery is at-least-once; consumers must be idempotent.

pub mod cloudevent;
pub mod kind;
pub mod payload;
pub mod receiver;
pub mod sender;

pub use cloudevent::{CloudEvent, ParseError, X_CORRELATOR_EXTENSION};
pub use kind::{EventType, Source};
pub use payload::{
    event_id_for_app, event_id_for_ne, event_id_for_traffic, AppConsumptionData,
    CalculationRequestedData, EventPayload, GatherInfoData, NetworkElementEnergyData,
    NetworkElementInfo, NetworkElementTrafficData, NotificationErrorRequestedData,
    NotificationRequestedData,
};
pub use receiver::{receiver_router, EventHandler, HandlerError};
pub use sender::{EventSender, HttpEventSender, InMemoryEventBus, SendError};
