//! The notify service: consumes internal notification events, claims the
//! single delivery via the store's compare-and-set, and POSTs the public
//! CloudEvent to the subscriber sink.

pub mod handler;

pub use handler::NotifyHandler;
