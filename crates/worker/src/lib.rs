//! The worker service: an event-driven state machine that fans out
//! data-acquisition tasks per job, reassembles the partial results in the
//! store, and triggers the final calculation exactly once.

pub mod handler;

pub use handler::WorkerHandler;
