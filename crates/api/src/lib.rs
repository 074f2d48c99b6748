//! HTTP ingress API: validates report creation requests, authorizes the
//! caller, persists the job and fans out one gather-info event per
//! application instance.

pub mod app;
pub mod context;
pub mod middleware;
