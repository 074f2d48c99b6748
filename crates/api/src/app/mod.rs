//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (store, event sender, policy)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::ApiServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<ApiServices>) -> Router {
    let auth_state = middleware::AuthState::new(&services.config.jwt_secret);

    Router::new()
        .route("/healthz", get(routes::system::healthz))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::subject_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::correlator_middleware))
}
