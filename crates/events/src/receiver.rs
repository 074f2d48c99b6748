//! Shared receiver plumbing for the event-consuming services.
//!
//! A single listener serves `/` (broker ingress), `/dlq` (dead-letter
//! ingress) and `/healthz`. Status codes are the broker contract:
//!
//! - 202: processed or deliberately ignored; the broker stops.
//! - 400: malformed CloudEvent, unrecoverable; the broker stops.
//! - 500: transient processing failure; the broker redelivers.
//!
//! The DLQ route always answers 202 so a dead-lettered event can never
//! generate further dead-letter traffic.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;

use crate::cloudevent::CloudEvent;

/// Handler failure modes, mapped onto broker status codes. Permanent
/// processing failures are not represented here: handlers resolve those
/// themselves by emitting an error notification and returning `Ok`.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event is structurally unusable (bad payload for its type,
    /// unknown job). The broker must not redeliver.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Something downstream hiccuped (store, upstream, bus). The broker
    /// should redeliver the same event.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl HandlerError {
    pub fn malformed(err: impl std::fmt::Display) -> Self {
        Self::Malformed(err.to_string())
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }
}

/// An event-consuming service (worker, notify).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: CloudEvent) -> Result<(), HandlerError>;

    /// Called for deliveries on `/dlq` after the broker exhausted its retry
    /// budget. Errors are logged, never surfaced.
    async fn handle_dead_letter(&self, event: CloudEvent) -> Result<(), HandlerError>;
}

/// Build the receiver router for a service handler.
pub fn receiver_router(handler: Arc<dyn EventHandler>) -> Router {
    Router::new()
        .route("/", post(ingress))
        .route("/dlq", post(dead_letter))
        .route("/healthz", get(healthz))
        .layer(Extension(handler))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ingress(
    Extension(handler): Extension<Arc<dyn EventHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let event = match CloudEvent::from_http_parts(&headers, &body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting malformed CloudEvent");
            return (StatusCode::BAD_REQUEST, "invalid CloudEvent").into_response();
        }
    };

    let event_id = event.id.clone();
    let event_type = event.ty.clone();
    match handler.handle(event).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(HandlerError::Malformed(msg)) => {
            tracing::error!(event_id, event_type, error = %msg, "unrecoverable event");
            (StatusCode::BAD_REQUEST, "invalid CloudEvent").into_response()
        }
        Err(HandlerError::Transient(msg)) => {
            tracing::warn!(event_id, event_type, error = %msg, "transient processing failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "processing error").into_response()
        }
    }
}

async fn dead_letter(
    Extension(handler): Extension<Arc<dyn EventHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let event = match CloudEvent::from_http_parts(&headers, &body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting malformed CloudEvent on /dlq");
            return (StatusCode::BAD_REQUEST, "invalid CloudEvent").into_response();
        }
    };

    // Errors are swallowed here on purpose: a failing DLQ handler must not
    // trigger another round of dead-letter delivery.
    if let Err(err) = handler.handle_dead_letter(event).await {
        tracing::error!(error = %err, "dead-letter handling failed");
    }
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{EventType, Source};
    use std::sync::Mutex;
    use tower::util::ServiceExt;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        dead: Mutex<Vec<String>>,
        fail_with: Mutex<Option<HandlerError>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: CloudEvent) -> Result<(), HandlerError> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            self.seen.lock().unwrap().push(event.id);
            Ok(())
        }

        async fn handle_dead_letter(&self, event: CloudEvent) -> Result<(), HandlerError> {
            self.dead.lock().unwrap().push(event.id);
            Err(HandlerError::transient("always fails; must stay 202"))
        }
    }

    fn request(path: &str, body: Vec<u8>) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/cloudevents+json")
            .body(axum::body::Body::from(body))
            .unwrap()
    }

    fn sample_event() -> Vec<u8> {
        let event = CloudEvent::without_data("evt-1", EventType::NotificationSent, Source::Notify);
        serde_json::to_vec(&event).unwrap()
    }

    #[tokio::test]
    async fn ingress_accepts_valid_events() {
        let handler = Arc::new(RecordingHandler::default());
        let app = receiver_router(handler.clone());

        let response = app.oneshot(request("/", sample_event())).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(handler.seen.lock().unwrap().as_slice(), ["evt-1"]);
    }

    #[tokio::test]
    async fn ingress_maps_handler_errors_to_status_codes() {
        let handler = Arc::new(RecordingHandler::default());

        *handler.fail_with.lock().unwrap() = Some(HandlerError::transient("db down"));
        let app = receiver_router(handler.clone());
        let response = app.oneshot(request("/", sample_event())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        *handler.fail_with.lock().unwrap() = Some(HandlerError::malformed("bad payload"));
        let app = receiver_router(handler.clone());
        let response = app.oneshot(request("/", sample_event())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingress_rejects_garbage() {
        let app = receiver_router(Arc::new(RecordingHandler::default()));
        let response = app.oneshot(request("/", b"not json".to_vec())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dead_letter_always_accepts_even_when_handler_fails() {
        let handler = Arc::new(RecordingHandler::default());
        let app = receiver_router(handler.clone());

        let response = app.oneshot(request("/dlq", sample_event())).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(handler.dead.lock().unwrap().as_slice(), ["evt-1"]);
    }
}
