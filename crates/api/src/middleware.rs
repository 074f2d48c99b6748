use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::context::SubjectContext;

pub const X_CORRELATOR_HEADER: &str = "x-correlator";

#[derive(Clone)]
pub struct AuthState {
    pub decoding_key: std::sync::Arc<DecodingKey>,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: std::sync::Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Bind the caller subject from a bearer JWT (HS256). A missing or invalid
/// token binds the anonymous subject; authorization decisions belong to the
/// policy layer, not here.
pub async fn subject_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let subject = extract_bearer(req.headers())
        .and_then(|token| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.validate_exp = true;
            jsonwebtoken::decode::<Claims>(token, &state.decoding_key, &validation).ok()
        })
        .map(|data| SubjectContext::new(data.claims.sub))
        .unwrap_or_else(SubjectContext::anonymous);

    req.extensions_mut().insert(subject);
    next.run(req).await
}

/// Echo the inbound `x-correlator` header onto every response.
pub async fn correlator_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlator = req
        .headers()
        .get(X_CORRELATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(req).await;
    if let Some(correlator) = correlator {
        if let Ok(value) = HeaderValue::from_str(&correlator) {
            response.headers_mut().insert(X_CORRELATOR_HEADER, value);
        }
    }
    response
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
