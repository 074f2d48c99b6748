//! Sink-receiver test harness.
//!
//! Listens for the public notification callbacks, validates the CAMARA
//! CloudEvent envelope, and keeps running counters so load tests and manual
//! runs can assert on `GET /stats`. `-1` results count as error
//! notifications; successful results are compared against
//! `EXPECTED_RESULT_VALUE` (default 0.0044, the dummy-stub happy path for
//! two apps with two network elements each).

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

const ALLOWED_TYPES: [&str; 2] = [
    "org.camaraproject.energy-footprint-notification.v1.energy",
    "org.camaraproject.energy-footprint-notification.v1.carbon-footprint",
];

const EPSILON: f64 = 1e-9;

#[derive(Debug, Default, Clone, Serialize)]
struct Stats {
    total: u64,
    success: u64,
    failed: u64,
    expected_match: u64,
}

#[derive(Clone)]
struct AppState {
    stats: Arc<Mutex<Stats>>,
    expected_value: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = efn_core::Config::from_env();
    efn_observability::init(&config.log);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8090".into());
    let expected_value: f64 = std::env::var("EXPECTED_RESULT_VALUE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0044);
    tracing::info!(expected_value, "expected result value configured");

    let state = AppState {
        stats: Arc::new(Mutex::new(Stats::default())),
        expected_value,
    };

    let app = Router::new()
        .route("/", post(receive))
        .route("/stats", get(stats))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(address = %listener.local_addr()?, "sinkreceiver listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn stats(State(state): State<AppState>) -> axum::Json<Stats> {
    axum::Json(state.stats.lock().unwrap().clone())
}

async fn receive(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> StatusCode {
    {
        state.stats.lock().unwrap().total += 1;
    }

    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "failed to parse callback body");
            state.stats.lock().unwrap().failed += 1;
            return StatusCode::BAD_REQUEST;
        }
    };

    let result = match validate_cloud_event(&parsed) {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "invalid CloudEvent");
            state.stats.lock().unwrap().failed += 1;
            return StatusCode::BAD_REQUEST;
        }
    };

    let is_error_notification = result == -1.0;
    let matched = !is_error_notification && (result - state.expected_value).abs() < EPSILON;

    {
        let mut stats = state.stats.lock().unwrap();
        if is_error_notification {
            stats.failed += 1;
        } else {
            stats.success += 1;
            if matched {
                stats.expected_match += 1;
            }
        }
    }

    if is_error_notification {
        tracing::warn!(result, event_type = ?parsed["type"].as_str(), "received error notification");
    } else if !matched {
        tracing::warn!(result, expected = state.expected_value, "result does not match expected value");
    }
    tracing::debug!(
        id = ?parsed["id"].as_str(),
        event_type = ?parsed["type"].as_str(),
        result,
        is_error = is_error_notification,
        "parsed callback"
    );

    StatusCode::ACCEPTED
}

/// Lightweight validation of the CAMARA CloudEvent subset; returns the
/// result value carried in the kind-specific data field.
fn validate_cloud_event(event: &serde_json::Value) -> Result<f64, String> {
    let non_empty = |key: &str| -> Result<&str, String> {
        event[key]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing or empty {key}"))
    };

    non_empty("id")?;
    non_empty("source")?;
    let ty = non_empty("type")?;
    if !ALLOWED_TYPES.contains(&ty) {
        return Err(format!("unsupported type {ty}"));
    }
    if event["specversion"].as_str() != Some("1.0") {
        return Err("specversion must be 1.0".into());
    }
    if let Some(content_type) = event["datacontenttype"].as_str() {
        if content_type != "application/json" && content_type != "application/cloudevents+json" {
            return Err("datacontenttype must be application/json".into());
        }
    }
    let time = non_empty("time")?;
    if chrono::DateTime::parse_from_rfc3339(time).is_err() {
        return Err("invalid time format (expect RFC3339)".into());
    }

    let data = event["data"]
        .as_object()
        .ok_or_else(|| "data must be an object".to_string())?;

    let field = if ty == ALLOWED_TYPES[0] {
        "energyConsumption"
    } else {
        "carbonFootprint"
    };
    data.get(field)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| format!("missing {field} in data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_event() -> serde_json::Value {
        json!({
            "id": "evt-1",
            "source": "urn:tim:efn-notify",
            "specversion": "1.0",
            "type": "org.camaraproject.energy-footprint-notification.v1.energy",
            "time": "2025-01-01T00:00:00Z",
            "datacontenttype": "application/json",
            "data": { "requestId": "r1", "energyConsumption": 0.0044 }
        })
    }

    #[test]
    fn accepts_a_valid_energy_event() {
        assert_eq!(validate_cloud_event(&valid_event()).unwrap(), 0.0044);
    }

    #[test]
    fn extracts_the_carbon_field_for_carbon_events() {
        let mut event = valid_event();
        event["type"] =
            json!("org.camaraproject.energy-footprint-notification.v1.carbon-footprint");
        event["data"] = json!({ "requestId": "r1", "carbonFootprint": 1.47e-6 });
        assert_eq!(validate_cloud_event(&event).unwrap(), 1.47e-6);
    }

    #[test]
    fn rejects_missing_attributes() {
        for key in ["id", "source", "type", "time"] {
            let mut event = valid_event();
            event.as_object_mut().unwrap().remove(key);
            assert!(validate_cloud_event(&event).is_err(), "{key} should be required");
        }
    }

    #[test]
    fn rejects_wrong_specversion_and_type() {
        let mut event = valid_event();
        event["specversion"] = json!("0.3");
        assert!(validate_cloud_event(&event).is_err());

        let mut event = valid_event();
        event["type"] = json!("org.example.other");
        assert!(validate_cloud_event(&event).is_err());
    }

    #[test]
    fn rejects_mismatched_result_field() {
        let mut event = valid_event();
        event["data"] = json!({ "requestId": "r1", "carbonFootprint": 1.0 });
        assert!(validate_cloud_event(&event).is_err());
    }

    #[test]
    fn error_sentinel_is_a_valid_result() {
        let mut event = valid_event();
        event["data"] = json!({ "requestId": "r1", "energyConsumption": -1.0 });
        assert_eq!(validate_cloud_event(&event).unwrap(), -1.0);
    }
}
