//! CloudEvents 1.0 JSON envelope.
//!
//! Both HTTP bindings are supported on the receive side: structured mode
//! (the whole envelope as the JSON body) and binary mode (`ce-*` headers
//! with the data as the body). Emission always uses structured mode.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::{EventType, Source};

/// Extension attribute carrying the API caller's correlator end to end.
pub const X_CORRELATOR_EXTENSION: &str = "x-correlator";

pub const SPEC_VERSION: &str = "1.0";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CLOUDEVENTS: &str = "application/cloudevents+json";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid CloudEvent body: {0}")]
    Body(#[from] serde_json::Error),
    #[error("missing required attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("unsupported specversion: {0}")]
    SpecVersion(String),
}

/// A CloudEvents 1.0 event in its JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    pub specversion: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Extension attributes (anything not captured above).
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl CloudEvent {
    /// Build an internal event with JSON data.
    pub fn new<D: Serialize>(
        id: impl Into<String>,
        event_type: EventType,
        source: Source,
        data: &D,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            source: source.as_str().to_string(),
            specversion: SPEC_VERSION.to_string(),
            ty: event_type.as_str().to_string(),
            time: Some(Utc::now()),
            datacontenttype: Some(CONTENT_TYPE_JSON.to_string()),
            data: Some(serde_json::to_value(data)?),
            extensions: BTreeMap::new(),
        })
    }

    /// Build an internal event without data (e.g. the terminal
    /// notification-sent breadcrumb).
    pub fn without_data(id: impl Into<String>, event_type: EventType, source: Source) -> Self {
        Self {
            id: id.into(),
            source: source.as_str().to_string(),
            specversion: SPEC_VERSION.to_string(),
            ty: event_type.as_str().to_string(),
            time: Some(Utc::now()),
            datacontenttype: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::parse(&self.ty)
    }

    /// Deserialize the data payload into a typed struct.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let data = self.data.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data)
    }

    /// A string-valued extension attribute, if present and non-empty.
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Parse an event from an HTTP delivery: binary mode when a `ce-id`
    /// header is present, structured mode otherwise.
    pub fn from_http_parts(
        headers: &axum::http::HeaderMap,
        body: &[u8],
    ) -> Result<Self, ParseError> {
        if headers.contains_key("ce-id") {
            return Self::from_binary(headers, body);
        }

        let event: CloudEvent = serde_json::from_slice(body)?;
        if event.specversion != SPEC_VERSION {
            return Err(ParseError::SpecVersion(event.specversion));
        }
        if event.id.is_empty() {
            return Err(ParseError::MissingAttribute("id"));
        }
        if event.ty.is_empty() {
            return Err(ParseError::MissingAttribute("type"));
        }
        Ok(event)
    }

    fn from_binary(headers: &axum::http::HeaderMap, body: &[u8]) -> Result<Self, ParseError> {
        let attr = |name: &'static str| -> Result<String, ParseError> {
            headers
                .get(format!("ce-{name}").as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or(ParseError::MissingAttribute(name))
        };

        let specversion = attr("specversion")?;
        if specversion != SPEC_VERSION {
            return Err(ParseError::SpecVersion(specversion));
        }

        let data = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(body)?)
        };

        let mut extensions = BTreeMap::new();
        for (name, value) in headers {
            let Some(ext) = name.as_str().strip_prefix("ce-") else {
                continue;
            };
            if matches!(ext, "id" | "source" | "specversion" | "type" | "time") {
                continue;
            }
            if let Ok(value) = value.to_str() {
                extensions.insert(ext.to_string(), serde_json::Value::String(value.to_string()));
            }
        }

        Ok(Self {
            id: attr("id")?,
            source: attr("source")?,
            specversion,
            ty: attr("type")?,
            time: headers
                .get("ce-time")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
            datacontenttype: headers
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            data,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn structured_round_trip_preserves_extensions() {
        let event = CloudEvent::new(
            "evt-1",
            EventType::GatherInfoRequested,
            Source::Api,
            &serde_json::json!({"requestId": "r1"}),
        )
        .unwrap()
        .with_extension(X_CORRELATOR_EXTENSION, "corr-42");

        let bytes = serde_json::to_vec(&event).unwrap();
        let parsed = CloudEvent::from_http_parts(&HeaderMap::new(), &bytes).unwrap();

        assert_eq!(parsed.id, "evt-1");
        assert_eq!(parsed.event_type(), Some(EventType::GatherInfoRequested));
        assert_eq!(parsed.extension(X_CORRELATOR_EXTENSION), Some("corr-42"));
    }

    #[test]
    fn binary_mode_reads_ce_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", "evt-2".parse().unwrap());
        headers.insert("ce-source", "urn:tim:efn-worker".parse().unwrap());
        headers.insert("ce-specversion", "1.0".parse().unwrap());
        headers.insert("ce-type", "it.tim.efn.calculation.requested".parse().unwrap());
        headers.insert("ce-efnretrycount", "3".parse().unwrap());

        let parsed = CloudEvent::from_http_parts(&headers, b"{}").unwrap();
        assert_eq!(parsed.id, "evt-2");
        assert_eq!(parsed.event_type(), Some(EventType::CalculationRequested));
        assert_eq!(parsed.extension("efnretrycount"), Some("3"));
    }

    #[test]
    fn rejects_unknown_specversion() {
        let body = serde_json::json!({
            "id": "x", "source": "s", "specversion": "0.3", "type": "t"
        });
        let err =
            CloudEvent::from_http_parts(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap())
                .unwrap_err();
        assert!(matches!(err, ParseError::SpecVersion(_)));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(CloudEvent::from_http_parts(&HeaderMap::new(), b"not json").is_err());
    }
}
