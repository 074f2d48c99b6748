//! Subscription and notification wire types (CAMARA subset).
//!
//! These types mirror the public API schema: the subscription carried by a
//! report creation request, the sink credential, and the error body returned
//! on failures. Field names follow the wire (camelCase) so the same structs
//! serve HTTP binding and document storage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Delivery protocol for a subscription. Only `HTTP` is implemented; the
/// remaining variants exist so a request naming them binds cleanly and can be
/// answered with 501 instead of 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "MQTT3")]
    Mqtt3,
    #[serde(rename = "MQTT5")]
    Mqtt5,
    #[serde(rename = "AMQP")]
    Amqp,
    #[serde(rename = "NATS")]
    Nats,
    #[serde(rename = "KAFKA")]
    Kafka,
}

/// Credential type carried by a sink credential. Only `ACCESSTOKEN` is
/// implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "ACCESSTOKEN")]
    AccessToken,
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "REFRESHTOKEN")]
    RefreshToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum AccessTokenType {
    #[serde(rename = "bearer")]
    Bearer,
    /// Any other token type on the wire; kept so the API can answer 501
    /// instead of failing to bind.
    #[serde(rename = "unknown")]
    Unknown,
}

impl From<String> for AccessTokenType {
    fn from(value: String) -> Self {
        if value == "bearer" {
            AccessTokenType::Bearer
        } else {
            AccessTokenType::Unknown
        }
    }
}

/// A sink credential enabling delivery to a protected sink.
///
/// The token fields are optional at bind time so that unsupported credential
/// types can be answered with 501; for an `ACCESSTOKEN` credential all three
/// must be present explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkCredential {
    pub credential_type: CredentialType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_type: Option<AccessTokenType>,
}

impl SinkCredential {
    /// The bearer token, when this is a fully-specified bearer
    /// `ACCESSTOKEN` credential.
    pub fn bearer_token(&self) -> Option<&str> {
        if self.credential_type != CredentialType::AccessToken {
            return None;
        }
        if self.access_token_type != Some(AccessTokenType::Bearer) {
            return None;
        }
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Transport settings for HTTP sinks. `headers` are copied verbatim onto the
/// outbound notification request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Subscription manager configuration (CAMARA `config` object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfig {
    /// Accepted but a no-op for this API (logged at subscription time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_event: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_expire_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_max_events: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_detail: Option<serde_json::Value>,
}

/// The subscription part of a report creation request: where and how the
/// single result notification is to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub protocol: Protocol,
    pub sink: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_settings: Option<ProtocolSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_credential: Option<SinkCredential>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub config: SubscriptionConfig,
}

impl SubscriptionRequest {
    pub fn expire_time(&self) -> Option<DateTime<Utc>> {
        self.config.subscription_expire_time
    }

    pub fn custom_headers(&self) -> Option<&HashMap<String, String>> {
        self.protocol_settings.as_ref().and_then(|s| s.headers.as_ref())
    }

    /// Support constraints on the subscription: HTTP delivery only, and a
    /// sink credential (when present) must be a bearer `ACCESSTOKEN` with
    /// every field explicitly supplied.
    ///
    /// `NotImplemented` marks capabilities outside this implementation
    /// (surfaced as 501); `Validation` marks an incomplete credential
    /// (surfaced as 400).
    pub fn validate_support(&self) -> DomainResult<()> {
        if self.protocol != Protocol::Http {
            return Err(DomainError::not_implemented(
                "only the HTTP protocol is supported",
            ));
        }
        let Some(cred) = &self.sink_credential else {
            return Ok(());
        };
        if cred.credential_type != CredentialType::AccessToken {
            return Err(DomainError::not_implemented(
                "only ACCESSTOKEN sink credentials are supported",
            ));
        }
        match cred.access_token_type {
            Some(AccessTokenType::Bearer) => {}
            Some(AccessTokenType::Unknown) => {
                return Err(DomainError::not_implemented(
                    "only bearer access tokens are supported",
                ));
            }
            None => {
                return Err(DomainError::validation(
                    "sink credential is missing accessTokenType",
                ));
            }
        }
        if cred.access_token.as_deref().unwrap_or("").is_empty() {
            return Err(DomainError::validation(
                "sink credential is missing accessToken",
            ));
        }
        if cred.access_token_expires_utc.is_none() {
            return Err(DomainError::validation(
                "sink credential is missing accessTokenExpiresUtc",
            ));
        }
        Ok(())
    }
}

/// Time window under analysis. `end_date`, when present, must be strictly
/// after `start_date`; both bounds are validated against the configured
/// maximum look-back at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePeriod {
    pub start_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Error body returned by the public API and carried inside error
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// A human-readable code (e.g. `OUT_OF_RANGE`, `Internal Server Error`).
    pub code: String,
    pub message: String,
    /// HTTP response status code.
    pub status: u16,
}

impl ErrorInfo {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// Build an error with the default code for the status (the HTTP reason
    /// phrase), mirroring the API error responses.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, reason_phrase(status), message)
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_credential_bearer_token_requires_all_fields() {
        let full: SinkCredential = serde_json::from_value(serde_json::json!({
            "credentialType": "ACCESSTOKEN",
            "accessToken": "tok-123",
            "accessTokenExpiresUtc": "2030-01-01T00:00:00Z",
            "accessTokenType": "bearer"
        }))
        .unwrap();
        assert_eq!(full.bearer_token(), Some("tok-123"));

        let missing_type: SinkCredential = serde_json::from_value(serde_json::json!({
            "credentialType": "ACCESSTOKEN",
            "accessToken": "tok-123"
        }))
        .unwrap();
        assert_eq!(missing_type.bearer_token(), None);

        let plain: SinkCredential = serde_json::from_value(serde_json::json!({
            "credentialType": "PLAIN",
            "accessToken": "tok-123",
            "accessTokenType": "bearer"
        }))
        .unwrap();
        assert_eq!(plain.bearer_token(), None);
    }

    #[test]
    fn subscription_request_binds_minimal_body() {
        let req: SubscriptionRequest = serde_json::from_value(serde_json::json!({
            "protocol": "HTTP",
            "sink": "http://sink.example/"
        }))
        .unwrap();
        assert_eq!(req.protocol, Protocol::Http);
        assert!(req.types.is_empty());
        assert!(req.expire_time().is_none());
    }

    #[test]
    fn unsupported_protocol_still_binds() {
        let req: SubscriptionRequest = serde_json::from_value(serde_json::json!({
            "protocol": "KAFKA",
            "sink": "kafka://topic"
        }))
        .unwrap();
        assert_eq!(req.protocol, Protocol::Kafka);
        assert!(matches!(
            req.validate_support(),
            Err(DomainError::NotImplemented(_))
        ));
    }

    #[test]
    fn support_validation_distinguishes_unsupported_from_incomplete() {
        let mut req: SubscriptionRequest = serde_json::from_value(serde_json::json!({
            "protocol": "HTTP",
            "sink": "http://sink.example/",
            "sinkCredential": {
                "credentialType": "ACCESSTOKEN",
                "accessToken": "tok-123",
                "accessTokenExpiresUtc": "2030-01-01T00:00:00Z",
                "accessTokenType": "bearer"
            }
        }))
        .unwrap();
        assert!(req.validate_support().is_ok());

        // A non-bearer token type is a capability gap, not a bad request.
        req.sink_credential.as_mut().unwrap().access_token_type =
            Some(AccessTokenType::Unknown);
        assert!(matches!(
            req.validate_support(),
            Err(DomainError::NotImplemented(_))
        ));

        // A missing field is a bad request.
        let cred = req.sink_credential.as_mut().unwrap();
        cred.access_token_type = Some(AccessTokenType::Bearer);
        cred.access_token = None;
        assert!(matches!(
            req.validate_support(),
            Err(DomainError::Validation(_))
        ));
    }
}
