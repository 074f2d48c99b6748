//! Policy decision point: can this subject analyze these application
//! instances?

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("access denied to application ids: {0:?}")]
    Denied(Vec<String>),

    #[error("policy decision point unreachable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Policy: Send + Sync {
    /// Check that `subject` may analyze every application id. Any denial is
    /// an error listing the denied ids.
    async fn has_access_to_application_ids(
        &self,
        subject: &str,
        app_ids: &[String],
    ) -> Result<(), PolicyError>;
}

/// Unconditionally permits access. For development environments where
/// authorization is not enforced yet (`PDP_SKIP_POLICY_CHECK=true`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Policy for AllowAll {
    async fn has_access_to_application_ids(
        &self,
        _subject: &str,
        _app_ids: &[String],
    ) -> Result<(), PolicyError> {
        Ok(())
    }
}

/// HTTP client for a Cerbos-style policy decision point: one batched
/// resource check per request, action `view` per application id.
#[derive(Debug, Clone)]
pub struct HttpPdp {
    client: reqwest::Client,
    address: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    results: Vec<CheckResult>,
}

#[derive(Debug, Deserialize)]
struct CheckResult {
    resource: CheckedResource,
    #[serde(default)]
    actions: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CheckedResource {
    id: String,
}

impl HttpPdp {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            address: address.into(),
        }
    }
}

#[async_trait]
impl Policy for HttpPdp {
    async fn has_access_to_application_ids(
        &self,
        subject: &str,
        app_ids: &[String],
    ) -> Result<(), PolicyError> {
        if app_ids.is_empty() {
            return Ok(());
        }

        let resources: Vec<_> = app_ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "resource": {
                        "kind": "appId",
                        "id": id,
                        "attr": { "owner": subject }
                    },
                    "actions": ["view"]
                })
            })
            .collect();

        let body = serde_json::json!({
            "principal": { "id": subject, "roles": ["user"] },
            "resources": resources,
        });

        let response = self
            .client
            .post(format!("{}/api/check/resources", self.address))
            .json(&body)
            .send()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PolicyError::Unavailable(format!(
                "policy check returned status {}",
                response.status()
            )));
        }

        let decision: CheckResponse = response
            .json()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        let allowed: std::collections::HashSet<&str> = decision
            .results
            .iter()
            .filter(|r| r.actions.get("view").map(String::as_str) == Some("EFFECT_ALLOW"))
            .map(|r| r.resource.id.as_str())
            .collect();

        let denied: Vec<String> = app_ids
            .iter()
            .filter(|id| !allowed.contains(id.as_str()))
            .cloned()
            .collect();

        if !denied.is_empty() {
            tracing::warn!(subject, ?denied, "policy denied access");
            return Err(PolicyError::Denied(denied));
        }
        Ok(())
    }
}
