//! Job and partial-result documents.
//!
//! A `Job` is the root entity for one accepted report request; it is created
//! once by the API and afterwards mutated only through the store's two atomic
//! compare-and-set flags. `JobAppResult` accumulates the partial results for
//! one application instance within a job, written field-by-field by any
//! number of concurrent worker replicas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subscription::{SubscriptionRequest, TimePeriod};

/// What the job computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    EnergyConsumption,
    CarbonFootprint,
}

impl RequestKind {
    /// The CAMARA subscription/notification event type for this kind.
    pub fn notification_type(&self) -> &'static str {
        match self {
            RequestKind::EnergyConsumption => {
                "org.camaraproject.energy-footprint-notification.v1.energy"
            }
            RequestKind::CarbonFootprint => {
                "org.camaraproject.energy-footprint-notification.v1.carbon-footprint"
            }
        }
    }

    /// The key under which the result is delivered in the notification data.
    pub fn result_field(&self) -> &'static str {
        match self {
            RequestKind::EnergyConsumption => "energyConsumption",
            RequestKind::CarbonFootprint => "carbonFootprint",
        }
    }
}

/// Coarse job status. Advisory only; correctness never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Immutable part of a job, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Server-allocated request identifier (UUIDv4, stored as string).
    pub request_id: String,
    pub request_kind: RequestKind,
    /// Application instance identifiers producing the service under analysis.
    pub service: Vec<Uuid>,
    pub subscription_request: SubscriptionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<TimePeriod>,
}

/// The stored job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(flatten)]
    pub spec: JobSpec,
    /// Correlator captured from the inbound API request, forwarded to the
    /// sink on delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_correlator: Option<String>,
    /// Set once the calculation event has been emitted. False -> true only.
    #[serde(default)]
    pub calculation_triggered: bool,
    /// Set once a notification has been claimed for delivery. False -> true
    /// only.
    #[serde(default)]
    pub notification_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl Job {
    pub fn new(spec: JobSpec, x_correlator: Option<String>) -> Self {
        Self {
            spec,
            x_correlator,
            calculation_triggered: false,
            notification_sent: false,
            status: Some(JobStatus::Pending),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.spec.request_id
    }
}

/// Identity + insert-only metadata of a partial-result document. Carried in
/// every partial event so the first writer for a `(job, app)` pair can pin
/// `number_of_total_nes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAppResultMetadata {
    pub job_id: String,
    pub app_id: String,
    /// Total number of network elements serving the app, discovered during
    /// gather-info. Set on insert, never overwritten.
    pub number_of_total_nes: usize,
}

/// Per-network-element partial result. Fields arrive independently (energy
/// from one event, the traffic pair from another) and in any order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElementResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_instance_traffic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_traffic: Option<f64>,
}

impl NetworkElementResult {
    pub fn is_complete(&self) -> bool {
        self.energy_consumption.is_some()
            && self.app_instance_traffic.is_some()
            && self.total_traffic.is_some()
    }
}

/// Partial results for one application instance within a job; unique per
/// `(job_id, app_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAppResult {
    pub job_id: String,
    pub app_id: String,
    pub number_of_total_nes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_instance_energy_consumption: Option<f64>,
    #[serde(default)]
    pub network_elements: BTreeMap<String, NetworkElementResult>,
}

impl JobAppResult {
    /// Whether every field for this app has been gathered: the app-level
    /// consumption, one entry per expected network element, and all three
    /// fields on each entry.
    pub fn is_complete(&self) -> bool {
        self.app_instance_energy_consumption.is_some()
            && self.network_elements.len() == self.number_of_total_nes
            && self.network_elements.values().all(NetworkElementResult::is_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(nes: usize, complete: bool) -> JobAppResult {
        let mut network_elements = BTreeMap::new();
        for i in 0..nes {
            network_elements.insert(
                format!("ne-instance-{i}"),
                NetworkElementResult {
                    energy_consumption: Some(0.001),
                    app_instance_traffic: Some(100.0),
                    total_traffic: if complete { Some(1000.0) } else { None },
                },
            );
        }
        JobAppResult {
            job_id: "job-1".into(),
            app_id: "app-1".into(),
            number_of_total_nes: nes,
            app_instance_energy_consumption: Some(0.002),
            network_elements,
        }
    }

    #[test]
    fn complete_when_all_fields_present() {
        assert!(result_with(2, true).is_complete());
    }

    #[test]
    fn incomplete_when_ne_field_missing() {
        assert!(!result_with(2, false).is_complete());
    }

    #[test]
    fn incomplete_when_ne_count_short() {
        let mut r = result_with(2, true);
        r.number_of_total_nes = 3;
        assert!(!r.is_complete());
    }

    #[test]
    fn incomplete_without_app_consumption() {
        let mut r = result_with(1, true);
        r.app_instance_energy_consumption = None;
        assert!(!r.is_complete());
    }

    #[test]
    fn job_documents_round_trip_through_json() {
        let job = Job::new(
            JobSpec {
                request_id: "6e8bc430-9c3a-11d9-9669-0800200c9a66".into(),
                request_kind: RequestKind::CarbonFootprint,
                service: vec![Uuid::nil()],
                subscription_request: serde_json::from_value(serde_json::json!({
                    "protocol": "HTTP",
                    "sink": "http://sink.example/",
                    "types": ["org.camaraproject.energy-footprint-notification.v1.carbon-footprint"]
                }))
                .unwrap(),
                time_period: None,
            },
            Some("corr-1".into()),
        );

        let round: Job =
            serde_json::from_value(serde_json::to_value(&job).unwrap()).unwrap();
        assert_eq!(round, job);
        assert!(!round.calculation_triggered);
        assert_eq!(round.spec.request_kind.result_field(), "carbonFootprint");
    }
}
