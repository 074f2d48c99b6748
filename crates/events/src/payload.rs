//! Typed payloads for the internal events, plus deterministic event-id
//! derivation.
//!
//! Event ids are UUIDv5 over fixed namespaces so a retried emitter produces
//! the same ids; broker and store deduplicate the rest.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use efn_core::{ErrorInfo, TimePeriod};

use crate::cloudevent::CloudEvent;
use crate::kind::EventType;

/// Payload of `GatherInfoRequested`, scoped to one application instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherInfoData {
    pub request_id: String,
    pub application_instance_id: String,
}

/// Payload of `AppConsumptionRequested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConsumptionData {
    pub request_id: String,
    pub application_instance_id: String,
    pub time_period: Option<TimePeriod>,
    pub app_infra_type: String,
    #[serde(rename = "numberOfTotalNEs")]
    pub number_of_total_nes: usize,
}

/// A single network element as carried inside traffic events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElementInfo {
    pub ne_instance_id: String,
    pub vendor_id: String,
    pub network_id: String,
    pub ne_infra_type: String,
}

/// Payload of `NetworkElementEnergyRequested` (one event per NE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElementEnergyData {
    pub request_id: String,
    pub application_instance_id: String,
    pub ne_instance_id: String,
    pub ne_infra_type: String,
    pub time_period: Option<TimePeriod>,
    #[serde(rename = "numberOfTotalNEs")]
    pub number_of_total_nes: usize,
}

/// Payload of `NetworkElementTrafficRequested` (one batch event per app).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElementTrafficData {
    pub request_id: String,
    pub application_instance_id: String,
    pub app_instance_ip_list: Vec<String>,
    pub time_period: Option<TimePeriod>,
    pub network_elements: Vec<NetworkElementInfo>,
}

/// Payload of `CalculationRequested`. Intentionally empty; everything is
/// read back from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequestedData {}

/// Payload of `NotificationRequested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequestedData {
    pub request_id: String,
    pub result: f64,
}

/// Payload of `NotificationErrorRequested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationErrorRequestedData {
    pub request_id: String,
    #[serde(flatten)]
    pub error: ErrorInfo,
}

impl NotificationErrorRequestedData {
    pub fn new(request_id: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            error: ErrorInfo::from_status(status, message),
        }
    }
}

/// Minimal view of any internal payload; every internal event carries a
/// `requestId`, which is all the DLQ handler needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestScoped {
    pub request_id: String,
}

/// Tagged union of the worker-consumed payloads, decoded from the event
/// `type` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    GatherInfo(GatherInfoData),
    AppConsumption(AppConsumptionData),
    NetworkElementEnergy(NetworkElementEnergyData),
    NetworkElementTraffic(NetworkElementTrafficData),
    Calculation(CalculationRequestedData),
    Notification(NotificationRequestedData),
    NotificationError(NotificationErrorRequestedData),
    NotificationSent,
}

impl EventPayload {
    /// Decode the payload for a known event type. Returns `Ok(None)` for
    /// types outside the internal registry (deliberately ignored upstream).
    pub fn decode(event: &CloudEvent) -> Result<Option<Self>, serde_json::Error> {
        let Some(ty) = event.event_type() else {
            return Ok(None);
        };
        let payload = match ty {
            EventType::GatherInfoRequested => Self::GatherInfo(event.data_as()?),
            EventType::AppConsumptionRequested => Self::AppConsumption(event.data_as()?),
            EventType::NetworkElementEnergyRequested => {
                Self::NetworkElementEnergy(event.data_as()?)
            }
            EventType::NetworkElementTrafficRequested => {
                Self::NetworkElementTraffic(event.data_as()?)
            }
            EventType::CalculationRequested => Self::Calculation(CalculationRequestedData {}),
            EventType::NotificationRequested => Self::Notification(event.data_as()?),
            EventType::NotificationErrorRequested => Self::NotificationError(event.data_as()?),
            EventType::NotificationSent => Self::NotificationSent,
        };
        Ok(Some(payload))
    }
}

const NUL: &str = "\u{0}";

fn namespace(seed: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
}

/// Deterministic id for app-scoped events (`GatherInfoRequested` and
/// `AppConsumptionRequested` share it by design).
pub fn event_id_for_app(request_id: &str, app_instance_id: &str) -> Uuid {
    let ns = namespace("camara-efn-api:event-id");
    Uuid::new_v5(&ns, format!("{request_id}{NUL}{app_instance_id}").as_bytes())
}

/// Deterministic id for a single network element energy request.
pub fn event_id_for_ne(request_id: &str, app_instance_id: &str, ne_instance_id: &str) -> Uuid {
    let ns = namespace("camara-efn-api:event-id:ne");
    Uuid::new_v5(
        &ns,
        format!("{request_id}{NUL}{app_instance_id}{NUL}{ne_instance_id}").as_bytes(),
    )
}

/// Deterministic id for the batch traffic request of an application instance.
pub fn event_id_for_traffic(request_id: &str, app_instance_id: &str) -> Uuid {
    let ns = namespace("camara-efn-api:event-id:traffic");
    Uuid::new_v5(&ns, format!("{request_id}{NUL}{app_instance_id}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::Source;

    #[test]
    fn event_ids_are_deterministic_and_scoped() {
        let a = event_id_for_app("req-1", "app-1");
        assert_eq!(a, event_id_for_app("req-1", "app-1"));
        assert_ne!(a, event_id_for_app("req-1", "app-2"));
        assert_ne!(a, event_id_for_app("req-2", "app-1"));

        // Different namespaces keep the same name from colliding.
        assert_ne!(a, event_id_for_traffic("req-1", "app-1"));

        let ne = event_id_for_ne("req-1", "app-1", "ne-instance-1");
        assert_eq!(ne, event_id_for_ne("req-1", "app-1", "ne-instance-1"));
        assert_ne!(ne, event_id_for_ne("req-1", "app-1", "ne-instance-2"));
    }

    #[test]
    fn separator_prevents_boundary_ambiguity() {
        assert_ne!(event_id_for_app("ab", "c"), event_id_for_app("a", "bc"));
    }

    #[test]
    fn payload_field_names_match_the_wire() {
        let data = NetworkElementEnergyData {
            request_id: "r".into(),
            application_instance_id: "a".into(),
            ne_instance_id: "ne".into(),
            ne_infra_type: "UPF-1".into(),
            time_period: None,
            number_of_total_nes: 2,
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["requestId"], "r");
        assert_eq!(value["applicationInstanceId"], "a");
        assert_eq!(value["neInstanceId"], "ne");
        assert_eq!(value["neInfraType"], "UPF-1");
        assert_eq!(value["numberOfTotalNEs"], 2);
    }

    #[test]
    fn error_payload_flattens_error_info() {
        let data = NotificationErrorRequestedData::new("r", 500, "boom");
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["requestId"], "r");
        assert_eq!(value["status"], 500);
        assert_eq!(value["code"], "Internal Server Error");
        assert_eq!(value["message"], "boom");
    }

    #[test]
    fn decode_routes_by_type() {
        let event = CloudEvent::new(
            "id",
            EventType::GatherInfoRequested,
            Source::Api,
            &GatherInfoData {
                request_id: "r".into(),
                application_instance_id: "a".into(),
            },
        )
        .unwrap();

        match EventPayload::decode(&event).unwrap() {
            Some(EventPayload::GatherInfo(data)) => {
                assert_eq!(data.request_id, "r");
                assert_eq!(data.application_instance_id, "a");
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let mut unknown = event;
        unknown.ty = "it.tim.efn.unknown".into();
        assert_eq!(EventPayload::decode(&unknown).unwrap(), None);
    }
}
