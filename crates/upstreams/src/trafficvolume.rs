//! Traffic volume collaborator: per-NE traffic measurements, retrieved in
//! one batch call per application instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use efn_core::TimePeriod;

use crate::UpstreamError;

/// Identifies a network element towards the traffic volume API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficNetworkElement {
    pub vendor_identifier: String,
    pub ne_identifier: String,
}

/// Volume measurements for one network element over the requested window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficVolumeMeasure {
    pub network_element: TrafficNetworkElement,
    /// Volume attributable to the application instance's IPs.
    #[serde(rename = "trafficVolumeIP")]
    pub traffic_volume_ip: f64,
    /// Total volume through the element.
    pub traffic_volume_all: f64,
}

#[async_trait]
pub trait TrafficVolume: Send + Sync {
    /// Retrieve measurements for all listed network elements in one call.
    async fn retrieve_traffic_volumes(
        &self,
        app_instance_ip_list: &[String],
        network_elements: &[TrafficNetworkElement],
        time_period: Option<&TimePeriod>,
    ) -> Result<Vec<TrafficVolumeMeasure>, UpstreamError>;
}

/// Stub returning fixed volumes for every requested element.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyTrafficVolume;

#[async_trait]
impl TrafficVolume for DummyTrafficVolume {
    async fn retrieve_traffic_volumes(
        &self,
        _app_instance_ip_list: &[String],
        network_elements: &[TrafficNetworkElement],
        _time_period: Option<&TimePeriod>,
    ) -> Result<Vec<TrafficVolumeMeasure>, UpstreamError> {
        Ok(network_elements
            .iter()
            .map(|ne| TrafficVolumeMeasure {
                network_element: ne.clone(),
                traffic_volume_ip: 100.0,
                traffic_volume_all: 1000.0,
            })
            .collect())
    }
}

/// Environment-driven stub, mirroring [`crate::ConfigurableObservability`]:
/// `TRAFFIC_CONFIG_IP_VALUE`, `TRAFFIC_CONFIG_ALL_VALUE`,
/// `TRAFFIC_CONFIG_ERROR_COUNT`, `TRAFFIC_CONFIG_ERROR_TYPE`,
/// `TRAFFIC_CONFIG_DELAY_MS`.
#[derive(Debug)]
pub struct ConfigurableTrafficVolume {
    ip_value: f64,
    all_value: f64,
    always_fail: bool,
    error_is_permanent: bool,
    delay: Duration,
    request_count: AtomicU64,
}

impl ConfigurableTrafficVolume {
    pub fn from_env() -> Self {
        let parse_f64 = |key: &str, default: f64| {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let parse_u64 = |key: &str, default: u64| {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        Self::new(
            parse_f64("TRAFFIC_CONFIG_IP_VALUE", 100.0),
            parse_f64("TRAFFIC_CONFIG_ALL_VALUE", 1000.0),
            parse_u64("TRAFFIC_CONFIG_ERROR_COUNT", 0) > 0,
            std::env::var("TRAFFIC_CONFIG_ERROR_TYPE").as_deref() == Ok("permanent"),
            Duration::from_millis(parse_u64("TRAFFIC_CONFIG_DELAY_MS", 0)),
        )
    }

    pub fn new(
        ip_value: f64,
        all_value: f64,
        always_fail: bool,
        error_is_permanent: bool,
        delay: Duration,
    ) -> Self {
        Self {
            ip_value,
            all_value,
            always_fail,
            error_is_permanent,
            delay,
            request_count: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl TrafficVolume for ConfigurableTrafficVolume {
    async fn retrieve_traffic_volumes(
        &self,
        _app_instance_ip_list: &[String],
        network_elements: &[TrafficNetworkElement],
        _time_period: Option<&TimePeriod>,
    ) -> Result<Vec<TrafficVolumeMeasure>, UpstreamError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.always_fail {
            return Err(if self.error_is_permanent {
                UpstreamError::permanent(format!("configurable permanent error (request #{n})"))
            } else {
                UpstreamError::throttling(format!("configurable throttling error (request #{n})"))
            });
        }
        Ok(network_elements
            .iter()
            .map(|ne| TrafficVolumeMeasure {
                network_element: ne.clone(),
                traffic_volume_ip: self.ip_value,
                traffic_volume_all: self.all_value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements() -> Vec<TrafficNetworkElement> {
        vec![
            TrafficNetworkElement {
                vendor_identifier: "vendor-1".into(),
                ne_identifier: "ne-instance-1".into(),
            },
            TrafficNetworkElement {
                vendor_identifier: "vendor-2".into(),
                ne_identifier: "ne-instance-2".into(),
            },
        ]
    }

    #[tokio::test]
    async fn dummy_measures_every_requested_element() {
        let measures = DummyTrafficVolume
            .retrieve_traffic_volumes(&["84.125.93.10".into()], &elements(), None)
            .await
            .unwrap();
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].traffic_volume_ip, 100.0);
        assert_eq!(measures[0].traffic_volume_all, 1000.0);
        assert_eq!(measures[1].network_element.ne_identifier, "ne-instance-2");
    }

    #[tokio::test]
    async fn configurable_injects_errors() {
        let stub = ConfigurableTrafficVolume::new(1.0, 2.0, true, true, Duration::ZERO);
        let err = stub
            .retrieve_traffic_volumes(&[], &elements(), None)
            .await
            .unwrap_err();
        assert!(!err.is_throttling());
    }
}
