//! Cloud observability collaborator: per-app and per-NE energy readings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use efn_core::TimePeriod;

use crate::UpstreamError;

#[async_trait]
pub trait CloudObservability: Send + Sync {
    /// Energy consumption of the application instance itself, in kWh.
    async fn app_energy_consumption(
        &self,
        app_instance_id: &str,
        time_period: Option<&TimePeriod>,
        app_infra_type: &str,
    ) -> Result<f64, UpstreamError>;

    /// Energy consumption of a single network element, in kWh.
    async fn network_element_energy_consumption(
        &self,
        app_instance_id: &str,
        time_period: Option<&TimePeriod>,
        ne_infra_type: &str,
    ) -> Result<f64, UpstreamError>;
}

/// Stub returning fixed readings.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyObservability;

#[async_trait]
impl CloudObservability for DummyObservability {
    async fn app_energy_consumption(
        &self,
        _app_instance_id: &str,
        _time_period: Option<&TimePeriod>,
        _app_infra_type: &str,
    ) -> Result<f64, UpstreamError> {
        Ok(0.0020)
    }

    async fn network_element_energy_consumption(
        &self,
        _app_instance_id: &str,
        _time_period: Option<&TimePeriod>,
        _ne_infra_type: &str,
    ) -> Result<f64, UpstreamError> {
        Ok(0.0010)
    }
}

/// Stub with behavior driven by environment variables, used to exercise the
/// throttling and permanent failure paths:
///
/// - `CLOUDOBS_CONFIG_APP_VALUE`: app reading (default 0.0020)
/// - `CLOUDOBS_CONFIG_NE_VALUE`: NE reading (default 0.0010)
/// - `CLOUDOBS_CONFIG_ERROR_COUNT`: if > 0, every request fails
/// - `CLOUDOBS_CONFIG_ERROR_TYPE`: `throttling` (default) or `permanent`
/// - `CLOUDOBS_CONFIG_DELAY_MS`: per-request processing delay
#[derive(Debug)]
pub struct ConfigurableObservability {
    app_value: f64,
    ne_value: f64,
    always_fail: bool,
    error_is_permanent: bool,
    delay: Duration,
    request_count: AtomicU64,
}

impl ConfigurableObservability {
    pub fn from_env() -> Self {
        Self::new(
            env_f64("CLOUDOBS_CONFIG_APP_VALUE", 0.0020),
            env_f64("CLOUDOBS_CONFIG_NE_VALUE", 0.0010),
            env_u64("CLOUDOBS_CONFIG_ERROR_COUNT", 0) > 0,
            std::env::var("CLOUDOBS_CONFIG_ERROR_TYPE").as_deref() == Ok("permanent"),
            Duration::from_millis(env_u64("CLOUDOBS_CONFIG_DELAY_MS", 0)),
        )
    }

    pub fn new(
        app_value: f64,
        ne_value: f64,
        always_fail: bool,
        error_is_permanent: bool,
        delay: Duration,
    ) -> Self {
        Self {
            app_value,
            ne_value,
            always_fail,
            error_is_permanent,
            delay,
            request_count: AtomicU64::new(0),
        }
    }

    async fn gate(&self) -> Result<(), UpstreamError> {
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
        Ok(())
    }
}

#[async_trait]
impl CloudObservability for ConfigurableObservability {
    async fn app_energy_consumption(
        &self,
        _app_instance_id: &str,
        _time_period: Option<&TimePeriod>,
        _app_infra_type: &str,
    ) -> Result<f64, UpstreamError> {
        self.gate().await?;
        Ok(self.app_value)
    }

    async fn network_element_energy_consumption(
        &self,
        _app_instance_id: &str,
        _time_period: Option<&TimePeriod>,
        _ne_infra_type: &str,
    ) -> Result<f64, UpstreamError> {
        self.gate().await?;
        Ok(self.ne_value)
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
