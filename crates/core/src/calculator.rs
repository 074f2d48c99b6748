//! Report calculator.
//!
//! The arithmetic is deliberately small and pure: it reads only the stored
//! partial results, so re-running a calculation for the same job yields the
//! same number.

use thiserror::Error;

use crate::job::JobAppResult;

/// Default carbon conversion factor in tCO2e per kWh.
pub const DEFAULT_CARBON_FACTOR: f64 = 0.00035;

/// Permanent data errors detected at calculation time. Every variant means a
/// job reached calculation with an invariant-violating partial result; the
/// caller surfaces these as error notifications, never as retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    #[error("missing energy consumption for application instance {app_id}")]
    MissingAppConsumption { app_id: String },

    #[error("network element count mismatch for application instance {app_id}: expected {expected}, got {actual}")]
    NetworkElementCountMismatch {
        app_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("missing field for network element {ne_id} of application instance {app_id}")]
    MissingNetworkElementField { app_id: String, ne_id: String },

    #[error("total traffic is zero for network element {ne_id} of application instance {app_id}")]
    ZeroTotalTraffic { app_id: String, ne_id: String },
}

/// Computes energy consumption and carbon footprint from gathered partials.
#[derive(Debug, Clone, Copy)]
pub struct Calculator {
    carbon_factor: f64,
}

impl Calculator {
    /// A non-positive factor falls back to [`DEFAULT_CARBON_FACTOR`].
    pub fn new(carbon_factor: f64) -> Self {
        let carbon_factor = if carbon_factor > 0.0 {
            carbon_factor
        } else {
            DEFAULT_CARBON_FACTOR
        };
        Self { carbon_factor }
    }

    pub fn carbon_factor(&self) -> f64 {
        self.carbon_factor
    }

    /// Energy consumption in kWh: per app, the app-level consumption plus
    /// each serving network element's consumption weighted by the app's
    /// traffic share on that element.
    pub fn energy_consumption(&self, results: &[JobAppResult]) -> Result<f64, CalculationError> {
        let mut total = 0.0;
        for app in results {
            let Some(mut energy) = app.app_instance_energy_consumption else {
                return Err(CalculationError::MissingAppConsumption {
                    app_id: app.app_id.clone(),
                });
            };
            if app.network_elements.len() != app.number_of_total_nes {
                return Err(CalculationError::NetworkElementCountMismatch {
                    app_id: app.app_id.clone(),
                    expected: app.number_of_total_nes,
                    actual: app.network_elements.len(),
                });
            }
            for (ne_id, ne) in &app.network_elements {
                let (Some(consumption), Some(app_traffic), Some(total_traffic)) = (
                    ne.energy_consumption,
                    ne.app_instance_traffic,
                    ne.total_traffic,
                ) else {
                    return Err(CalculationError::MissingNetworkElementField {
                        app_id: app.app_id.clone(),
                        ne_id: ne_id.clone(),
                    });
                };
                if total_traffic == 0.0 {
                    return Err(CalculationError::ZeroTotalTraffic {
                        app_id: app.app_id.clone(),
                        ne_id: ne_id.clone(),
                    });
                }
                energy += consumption * (app_traffic / total_traffic);
            }
            total += energy;
        }
        Ok(total)
    }

    /// Carbon footprint in tCO2e: energy consumption times the configured
    /// conversion factor.
    pub fn carbon_footprint(&self, results: &[JobAppResult]) -> Result<f64, CalculationError> {
        Ok(self.energy_consumption(results)? * self.carbon_factor)
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(DEFAULT_CARBON_FACTOR)
    }
}
