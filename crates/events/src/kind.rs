//! Internal event-type and source registry.

use std::fmt;

/// Internal bus event types. The strings are the wire contract; they appear
/// verbatim in the CloudEvent `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Sent by the API to the worker to gather info for a request and
    /// application instance.
    GatherInfoRequested,
    /// Sent by the worker to get energy consumption for an application
    /// instance.
    AppConsumptionRequested,
    /// Sent by the worker to get energy consumption for a single network
    /// element.
    NetworkElementEnergyRequested,
    /// Sent by the worker to get traffic volumes for all network elements of
    /// an application instance (batch).
    NetworkElementTrafficRequested,
    /// Sent by the worker to itself once all values are gathered.
    CalculationRequested,
    /// Sent by the worker when the calculation completed successfully.
    NotificationRequested,
    /// Sent by the worker when processing failed permanently.
    NotificationErrorRequested,
    /// Sent by the notify service after a notification was delivered.
    /// Terminal breadcrumb; no consumer in the core.
    NotificationSent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::GatherInfoRequested => "it.tim.efn.gatherinfo.requested",
            EventType::AppConsumptionRequested => "it.tim.efn.app.consumption.requested",
            EventType::NetworkElementEnergyRequested => {
                "it.tim.efn.networkelement.energy.requested"
            }
            EventType::NetworkElementTrafficRequested => {
                "it.tim.efn.networkelement.traffic.requested"
            }
            EventType::CalculationRequested => "it.tim.efn.calculation.requested",
            EventType::NotificationRequested => "it.tim.efn.notification.requested",
            EventType::NotificationErrorRequested => "it.tim.efn.notification.error.requested",
            EventType::NotificationSent => "it.tim.efn.notification.sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "it.tim.efn.gatherinfo.requested" => Some(EventType::GatherInfoRequested),
            "it.tim.efn.app.consumption.requested" => Some(EventType::AppConsumptionRequested),
            "it.tim.efn.networkelement.energy.requested" => {
                Some(EventType::NetworkElementEnergyRequested)
            }
            "it.tim.efn.networkelement.traffic.requested" => {
                Some(EventType::NetworkElementTrafficRequested)
            }
            "it.tim.efn.calculation.requested" => Some(EventType::CalculationRequested),
            "it.tim.efn.notification.requested" => Some(EventType::NotificationRequested),
            "it.tim.efn.notification.error.requested" => {
                Some(EventType::NotificationErrorRequested)
            }
            "it.tim.efn.notification.sent" => Some(EventType::NotificationSent),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CloudEvents source URN of the emitting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Api,
    Worker,
    Notify,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Api => "urn:tim:efn-api",
            Source::Worker => "urn:tim:efn-worker",
            Source::Notify => "urn:tim:efn-notify",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_round_trip() {
        let all = [
            EventType::GatherInfoRequested,
            EventType::AppConsumptionRequested,
            EventType::NetworkElementEnergyRequested,
            EventType::NetworkElementTrafficRequested,
            EventType::CalculationRequested,
            EventType::NotificationRequested,
            EventType::NotificationErrorRequested,
            EventType::NotificationSent,
        ];
        for ty in all {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("it.tim.efn.unknown"), None);
    }
}
