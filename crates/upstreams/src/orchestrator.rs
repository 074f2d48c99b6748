//! Orchestrator collaborator: resolves the serving topology of an
//! application instance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::UpstreamError;

/// Application/runtime details required for the energy computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstanceInfo {
    /// Externally reachable endpoints of the application's service.
    pub ip_list: Vec<String>,
    /// Orchestrator/platform of the hosting cluster (e.g. "sylva").
    pub infra_type: String,
}

/// One network element serving the application's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeInfo {
    pub instance_id: String,
    /// Network/domain the element belongs to (site, region, segment).
    pub network_id: String,
    pub vendor_id: String,
    /// Element classification (e.g. gNB, UPF) selecting the energy model.
    pub infra_type: String,
}

/// Consolidated view for one application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheredInformation {
    pub app: ApplicationInstanceInfo,
    pub ne: Vec<NeInfo>,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Resolve the information required for the energy computation of the
    /// given application instance.
    async fn gather_information(
        &self,
        app_instance_id: &str,
    ) -> Result<GatheredInformation, UpstreamError>;
}

/// Stub orchestrator returning a fixed two-element topology.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyOrchestrator;

#[async_trait]
impl Orchestrator for DummyOrchestrator {
    async fn gather_information(
        &self,
        app_instance_id: &str,
    ) -> Result<GatheredInformation, UpstreamError> {
        Ok(GatheredInformation {
            app: ApplicationInstanceInfo {
                ip_list: vec!["84.125.93.10".into(), "84.125.93.11".into()],
                infra_type: "sylva".into(),
            },
            ne: vec![
                NeInfo {
                    instance_id: "ne-instance-1".into(),
                    network_id: format!("{app_instance_id}-ne-1"),
                    vendor_id: "vendor-1".into(),
                    infra_type: "UPF-1".into(),
                },
                NeInfo {
                    instance_id: "ne-instance-2".into(),
                    network_id: format!("{app_instance_id}-ne-2"),
                    vendor_id: "vendor-2".into(),
                    infra_type: "UPF-2".into(),
                },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_returns_two_network_elements() {
        let info = DummyOrchestrator.gather_information("app-1").await.unwrap();
        assert_eq!(info.ne.len(), 2);
        assert_eq!(info.app.ip_list.len(), 2);
        assert_eq!(info.ne[0].instance_id, "ne-instance-1");
        assert_eq!(info.ne[1].network_id, "app-1-ne-2");
    }
}
