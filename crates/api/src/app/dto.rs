use serde::{Deserialize, Serialize};
use uuid::Uuid;

use efn_core::{SubscriptionRequest, TimePeriod};

/// Body of the two report-creation endpoints. `request_id` is
/// server-allocated and echoed back in the 201 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCreationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Application instances producing the service under analysis.
    pub service: Vec<Uuid>,
    pub subscription_request: SubscriptionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<TimePeriod>,
}
