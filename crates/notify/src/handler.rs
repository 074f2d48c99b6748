//! Notification delivery.
//!
//! The `notification_sent` compare-and-set is won BEFORE the sink POST.
//! Duplicate broker deliveries are therefore absorbed unconditionally, at
//! the cost of at-most-once delivery: a transport failure after the CAS is
//! retried only by this replica's redelivery stream, never by another
//! winner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use efn_core::{ErrorInfo, HttpConfig, Job};
use efn_events::{
    CloudEvent, EventHandler, EventSender, EventType, HandlerError, NotificationErrorRequestedData,
    NotificationRequestedData, Source, X_CORRELATOR_EXTENSION,
};
use efn_store::Store;

const SINK_TIMEOUT: Duration = Duration::from_secs(30);

/// The result value delivered for error notifications.
const ERROR_SENTINEL: f64 = -1.0;

pub struct NotifyHandler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSender>,
    /// System-trust client for external sinks.
    external_client: reqwest::Client,
    /// Client for in-cluster sinks; TLS verification may be disabled via
    /// `HTTP_INSECURE_SKIP_VERIFY`.
    internal_client: reqwest::Client,
}

impl NotifyHandler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSender>,
        http: &HttpConfig,
    ) -> Result<Self, reqwest::Error> {
        let external_client = reqwest::Client::builder().timeout(SINK_TIMEOUT).build()?;
        let internal_client = reqwest::Client::builder()
            .timeout(SINK_TIMEOUT)
            .danger_accept_invalid_certs(http.insecure_skip_verify)
            .build()?;
        Ok(Self {
            store,
            events,
            external_client,
            internal_client,
        })
    }

    /// Pick the HTTP client by trust domain of the sink.
    fn client_for(&self, sink: &str) -> &reqwest::Client {
        if is_internal_cluster_service(sink) {
            tracing::debug!(sink, "using internal-cluster http client");
            &self.internal_client
        } else {
            &self.external_client
        }
    }

    async fn deliver(&self, event: &CloudEvent) -> Result<(), HandlerError> {
        let (request_id, result_value, error_info) = parse_notification(event)?;

        // Claim the single delivery first. Exactly one caller across all
        // replicas and redeliveries observes the transition.
        let should_send = self
            .store
            .try_set_notification_sent(&request_id)
            .await
            .map_err(HandlerError::transient)?;
        if !should_send {
            tracing::info!(request_id, "notification already sent by another instance; skipping duplicate");
            return Ok(());
        }
        tracing::debug!(request_id, "acquired exclusive right to send notification");

        let job = match self.store.get_job(&request_id).await {
            Ok(job) => job,
            Err(err) if err.is_not_found() => {
                return Err(HandlerError::malformed(format!(
                    "unknown job '{request_id}' for notification"
                )));
            }
            Err(err) => return Err(HandlerError::transient(err)),
        };

        if let Some(expire_time) = job.spec.subscription_request.expire_time() {
            if Utc::now() > expire_time {
                tracing::warn!(request_id, %expire_time, "subscription has expired; notification not sent");
                return Ok(());
            }
        }

        let sink = job.spec.subscription_request.sink.clone();
        if sink.is_empty() {
            return Err(HandlerError::malformed(format!(
                "missing sink in subscription request for job '{request_id}'"
            )));
        }

        let outbound = build_sink_event(&event.id, &job, &request_id, result_value);
        let mut request = self
            .client_for(&sink)
            .post(&sink)
            .json(&outbound);

        // Correlator: the inbound event extension wins, the job's stored
        // value is the fallback.
        let correlator = event
            .extension(X_CORRELATOR_EXTENSION)
            .map(str::to_string)
            .or_else(|| job.x_correlator.clone());
        if let Some(correlator) = correlator {
            request = request.header(X_CORRELATOR_EXTENSION, correlator);
        }

        if let Some(headers) = job.spec.subscription_request.custom_headers() {
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }
        }

        if let Some(cred) = &job.spec.subscription_request.sink_credential {
            if let Some(token) = cred.bearer_token() {
                request = request.bearer_auth(token);
            }
        }

        let started = std::time::Instant::now();
        let response = request.send().await.map_err(|err| {
            tracing::error!(request_id, sink, error = %err, "failed to deliver notification to sink");
            HandlerError::transient(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(request_id, sink, status = status.as_u16(), "sink returned non-success status");
            return Err(HandlerError::Transient(format!(
                "sink {sink} returned status {status}"
            )));
        }

        tracing::info!(
            request_id,
            sink,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            is_error = error_info.is_some(),
            result = result_value,
            "notification delivered"
        );

        // Terminal breadcrumb; delivery already happened, so a failing emit
        // is logged rather than retried.
        let sent = CloudEvent::without_data(
            request_id.clone(),
            EventType::NotificationSent,
            Source::Notify,
        );
        if let Err(err) = self.events.send(sent).await {
            tracing::warn!(request_id, error = %err, "failed to emit notification-sent breadcrumb");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NotifyHandler {
    async fn handle(&self, event: CloudEvent) -> Result<(), HandlerError> {
        tracing::debug!(event_type = %event.ty, event_id = %event.id, "received event");
        self.deliver(&event).await
    }

    /// A dead-lettered notification has no further recourse; log and stop.
    async fn handle_dead_letter(&self, event: CloudEvent) -> Result<(), HandlerError> {
        tracing::error!(event_type = %event.ty, event_id = %event.id, "notification event dead-lettered; giving up");
        Ok(())
    }
}

/// Extract `(request_id, result, error_info)` from the inbound internal
/// event. The error form delivers the sentinel `-1`.
fn parse_notification(
    event: &CloudEvent,
) -> Result<(String, f64, Option<ErrorInfo>), HandlerError> {
    match event.event_type() {
        Some(EventType::NotificationRequested) => {
            let data: NotificationRequestedData =
                event.data_as().map_err(HandlerError::malformed)?;
            Ok((data.request_id, data.result, None))
        }
        Some(EventType::NotificationErrorRequested) => {
            let data: NotificationErrorRequestedData =
                event.data_as().map_err(HandlerError::malformed)?;
            tracing::error!(
                request_id = %data.request_id,
                code = %data.error.code,
                message = %data.error.message,
                "processing error notification"
            );
            Ok((data.request_id, ERROR_SENTINEL, Some(data.error)))
        }
        _ => Err(HandlerError::malformed(format!(
            "unexpected event type '{}' for the notify service",
            event.ty
        ))),
    }
}

/// The CAMARA-facing CloudEvent POSTed to the sink.
fn build_sink_event(
    internal_event_id: &str,
    job: &Job,
    request_id: &str,
    result: f64,
) -> serde_json::Value {
    let kind = job.spec.request_kind;

    let mut data = serde_json::Map::new();
    data.insert("requestId".into(), serde_json::Value::from(request_id));
    data.insert(kind.result_field().into(), serde_json::Value::from(result));

    serde_json::json!({
        "id": internal_event_id,
        "source": Source::Notify.as_str(),
        "specversion": "1.0",
        "type": kind.notification_type(),
        "time": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "datacontenttype": "application/json",
        "data": data,
    })
}

/// Whether the sink is an in-cluster service (`*.svc`, `*.svc.*`,
/// `*.svc.cluster.local`).
fn is_internal_cluster_service(sink: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(sink) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    host.ends_with(".svc.cluster.local") || host.ends_with(".svc") || host.contains(".svc.")
}
