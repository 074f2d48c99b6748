//! The two report-creation endpoints.
//!
//! Both share one pipeline: bind, validate, authorize, persist the job,
//! fan out one `GatherInfoRequested` per application instance, echo the
//! request back with the allocated id. Once the 201 is returned, all further
//! outcomes for the request travel through the notification path, never
//! through HTTP.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use uuid::Uuid;

use efn_core::{DomainError, Job, JobSpec, RequestKind, TimePeriod};
use efn_events::{event_id_for_app, CloudEvent, EventType, GatherInfoData, Source};

use crate::app::{dto, errors};
use crate::context::SubjectContext;
use crate::middleware::X_CORRELATOR_HEADER;

use super::super::services::ApiServices;

pub async fn calculate_energy_consumption(
    Extension(services): Extension<Arc<ApiServices>>,
    Extension(subject): Extension<SubjectContext>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    handle_report_calculation(services, subject, headers, body, RequestKind::EnergyConsumption)
        .await
}

pub async fn calculate_carbon_footprint(
    Extension(services): Extension<Arc<ApiServices>>,
    Extension(subject): Extension<SubjectContext>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    handle_report_calculation(services, subject, headers, body, RequestKind::CarbonFootprint)
        .await
}

async fn handle_report_calculation(
    services: Arc<ApiServices>,
    subject: SubjectContext,
    headers: HeaderMap,
    body: Bytes,
    kind: RequestKind,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req: dto::ReportCreationRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            tracing::error!(error = %err, "failed to validate request body");
            return errors::json_error(StatusCode::BAD_REQUEST, "failed to validate request body");
        }
    };

    if req.service.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "service array must contain at least one application instance",
        );
    }

    let now = Utc::now();
    let oldest_allowed = now - Duration::days(services.config.max_time_period_days);

    let time_period = req.time_period.unwrap_or(TimePeriod {
        start_date: oldest_allowed,
        end_date: Some(now),
    });
    req.time_period = Some(time_period);

    if let Some(end_date) = time_period.end_date {
        if end_date <= time_period.start_date {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "endDate must be after startDate in timePeriod",
            );
        }
    }

    if let Some(first_type) = req.subscription_request.types.first() {
        let expected = kind.notification_type();
        if first_type.as_str() != expected {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                format!(
                    "subscription event type '{first_type}' does not match endpoint (expected '{expected}')"
                ),
            );
        }
    }

    if time_period.start_date > now {
        return errors::json_error_with_code(
            StatusCode::BAD_REQUEST,
            "OUT_OF_RANGE",
            "startDate cannot be in the future",
        );
    }
    if matches!(time_period.end_date, Some(end) if end > now) {
        return errors::json_error_with_code(
            StatusCode::BAD_REQUEST,
            "OUT_OF_RANGE",
            "endDate cannot be in the future",
        );
    }
    if time_period.start_date < oldest_allowed {
        return errors::json_error_with_code(
            StatusCode::BAD_REQUEST,
            "OUT_OF_RANGE",
            format!(
                "startDate cannot be older than {} days",
                services.config.max_time_period_days
            ),
        );
    }
    if matches!(time_period.end_date, Some(end) if end < oldest_allowed) {
        return errors::json_error_with_code(
            StatusCode::BAD_REQUEST,
            "OUT_OF_RANGE",
            format!(
                "endDate cannot be older than {} days",
                services.config.max_time_period_days
            ),
        );
    }

    if let Err(err) = req.subscription_request.validate_support() {
        tracing::warn!(error = %err, "unsupported subscription request");
        let status = match err {
            DomainError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::BAD_REQUEST,
        };
        return errors::json_error(status, err.to_string());
    }

    if req.subscription_request.config.initial_event == Some(true) {
        tracing::warn!("initialEvent is set to true but has no effect for this API");
    }

    let app_ids: Vec<String> = req.service.iter().map(Uuid::to_string).collect();

    if let Err(err) = services
        .policy
        .has_access_to_application_ids(subject.subject(), &app_ids)
        .await
    {
        tracing::error!(error = %err, subject = subject.subject(), "failed to authorize application ids");
        return errors::json_error(StatusCode::UNAUTHORIZED, err.to_string());
    }

    let x_correlator = headers
        .get(X_CORRELATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    req.request_id = Some(request_id.clone());
    let job = Job::new(
        JobSpec {
            request_id: request_id.clone(),
            request_kind: kind,
            service: req.service.clone(),
            subscription_request: req.subscription_request.clone(),
            time_period: req.time_period,
        },
        x_correlator,
    );

    if let Err(err) = services.store.create_job(&job).await {
        tracing::error!(error = %err, request_id, "failed to create job");
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to create job");
    }

    for app_instance_id in &app_ids {
        let event_id = event_id_for_app(&request_id, app_instance_id);
        let data = GatherInfoData {
            request_id: request_id.clone(),
            application_instance_id: app_instance_id.clone(),
        };
        let event = match CloudEvent::new(
            event_id.to_string(),
            EventType::GatherInfoRequested,
            Source::Api,
            &data,
        ) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(error = %err, "failed to build cloud event");
                return errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to send event",
                );
            }
        };
        if let Err(err) = services.events.send(event).await {
            tracing::error!(error = %err, event_id = %event_id, "failed to send cloud event");
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to send event");
        }
    }

    tracing::info!(request_id, apps = app_ids.len(), "accepted report creation request");

    let location = format!("/reports/{request_id}");
    (
        StatusCode::CREATED,
        [(axum::http::header::LOCATION, location)],
        Json(req),
    )
        .into_response()
}
