//! Worker event handlers.
//!
//! All handlers share one rule: transient failures return an error so the
//! broker redelivers; permanent failures emit an error-notification event
//! and return success so the broker stops.
//!
//! Every partial-result handler ends with the completeness check. Whoever
//! writes the last missing field finds the job complete, and only the caller
//! that wins the `calculation_triggered` compare-and-set emits the
//! calculation event, regardless of how many replicas saw completeness at
//! the same time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use efn_core::{Calculator, JobAppResultMetadata, JobStatus, RequestKind};
use efn_events::{
    event_id_for_app, event_id_for_ne, event_id_for_traffic, AppConsumptionData,
    CalculationRequestedData, CloudEvent, EventHandler, EventSender, EventType, GatherInfoData,
    HandlerError, NetworkElementEnergyData, NetworkElementInfo, NetworkElementTrafficData,
    NotificationErrorRequestedData, NotificationRequestedData, Source,
};
use efn_events::payload::{EventPayload, RequestScoped};
use efn_store::Store;
use efn_upstreams::{
    CloudObservability, Orchestrator, TrafficNetworkElement, TrafficVolume, UpstreamError,
};

pub struct WorkerHandler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSender>,
    orchestrator: Arc<dyn Orchestrator>,
    observability: Arc<dyn CloudObservability>,
    traffic_volume: Arc<dyn TrafficVolume>,
    calculator: Calculator,
}

impl WorkerHandler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSender>,
        orchestrator: Arc<dyn Orchestrator>,
        observability: Arc<dyn CloudObservability>,
        traffic_volume: Arc<dyn TrafficVolume>,
        calculator: Calculator,
    ) -> Self {
        Self {
            store,
            events,
            orchestrator,
            observability,
            traffic_volume,
            calculator,
        }
    }

    /// Emit a `NotificationErrorRequested` for the job. Used whenever a
    /// handler resolves a permanent failure.
    async fn emit_error_notification(
        &self,
        request_id: &str,
        message: &str,
    ) -> Result<(), HandlerError> {
        let data = NotificationErrorRequestedData::new(request_id, 500, message);
        let event = CloudEvent::new(
            request_id,
            EventType::NotificationErrorRequested,
            Source::Worker,
            &data,
        )
        .map_err(HandlerError::transient)?;
        self.events.send(event).await.map_err(HandlerError::transient)?;

        // Advisory only; a failing status write must not fail the handler.
        if let Err(err) = self.store.set_job_status(request_id, JobStatus::Failed).await {
            tracing::debug!(request_id, error = %err, "could not update job status");
        }
        tracing::info!(request_id, "sent error notification");
        Ok(())
    }

    async fn handle_gather_info(&self, data: GatherInfoData) -> Result<(), HandlerError> {
        let request_id = &data.request_id;
        let app_instance_id = &data.application_instance_id;

        let job = match self.store.get_job(request_id).await {
            Ok(job) => job,
            Err(err) if err.is_not_found() => {
                tracing::error!(request_id, "job not found for gather-info");
                return self
                    .emit_error_notification(request_id, "Failed to read job for gather-info")
                    .await;
            }
            Err(err) => return Err(HandlerError::transient(err)),
        };

        if let Err(err) = self.store.set_job_status(request_id, JobStatus::Processing).await {
            tracing::debug!(request_id, error = %err, "could not update job status");
        }

        let info = match self.orchestrator.gather_information(app_instance_id).await {
            Ok(info) => info,
            Err(err) if err.is_throttling() => {
                tracing::warn!(request_id, app_instance_id, error = %err, "orchestrator throttled gather-info");
                return Err(HandlerError::transient(err));
            }
            Err(err) => {
                tracing::error!(request_id, app_instance_id, error = %err, "orchestrator failed permanently");
                return self
                    .emit_error_notification(
                        request_id,
                        "Failed to gather application instance information",
                    )
                    .await;
            }
        };
        let number_of_total_nes = info.ne.len();
        tracing::debug!(
            request_id,
            app_instance_id,
            network_elements = number_of_total_nes,
            "gathered topology from orchestrator"
        );

        // App-level consumption task. Shares its deterministic id with the
        // gather-info event that produced it.
        let app_event_id = event_id_for_app(request_id, app_instance_id);
        let app_data = AppConsumptionData {
            request_id: request_id.clone(),
            application_instance_id: app_instance_id.clone(),
            time_period: job.spec.time_period,
            app_infra_type: info.app.infra_type.clone(),
            number_of_total_nes,
        };
        let event = CloudEvent::new(
            app_event_id.to_string(),
            EventType::AppConsumptionRequested,
            Source::Worker,
            &app_data,
        )
        .map_err(HandlerError::transient)?;
        self.events.send(event).await.map_err(HandlerError::transient)?;

        // One energy task per network element.
        for ne in &info.ne {
            let ne_event_id = event_id_for_ne(request_id, app_instance_id, &ne.instance_id);
            let ne_data = NetworkElementEnergyData {
                request_id: request_id.clone(),
                application_instance_id: app_instance_id.clone(),
                ne_instance_id: ne.instance_id.clone(),
                ne_infra_type: ne.infra_type.clone(),
                time_period: job.spec.time_period,
                number_of_total_nes,
            };
            let event = CloudEvent::new(
                ne_event_id.to_string(),
                EventType::NetworkElementEnergyRequested,
                Source::Worker,
                &ne_data,
            )
            .map_err(HandlerError::transient)?;
            self.events.send(event).await.map_err(HandlerError::transient)?;
        }

        // One batch traffic task covering every network element.
        let traffic_event_id = event_id_for_traffic(request_id, app_instance_id);
        let traffic_data = NetworkElementTrafficData {
            request_id: request_id.clone(),
            application_instance_id: app_instance_id.clone(),
            app_instance_ip_list: info.app.ip_list.clone(),
            time_period: job.spec.time_period,
            network_elements: info
                .ne
                .iter()
                .map(|ne| NetworkElementInfo {
                    ne_instance_id: ne.instance_id.clone(),
                    vendor_id: ne.vendor_id.clone(),
                    network_id: ne.network_id.clone(),
                    ne_infra_type: ne.infra_type.clone(),
                })
                .collect(),
        };
        let event = CloudEvent::new(
            traffic_event_id.to_string(),
            EventType::NetworkElementTrafficRequested,
            Source::Worker,
            &traffic_data,
        )
        .map_err(HandlerError::transient)?;
        self.events.send(event).await.map_err(HandlerError::transient)?;

        Ok(())
    }

    async fn handle_app_consumption(&self, data: AppConsumptionData) -> Result<(), HandlerError> {
        let request_id = &data.request_id;
        let app_instance_id = &data.application_instance_id;

        let consumption = match self
            .observability
            .app_energy_consumption(
                app_instance_id,
                data.time_period.as_ref(),
                &data.app_infra_type,
            )
            .await
        {
            Ok(value) => value,
            Err(err) if err.is_throttling() => {
                tracing::warn!(request_id, app_instance_id, error = %err, "throttled retrieving app energy consumption");
                return Err(HandlerError::transient(err));
            }
            Err(err) => {
                tracing::error!(request_id, app_instance_id, error = %err, "permanent error retrieving app energy consumption");
                return self
                    .emit_error_notification(request_id, "Failed to retrieve app energy consumption")
                    .await;
            }
        };
        tracing::debug!(request_id, app_instance_id, consumption, "retrieved app energy consumption");

        let meta = JobAppResultMetadata {
            job_id: request_id.clone(),
            app_id: app_instance_id.clone(),
            number_of_total_nes: data.number_of_total_nes,
        };
        self.store
            .create_or_update_application_result(&meta, consumption)
            .await
            .map_err(HandlerError::transient)?;

        self.maybe_trigger_calculation(request_id).await
    }

    async fn handle_ne_energy(&self, data: NetworkElementEnergyData) -> Result<(), HandlerError> {
        let request_id = &data.request_id;
        let app_instance_id = &data.application_instance_id;
        let ne_instance_id = &data.ne_instance_id;

        let consumption = match self
            .observability
            .network_element_energy_consumption(
                app_instance_id,
                data.time_period.as_ref(),
                &data.ne_infra_type,
            )
            .await
        {
            Ok(value) => value,
            Err(err) if err.is_throttling() => {
                tracing::warn!(request_id, ne_instance_id, error = %err, "throttled retrieving network element energy consumption");
                return Err(HandlerError::transient(err));
            }
            Err(err) => {
                tracing::error!(request_id, ne_instance_id, error = %err, "permanent error retrieving network element energy consumption");
                return self
                    .emit_error_notification(
                        request_id,
                        "Failed to retrieve network element energy consumption",
                    )
                    .await;
            }
        };
        tracing::debug!(request_id, ne_instance_id, consumption, "retrieved network element energy consumption");

        let meta = JobAppResultMetadata {
            job_id: request_id.clone(),
            app_id: app_instance_id.clone(),
            number_of_total_nes: data.number_of_total_nes,
        };
        self.store
            .set_network_element_energy(&meta, ne_instance_id, consumption)
            .await
            .map_err(HandlerError::transient)?;

        self.maybe_trigger_calculation(request_id).await
    }

    async fn handle_ne_traffic(&self, data: NetworkElementTrafficData) -> Result<(), HandlerError> {
        let request_id = &data.request_id;
        let app_instance_id = &data.application_instance_id;

        let elements: Vec<TrafficNetworkElement> = data
            .network_elements
            .iter()
            .map(|ne| TrafficNetworkElement {
                vendor_identifier: ne.vendor_id.clone(),
                ne_identifier: ne.ne_instance_id.clone(),
            })
            .collect();

        let measures = match self
            .traffic_volume
            .retrieve_traffic_volumes(&data.app_instance_ip_list, &elements, data.time_period.as_ref())
            .await
        {
            Ok(measures) => measures,
            Err(err) if err.is_throttling() => {
                tracing::warn!(request_id, app_instance_id, error = %err, "throttled retrieving traffic volumes");
                return Err(HandlerError::transient(err));
            }
            Err(err) => {
                tracing::error!(request_id, app_instance_id, error = %err, "permanent error retrieving traffic volumes");
                return self
                    .emit_error_notification(request_id, "Failed to retrieve traffic volumes")
                    .await;
            }
        };

        let by_ne: HashMap<&str, _> = measures
            .iter()
            .map(|m| (m.network_element.ne_identifier.as_str(), m))
            .collect();

        for ne in &data.network_elements {
            // A requested element missing from the batch response is a
            // transient inconsistency; redelivery re-queries the batch.
            let Some(measure) = by_ne.get(ne.ne_instance_id.as_str()) else {
                tracing::error!(request_id, ne_instance_id = %ne.ne_instance_id, "traffic volume missing from batch response");
                return Err(HandlerError::Transient(format!(
                    "traffic volume not found for network element {}",
                    ne.ne_instance_id
                )));
            };

            let meta = JobAppResultMetadata {
                job_id: request_id.clone(),
                app_id: app_instance_id.clone(),
                number_of_total_nes: data.network_elements.len(),
            };
            self.store
                .set_network_element_traffic(
                    &meta,
                    &ne.ne_instance_id,
                    measure.traffic_volume_ip,
                    measure.traffic_volume_all,
                )
                .await
                .map_err(HandlerError::transient)?;
        }

        self.maybe_trigger_calculation(request_id).await
    }

    /// The completeness check run after every partial write. Reads the job
    /// and all partial rows, tests completeness, and races for the
    /// `calculation_triggered` flag. Only the CAS winner emits the
    /// calculation event.
    async fn maybe_trigger_calculation(&self, request_id: &str) -> Result<(), HandlerError> {
        let job = self
            .store
            .get_job(request_id)
            .await
            .map_err(HandlerError::transient)?;
        let results = self
            .store
            .get_all_job_app_results(request_id)
            .await
            .map_err(HandlerError::transient)?;

        let expected_apps = job.spec.service.len();
        if results.len() != expected_apps {
            tracing::debug!(request_id, expected = expected_apps, actual = results.len(), "not all app results present yet");
            return Ok(());
        }
        if let Some(incomplete) = results.iter().find(|r| !r.is_complete()) {
            tracing::debug!(request_id, app_id = %incomplete.app_id, "app result incomplete");
            return Ok(());
        }

        // All data gathered; race for the cross-replica flag.
        if !self
            .store
            .try_set_calculation_triggered(request_id)
            .await
            .map_err(HandlerError::transient)?
        {
            tracing::debug!(request_id, "calculation already triggered elsewhere");
            return Ok(());
        }

        tracing::info!(request_id, "all data gathered; requesting calculation");
        let event = CloudEvent::new(
            request_id,
            EventType::CalculationRequested,
            Source::Worker,
            &CalculationRequestedData {},
        )
        .map_err(HandlerError::transient)?;
        self.events.send(event).await.map_err(HandlerError::transient)?;
        Ok(())
    }

    async fn handle_calculation(&self, event: &CloudEvent) -> Result<(), HandlerError> {
        // The calculation event carries no data; its id is the request id.
        let request_id = event.id.as_str();

        let job = match self.store.get_job(request_id).await {
            Ok(job) => job,
            Err(err) if err.is_not_found() => {
                return Err(HandlerError::malformed(format!(
                    "unknown job '{request_id}' at calculation time"
                )));
            }
            Err(err) => return Err(HandlerError::transient(err)),
        };
        let results = self
            .store
            .get_all_job_app_results(request_id)
            .await
            .map_err(HandlerError::transient)?;

        let computed = match job.spec.request_kind {
            RequestKind::EnergyConsumption => self.calculator.energy_consumption(&results),
            RequestKind::CarbonFootprint => self.calculator.carbon_footprint(&results),
        };
        let result = match computed {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(request_id, error = %err, "calculation failed on gathered data");
                return self.emit_error_notification(request_id, &err.to_string()).await;
            }
        };
        tracing::info!(request_id, result, "calculation completed; requesting notification");

        let data = NotificationRequestedData {
            request_id: request_id.to_string(),
            result,
        };
        let event = CloudEvent::new(
            request_id,
            EventType::NotificationRequested,
            Source::Worker,
            &data,
        )
        .map_err(HandlerError::transient)?;
        self.events.send(event).await.map_err(HandlerError::transient)?;

        if let Err(err) = self.store.set_job_status(request_id, JobStatus::Completed).await {
            tracing::debug!(request_id, error = %err, "could not update job status");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for WorkerHandler {
    async fn handle(&self, event: CloudEvent) -> Result<(), HandlerError> {
        tracing::debug!(event_type = %event.ty, event_id = %event.id, source = %event.source, "received event");

        let payload = EventPayload::decode(&event).map_err(HandlerError::malformed)?;
        match payload {
            Some(EventPayload::GatherInfo(data)) => self.handle_gather_info(data).await,
            Some(EventPayload::AppConsumption(data)) => self.handle_app_consumption(data).await,
            Some(EventPayload::NetworkElementEnergy(data)) => self.handle_ne_energy(data).await,
            Some(EventPayload::NetworkElementTraffic(data)) => self.handle_ne_traffic(data).await,
            Some(EventPayload::Calculation(_)) => self.handle_calculation(&event).await,
            Some(_) => {
                // Notification events belong to the notify service; seeing
                // one here is a routing misconfiguration, not a failure.
                tracing::warn!(event_type = %event.ty, "ignoring event not meant for the worker");
                Ok(())
            }
            None => {
                tracing::warn!(event_type = %event.ty, "ignoring unknown event type");
                Ok(())
            }
        }
    }

    /// Broker retries exhausted: surface the failure to the subscriber as an
    /// error notification. Every internal payload carries the request id.
    async fn handle_dead_letter(&self, event: CloudEvent) -> Result<(), HandlerError> {
        tracing::info!(event_type = %event.ty, event_id = %event.id, "dead-letter event received after broker retries exhausted");

        let scoped: RequestScoped = event.data_as().map_err(HandlerError::malformed)?;
        self.emit_error_notification(
            &scoped.request_id,
            "Event processing failed after multiple retries",
        )
        .await
    }
}
