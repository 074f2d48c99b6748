//! Event-flow tests: the worker handler driven through the in-memory bus
//! and store, with the stub upstreams standing in for the collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use efn_core::{Calculator, Job, JobSpec, RequestKind, TimePeriod};
use efn_events::{
    event_id_for_app, event_id_for_ne, CloudEvent, EventHandler, EventSender, EventType,
    GatherInfoData, HandlerError, InMemoryEventBus, NetworkElementEnergyData, Source,
};
use efn_store::{InMemoryStore, Store};
use efn_upstreams::{
    ApplicationInstanceInfo, CloudObservability, ConfigurableObservability, DummyObservability,
    DummyOrchestrator, DummyTrafficVolume, GatheredInformation, NeInfo, Orchestrator,
};
use efn_worker::WorkerHandler;

const APP_1: &str = "11111111-1111-1111-1111-111111111111";
const APP_2: &str = "22222222-2222-2222-2222-222222222222";

struct Harness {
    store: Arc<InMemoryStore>,
    bus: Arc<InMemoryEventBus>,
    worker: Arc<WorkerHandler>,
}

/// Orchestrator stub serving exactly one network element per app.
struct SingleNeOrchestrator;

#[async_trait::async_trait]
impl Orchestrator for SingleNeOrchestrator {
    async fn gather_information(
        &self,
        app_instance_id: &str,
    ) -> Result<GatheredInformation, efn_upstreams::UpstreamError> {
        Ok(GatheredInformation {
            app: ApplicationInstanceInfo {
                ip_list: vec!["84.125.93.10".into()],
                infra_type: "sylva".into(),
            },
            ne: vec![NeInfo {
                instance_id: format!("{app_instance_id}-ne"),
                network_id: format!("{app_instance_id}-net"),
                vendor_id: "vendor-1".into(),
                infra_type: "UPF-1".into(),
            }],
        })
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_parts(Arc::new(DummyOrchestrator), Arc::new(DummyObservability))
    }

    fn with_observability(observability: Arc<dyn CloudObservability>) -> Self {
        Self::with_parts(Arc::new(DummyOrchestrator), observability)
    }

    fn with_parts(
        orchestrator: Arc<dyn Orchestrator>,
        observability: Arc<dyn CloudObservability>,
    ) -> Self {
        let store = InMemoryStore::arc();
        let bus = InMemoryEventBus::arc();
        let worker = Arc::new(WorkerHandler::new(
            store.clone(),
            bus.clone(),
            orchestrator,
            observability,
            Arc::new(DummyTrafficVolume),
            Calculator::default(),
        ));
        Self { store, bus, worker }
    }

    async fn seed_job(&self, request_id: &str, kind: RequestKind, apps: &[&str]) {
        let subscription = serde_json::from_value(serde_json::json!({
            "protocol": "HTTP",
            "sink": "http://sink.example/",
            "types": [match kind {
                RequestKind::EnergyConsumption =>
                    "org.camaraproject.energy-footprint-notification.v1.energy",
                RequestKind::CarbonFootprint =>
                    "org.camaraproject.energy-footprint-notification.v1.carbon-footprint",
            }]
        }))
        .unwrap();

        let job = Job::new(
            JobSpec {
                request_id: request_id.into(),
                request_kind: kind,
                service: apps.iter().map(|a| Uuid::parse_str(a).unwrap()).collect(),
                subscription_request: subscription,
                time_period: Some(TimePeriod {
                    start_date: date("2025-01-01T00:00:00Z"),
                    end_date: Some(date("2025-01-02T00:00:00Z")),
                }),
            },
            None,
        );
        self.store.create_job(&job).await.unwrap();

        for app in apps {
            let data = GatherInfoData {
                request_id: request_id.into(),
                application_instance_id: (*app).into(),
            };
            let event = CloudEvent::new(
                event_id_for_app(request_id, app).to_string(),
                EventType::GatherInfoRequested,
                Source::Api,
                &data,
            )
            .unwrap();
            self.bus.send(event).await.unwrap();
        }
    }

    /// Pump the in-memory bus until quiescent, delivering every
    /// worker-consumed event `copies` times concurrently (the broker is
    /// at-least-once). Returns all notification-bound events, in order,
    /// plus the number of calculation events that crossed the bus.
    async fn run_to_quiescence(&self, copies: usize) -> (Vec<CloudEvent>, usize) {
        let mut notifications = Vec::new();
        let mut calculation_events = 0;
        loop {
            let batch = self.bus.take_sent();
            if batch.is_empty() {
                break;
            }
            for event in batch {
                match event.event_type() {
                    Some(
                        EventType::GatherInfoRequested
                        | EventType::AppConsumptionRequested
                        | EventType::NetworkElementEnergyRequested
                        | EventType::NetworkElementTrafficRequested
                        | EventType::CalculationRequested,
                    ) => {
                        if event.event_type() == Some(EventType::CalculationRequested) {
                            calculation_events += 1;
                        }
                        let mut handles = Vec::new();
                        for _ in 0..copies {
                            let worker = self.worker.clone();
                            let event = event.clone();
                            handles.push(tokio::spawn(async move { worker.handle(event).await }));
                        }
                        for handle in handles {
                            handle.await.unwrap().unwrap();
                        }
                    }
                    Some(
                        EventType::NotificationRequested
                        | EventType::NotificationErrorRequested
                        | EventType::NotificationSent,
                    ) => notifications.push(event),
                    None => panic!("unexpected event on the bus: {}", event.ty),
                }
            }
        }
        (notifications, calculation_events)
    }
}

fn date(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn happy_energy_single_app_two_network_elements() {
    let h = Harness::new();
    h.seed_job("req-s1", RequestKind::EnergyConsumption, &[APP_1]).await;

    let (notifications, calculations) = h.run_to_quiescence(1).await;

    assert_eq!(calculations, 1);
    assert_eq!(notifications.len(), 1);
    let event = &notifications[0];
    assert_eq!(event.event_type(), Some(EventType::NotificationRequested));
    assert_eq!(event.source, "urn:tim:efn-worker");
    assert_eq!(event.id, "req-s1");

    let data = event.data.as_ref().unwrap();
    assert_eq!(data["requestId"], "req-s1");
    // 0.0020 + 0.0010 * 0.1 + 0.0010 * 0.1
    let result = data["result"].as_f64().unwrap();
    assert!((result - 0.0022).abs() < 1e-12, "got {result}");

    let job = h.store.get_job("req-s1").await.unwrap();
    assert!(job.calculation_triggered);
}

#[tokio::test]
async fn happy_carbon_two_apps_one_ne_each() {
    let h = Harness::with_parts(Arc::new(SingleNeOrchestrator), Arc::new(DummyObservability));
    h.seed_job("req-s2", RequestKind::CarbonFootprint, &[APP_1, APP_2]).await;

    let (notifications, calculations) = h.run_to_quiescence(1).await;

    assert_eq!(calculations, 1);
    assert_eq!(notifications.len(), 1);
    let data = notifications[0].data.as_ref().unwrap();
    // Energy 2 * (0.0020 + 0.0010 * 0.1) = 0.0042 kWh, times the default
    // carbon factor 0.00035.
    let result = data["result"].as_f64().unwrap();
    assert!((result - 1.47e-6).abs() < 1e-15, "got {result}");

    // Two JobAppResult rows, one per app; never more than the service list.
    let results = h.store.get_all_job_app_results("req-s2").await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn happy_carbon_with_dummy_topology() {
    let h = Harness::new();
    h.seed_job("req-carbon", RequestKind::CarbonFootprint, &[APP_1, APP_2]).await;

    let (notifications, _) = h.run_to_quiescence(1).await;

    // Two apps, two NEs each: 2 * (0.0020 + 2 * 0.0010 * 0.1) = 0.0044 kWh.
    let result = notifications[0].data.as_ref().unwrap()["result"]
        .as_f64()
        .unwrap();
    assert!((result - 0.0044 * 0.00035).abs() < 1e-15, "got {result}");
}

#[tokio::test]
async fn duplicated_deliveries_trigger_calculation_exactly_once() {
    let h = Harness::new();
    h.seed_job("req-s3", RequestKind::EnergyConsumption, &[APP_1]).await;

    // Every event delivered five times, concurrently.
    let (notifications, calculations) = h.run_to_quiescence(5).await;

    // Exactly one calculation request crossed the bus regardless of the
    // duplicated completeness checks.
    assert_eq!(calculations, 1);

    // The duplicated calculation deliveries may each re-emit the (identical)
    // notification; the notify CAS absorbs those. The value is unique.
    assert!(!notifications.is_empty());
    for event in &notifications {
        assert_eq!(event.event_type(), Some(EventType::NotificationRequested));
        let result = event.data.as_ref().unwrap()["result"].as_f64().unwrap();
        assert!((result - 0.0022).abs() < 1e-12);
    }

    // One row, one value, despite the duplicate partial writes.
    let results = h.store.get_all_job_app_results("req-s3").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].network_elements.len(), 2);
    assert_eq!(
        results[0].network_elements["ne-instance-1"].energy_consumption,
        Some(0.0010)
    );
}

#[tokio::test]
async fn duplicate_ne_energy_after_completion_changes_nothing() {
    let h = Harness::new();
    h.seed_job("req-dup", RequestKind::EnergyConsumption, &[APP_1]).await;
    let _ = h.run_to_quiescence(1).await;

    let before = h.store.get_all_job_app_results("req-dup").await.unwrap();

    // Replay one NE energy event 5x concurrently, long after completion.
    let data = NetworkElementEnergyData {
        request_id: "req-dup".into(),
        application_instance_id: APP_1.into(),
        ne_instance_id: "ne-instance-1".into(),
        ne_infra_type: "UPF-1".into(),
        time_period: None,
        number_of_total_nes: 2,
    };
    let event = CloudEvent::new(
        event_id_for_ne("req-dup", APP_1, "ne-instance-1").to_string(),
        EventType::NetworkElementEnergyRequested,
        Source::Worker,
        &data,
    )
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let worker = h.worker.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move { worker.handle(event).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Stored values unchanged, traffic fields not reset.
    let after = h.store.get_all_job_app_results("req-dup").await.unwrap();
    assert_eq!(before, after);

    // The calculation flag was already won; no new calculation request.
    let leftover = h.bus.take_sent();
    assert!(
        leftover
            .iter()
            .all(|e| e.event_type() != Some(EventType::CalculationRequested)),
        "duplicate partial must not re-trigger calculation"
    );
}

#[tokio::test]
async fn gather_info_emits_the_same_child_ids_on_redelivery() {
    let h = Harness::new();
    h.seed_job("req-idem", RequestKind::EnergyConsumption, &[APP_1]).await;

    let gather = h.bus.take_sent().remove(0);

    h.worker.handle(gather.clone()).await.unwrap();
    let first: Vec<String> = h.bus.take_sent().into_iter().map(|e| e.id).collect();

    h.worker.handle(gather).await.unwrap();
    let second: Vec<String> = h.bus.take_sent().into_iter().map(|e| e.id).collect();

    assert_eq!(first, second);
    // 1 app consumption + 2 NE energy + 1 traffic batch.
    assert_eq!(first.len(), 4);
}

#[tokio::test]
async fn permanent_upstream_failure_becomes_an_error_notification() {
    let h = Harness::with_observability(Arc::new(ConfigurableObservability::new(
        0.0020,
        0.0010,
        true,
        true,
        Duration::ZERO,
    )));
    h.seed_job("req-s4", RequestKind::EnergyConsumption, &[APP_1]).await;
    let _ = h.bus.take_sent();

    let data = NetworkElementEnergyData {
        request_id: "req-s4".into(),
        application_instance_id: APP_1.into(),
        ne_instance_id: "ne-instance-1".into(),
        ne_infra_type: "UPF-1".into(),
        time_period: None,
        number_of_total_nes: 2,
    };
    let event = CloudEvent::new(
        event_id_for_ne("req-s4", APP_1, "ne-instance-1").to_string(),
        EventType::NetworkElementEnergyRequested,
        Source::Worker,
        &data,
    )
    .unwrap();

    // Permanent failure resolves to success so the broker stops.
    h.worker.handle(event).await.unwrap();

    let sent = h.bus.take_sent();
    assert_eq!(sent.len(), 1);
    let error_event = &sent[0];
    assert_eq!(
        error_event.event_type(),
        Some(EventType::NotificationErrorRequested)
    );
    let data = error_event.data.as_ref().unwrap();
    assert_eq!(data["requestId"], "req-s4");
    assert_eq!(data["status"], 500);
    assert_eq!(data["code"], "Internal Server Error");
    assert_eq!(
        data["message"],
        "Failed to retrieve network element energy consumption"
    );
}

#[tokio::test]
async fn throttling_is_returned_as_transient() {
    let h = Harness::with_observability(Arc::new(ConfigurableObservability::new(
        0.0020,
        0.0010,
        true,
        false,
        Duration::ZERO,
    )));
    h.seed_job("req-throttle", RequestKind::EnergyConsumption, &[APP_1]).await;
    let _ = h.bus.take_sent();

    let data = NetworkElementEnergyData {
        request_id: "req-throttle".into(),
        application_instance_id: APP_1.into(),
        ne_instance_id: "ne-instance-1".into(),
        ne_infra_type: "UPF-1".into(),
        time_period: None,
        number_of_total_nes: 2,
    };
    let event = CloudEvent::new(
        event_id_for_ne("req-throttle", APP_1, "ne-instance-1").to_string(),
        EventType::NetworkElementEnergyRequested,
        Source::Worker,
        &data,
    )
    .unwrap();

    let err = h.worker.handle(event).await.unwrap_err();
    assert!(matches!(err, HandlerError::Transient(_)));
    // Nothing stored, nothing emitted.
    assert!(h.bus.take_sent().is_empty());
    assert!(h
        .store
        .get_job_app_result("req-throttle", APP_1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dead_letter_emits_the_retries_exhausted_notification() {
    let h = Harness::new();
    h.seed_job("req-s6", RequestKind::EnergyConsumption, &[APP_1]).await;
    let _ = h.bus.take_sent();

    let event = CloudEvent::new(
        "some-dead-event",
        EventType::AppConsumptionRequested,
        Source::Worker,
        &serde_json::json!({
            "requestId": "req-s6",
            "applicationInstanceId": APP_1,
            "appInfraType": "sylva",
            "numberOfTotalNEs": 2
        }),
    )
    .unwrap();

    h.worker.handle_dead_letter(event).await.unwrap();

    let sent = h.bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].event_type(),
        Some(EventType::NotificationErrorRequested)
    );
    let data = sent[0].data.as_ref().unwrap();
    assert_eq!(data["requestId"], "req-s6");
    assert_eq!(data["message"], "Event processing failed after multiple retries");
}

#[tokio::test]
async fn gather_info_for_unknown_job_stops_with_an_error_notification() {
    let h = Harness::new();

    let data = GatherInfoData {
        request_id: "ghost".into(),
        application_instance_id: APP_1.into(),
    };
    let event = CloudEvent::new(
        event_id_for_app("ghost", APP_1).to_string(),
        EventType::GatherInfoRequested,
        Source::Api,
        &data,
    )
    .unwrap();

    h.worker.handle(event).await.unwrap();

    let sent = h.bus.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].event_type(),
        Some(EventType::NotificationErrorRequested)
    );
}

#[tokio::test]
async fn calculation_for_unknown_job_is_unrecoverable() {
    let h = Harness::new();
    let event = CloudEvent::new(
        "ghost",
        EventType::CalculationRequested,
        Source::Worker,
        &serde_json::json!({}),
    )
    .unwrap();

    let err = h.worker.handle(event).await.unwrap_err();
    assert!(matches!(err, HandlerError::Malformed(_)));
}

#[tokio::test]
async fn unknown_event_types_are_ignored() {
    let h = Harness::new();
    let mut event =
        CloudEvent::without_data("evt-x", EventType::NotificationSent, Source::Notify);
    event.ty = "it.tim.efn.something.else".into();

    h.worker.handle(event).await.unwrap();
    assert!(h.bus.take_sent().is_empty());
}

#[tokio::test]
async fn rerunning_calculation_yields_the_same_value() {
    let h = Harness::new();
    h.seed_job("req-pure", RequestKind::EnergyConsumption, &[APP_1]).await;
    let _ = h.run_to_quiescence(1).await;

    let calc = CloudEvent::new(
        "req-pure",
        EventType::CalculationRequested,
        Source::Worker,
        &serde_json::json!({}),
    )
    .unwrap();

    h.worker.handle(calc.clone()).await.unwrap();
    let first = h.bus.take_sent()[0].data.as_ref().unwrap()["result"]
        .as_f64()
        .unwrap();

    h.worker.handle(calc).await.unwrap();
    let second = h.bus.take_sent()[0].data.as_ref().unwrap()["result"]
        .as_f64()
        .unwrap();

    assert_eq!(first, second);
}
