use std::sync::Arc;

use efn_core::Calculator;
use efn_events::{receiver_router, EventSender, HttpEventSender};
use efn_store::{InMemoryStore, PgStore, Store};
use efn_upstreams::{
    CloudObservability, ConfigurableObservability, ConfigurableTrafficVolume, DummyObservability,
    DummyOrchestrator, DummyTrafficVolume, TrafficVolume,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = efn_core::Config::from_env();
    efn_observability::init(&config.log);

    let store: Arc<dyn Store> = if config.database.in_memory {
        tracing::warn!("DB_IN_MEMORY=true; using the in-memory store (dev only)");
        InMemoryStore::arc()
    } else {
        Arc::new(PgStore::connect(&config.database).await?)
    };

    let observability: Arc<dyn CloudObservability> =
        if std::env::var("CLIENT_TYPE").as_deref() == Ok("configurable") {
            Arc::new(ConfigurableObservability::from_env())
        } else {
            Arc::new(DummyObservability)
        };

    let traffic_volume: Arc<dyn TrafficVolume> =
        if std::env::var("TRAFFIC_CLIENT_TYPE").as_deref() == Ok("configurable") {
            Arc::new(ConfigurableTrafficVolume::from_env())
        } else {
            Arc::new(DummyTrafficVolume)
        };

    let events: Arc<dyn EventSender> = Arc::new(HttpEventSender::new(config.bus.address.clone()));

    let handler = Arc::new(efn_worker::WorkerHandler::new(
        store,
        events,
        Arc::new(DummyOrchestrator),
        observability,
        traffic_volume,
        Calculator::new(config.carbon_factor.0),
    ));

    let app = receiver_router(handler);
    let listener = tokio::net::TcpListener::bind(&config.api.address).await?;
    tracing::info!(address = %listener.local_addr()?, "starting worker server (event ingress on / and /dlq)");

    axum::serve(listener, app).await?;
    Ok(())
}
