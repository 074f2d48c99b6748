use std::sync::Arc;

use efn_events::{receiver_router, EventSender, HttpEventSender};
use efn_store::{InMemoryStore, PgStore, Store};

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

    let events: Arc<dyn EventSender> = Arc::new(HttpEventSender::new(config.bus.address.clone()));

    let handler = Arc::new(efn_notify::NotifyHandler::new(store, events, &config.http)?);

    let app = receiver_router(handler);
    let listener = tokio::net::TcpListener::bind(&config.api.address).await?;
    tracing::info!(address = %listener.local_addr()?, "starting notify server");

    axum::serve(listener, app).await?;
    Ok(())
}
