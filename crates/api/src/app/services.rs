//! Infrastructure wiring for the API service.

use std::sync::Arc;

use efn_core::{ApiConfig, Config};
use efn_events::{EventSender, HttpEventSender, InMemoryEventBus};
use efn_store::{InMemoryStore, PgStore, Store};
use efn_upstreams::{AllowAll, HttpPdp, Policy};

pub struct ApiServices {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventSender>,
    pub policy: Arc<dyn Policy>,
    pub config: ApiConfig,
}

impl ApiServices {
    /// Production wiring from configuration: Postgres store, broker-backed
    /// event sender, PDP-backed policy (or allow-all when skipped).
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = if config.database.in_memory {
            tracing::warn!("DB_IN_MEMORY=true; using the in-memory store (dev only)");
            InMemoryStore::arc()
        } else {
            Arc::new(PgStore::connect(&config.database).await?)
        };

        let policy: Arc<dyn Policy> = if config.pdp.skip_policy_check {
            tracing::warn!("PDP_SKIP_POLICY_CHECK=true; authorization is bypassed (dev only)");
            Arc::new(AllowAll)
        } else {
            Arc::new(HttpPdp::new(config.pdp.address.clone()))
        };

        Ok(Self {
            store,
            events: Arc::new(HttpEventSender::new(config.bus.address.clone())),
            policy,
            config: config.api.clone(),
        })
    }

    /// In-memory wiring for tests/dev. The caller keeps the store and bus
    /// handles for assertions.
    pub fn in_memory(
        config: ApiConfig,
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryEventBus>,
    ) -> Self {
        Self {
            store,
            events: bus,
            policy: Arc::new(AllowAll),
            config,
        }
    }
}
