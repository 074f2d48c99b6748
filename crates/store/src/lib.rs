//! `efn-store`: the shared job/result store.
//!
//! The store is the only cross-replica coordination point in the system. It
//! exposes exactly three concurrency-relevant guarantees:
//!
//! 1. a unique compound index on `(job_id, app_id)` that turns concurrent
//!    partial upserts into updates of one document instead of duplicates,
//! 2. two atomic compare-and-set flags on the job (`calculation_triggered`,
//!    `notification_sent`) observed by exactly one winner each, and
//! 3. field-level partial writes that never clobber sibling fields written
//!    concurrently.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use efn_core::{Job, JobAppResult, JobAppResultMetadata, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with an existing document id.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, query, serialization). Transient from
    /// the caller's point of view.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The store contract shared by all services.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new job. Fails with [`StoreError::Duplicate`] when the
    /// request id already exists.
    async fn create_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, request_id: &str) -> Result<Job, StoreError>;

    /// Advisory status update; fails with NotFound for unknown jobs.
    async fn set_job_status(&self, request_id: &str, status: JobStatus) -> Result<(), StoreError>;

    /// Atomically set `calculation_triggered = true` unless already set.
    /// Returns true iff this call performed the transition; the winner (and
    /// only the winner) may emit the calculation event.
    async fn try_set_calculation_triggered(&self, request_id: &str) -> Result<bool, StoreError>;

    /// Atomically set `notification_sent = true` unless already set.
    /// Returns true iff this call performed the transition; the winner (and
    /// only the winner) may deliver the notification.
    async fn try_set_notification_sent(&self, request_id: &str) -> Result<bool, StoreError>;

    /// Upsert the app-level energy consumption for `(job_id, app_id)`.
    /// Metadata is written on insert only; the value is always set.
    async fn create_or_update_application_result(
        &self,
        meta: &JobAppResultMetadata,
        consumption: f64,
    ) -> Result<(), StoreError>;

    /// Upsert the energy consumption of one network element, leaving its
    /// traffic fields and all sibling elements untouched.
    async fn set_network_element_energy(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        energy_consumption: f64,
    ) -> Result<(), StoreError>;

    /// Upsert the traffic pair of one network element, leaving its energy
    /// field and all sibling elements untouched.
    async fn set_network_element_traffic(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        app_instance_traffic: f64,
        total_traffic: f64,
    ) -> Result<(), StoreError>;

    async fn get_job_app_result(
        &self,
        job_id: &str,
        app_id: &str,
    ) -> Result<Option<JobAppResult>, StoreError>;

    async fn get_all_job_app_results(&self, job_id: &str) -> Result<Vec<JobAppResult>, StoreError>;
}

#[async_trait]
impl<S> Store for std::sync::Arc<S>
where
    S: Store + ?Sized,
{
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        (**self).create_job(job).await
    }

    async fn get_job(&self, request_id: &str) -> Result<Job, StoreError> {
        (**self).get_job(request_id).await
    }

    async fn set_job_status(&self, request_id: &str, status: JobStatus) -> Result<(), StoreError> {
        (**self).set_job_status(request_id, status).await
    }

    async fn try_set_calculation_triggered(&self, request_id: &str) -> Result<bool, StoreError> {
        (**self).try_set_calculation_triggered(request_id).await
    }

    async fn try_set_notification_sent(&self, request_id: &str) -> Result<bool, StoreError> {
        (**self).try_set_notification_sent(request_id).await
    }

    async fn create_or_update_application_result(
        &self,
        meta: &JobAppResultMetadata,
        consumption: f64,
    ) -> Result<(), StoreError> {
        (**self)
            .create_or_update_application_result(meta, consumption)
            .await
    }

    async fn set_network_element_energy(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        energy_consumption: f64,
    ) -> Result<(), StoreError> {
        (**self)
            .set_network_element_energy(meta, ne_instance_id, energy_consumption)
            .await
    }

    async fn set_network_element_traffic(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        app_instance_traffic: f64,
        total_traffic: f64,
    ) -> Result<(), StoreError> {
        (**self)
            .set_network_element_traffic(meta, ne_instance_id, app_instance_traffic, total_traffic)
            .await
    }

    async fn get_job_app_result(
        &self,
        job_id: &str,
        app_id: &str,
    ) -> Result<Option<JobAppResult>, StoreError> {
        (**self).get_job_app_result(job_id, app_id).await
    }

    async fn get_all_job_app_results(&self, job_id: &str) -> Result<Vec<JobAppResult>, StoreError> {
        (**self).get_all_job_app_results(job_id).await
    }
}

pub use memory::InMemoryStore;
pub use postgres::PgStore;
