//! In-memory store for tests/dev.
//!
//! Same observable semantics as the Postgres store: one document per
//! `(job_id, app_id)`, first-writer-pins metadata, flag CAS under a single
//! lock so exactly one caller observes the transition.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use efn_core::{Job, JobAppResult, JobAppResultMetadata, JobStatus, NetworkElementResult};

use crate::{Store, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
    results: RwLock<BTreeMap<(String, String), JobAppResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn upsert<F>(&self, meta: &JobAppResultMetadata, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut JobAppResult),
    {
        let mut results = self.results.write().unwrap();
        let entry = results
            .entry((meta.job_id.clone(), meta.app_id.clone()))
            .or_insert_with(|| JobAppResult {
                job_id: meta.job_id.clone(),
                app_id: meta.app_id.clone(),
                // Pinned by the first writer; later upserts leave it alone.
                number_of_total_nes: meta.number_of_total_nes,
                app_instance_energy_consumption: None,
                network_elements: BTreeMap::new(),
            });
        apply(entry);
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(job.request_id()) {
            return Err(StoreError::Duplicate(job.request_id().to_string()));
        }
        jobs.insert(job.request_id().to_string(), job.clone());
        Ok(())
    }

    async fn get_job(&self, request_id: &str) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job '{request_id}'")))
    }

    async fn set_job_status(&self, request_id: &str, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs
            .get_mut(request_id)
            .ok_or_else(|| StoreError::NotFound(format!("job '{request_id}'")))?;
        job.status = Some(status);
        Ok(())
    }

    async fn try_set_calculation_triggered(&self, request_id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(request_id) {
            Some(job) if !job.calculation_triggered => {
                job.calculation_triggered = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            // Mirrors the conditional UPDATE: zero rows matched.
            None => Ok(false),
        }
    }

    async fn try_set_notification_sent(&self, request_id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(request_id) {
            Some(job) if !job.notification_sent => {
                job.notification_sent = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn create_or_update_application_result(
        &self,
        meta: &JobAppResultMetadata,
        consumption: f64,
    ) -> Result<(), StoreError> {
        self.upsert(meta, |entry| {
            entry.app_instance_energy_consumption = Some(consumption);
        })
    }

    async fn set_network_element_energy(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        energy_consumption: f64,
    ) -> Result<(), StoreError> {
        self.upsert(meta, |entry| {
            entry
                .network_elements
                .entry(ne_instance_id.to_string())
                .or_insert_with(NetworkElementResult::default)
                .energy_consumption = Some(energy_consumption);
        })
    }

    async fn set_network_element_traffic(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        app_instance_traffic: f64,
        total_traffic: f64,
    ) -> Result<(), StoreError> {
        self.upsert(meta, |entry| {
            let ne = entry
                .network_elements
                .entry(ne_instance_id.to_string())
                .or_insert_with(NetworkElementResult::default);
            ne.app_instance_traffic = Some(app_instance_traffic);
            ne.total_traffic = Some(total_traffic);
        })
    }

    async fn get_job_app_result(
        &self,
        job_id: &str,
        app_id: &str,
    ) -> Result<Option<JobAppResult>, StoreError> {
        Ok(self
            .results
            .read()
            .unwrap()
            .get(&(job_id.to_string(), app_id.to_string()))
            .cloned())
    }

    async fn get_all_job_app_results(&self, job_id: &str) -> Result<Vec<JobAppResult>, StoreError> {
        Ok(self
            .results
            .read()
            .unwrap()
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }
}
