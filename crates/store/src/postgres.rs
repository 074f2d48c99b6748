//! Postgres-backed store implementation.
//!
//! ## Concurrency mapping
//!
//! | Contract guarantee | Mechanism |
//! |---|---|
//! | unique `(job_id, app_id)` partials | `UNIQUE` index, created idempotently at connect |
//! | flag CAS, exactly one winner | `UPDATE .. WHERE flag = FALSE`, `rows_affected = 1` |
//! | field-level partial writes | single-statement `INSERT .. ON CONFLICT .. DO UPDATE` with JSONB merges touching only the addressed path |
//!
//! Concurrent upserts for the same `(job_id, app_id)` serialize on the row
//! lock, so each merge expression sees the previous writer's fields.
//! `number_of_total_nes` appears only in the insert arm and is therefore
//! pinned by the first writer.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use efn_core::{DatabaseConfig, Job, JobAppResult, JobAppResultMetadata, JobSpec, JobStatus};

use crate::{Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    request_id            TEXT PRIMARY KEY,
    request_kind          TEXT NOT NULL,
    service               JSONB NOT NULL,
    subscription_request  JSONB NOT NULL,
    time_period           JSONB,
    x_correlator          TEXT,
    status                TEXT,
    calculation_triggered BOOLEAN NOT NULL DEFAULT FALSE,
    notification_sent     BOOLEAN NOT NULL DEFAULT FALSE,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS job_app_results (
    job_id                          TEXT NOT NULL,
    app_id                          TEXT NOT NULL,
    number_of_total_nes             INTEGER NOT NULL,
    app_instance_energy_consumption DOUBLE PRECISION,
    network_elements                JSONB NOT NULL DEFAULT '{}'::jsonb
);

CREATE UNIQUE INDEX IF NOT EXISTS job_id_app_id_unique
    ON job_app_results (job_id, app_id);
"#;

/// Postgres store. Cloneable; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and ensure the schema (tables + unique compound index) exists
    /// before any write is served. Index creation is idempotent.
    pub async fn connect(conf: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&conf.uri)
            .await
            .map_err(StoreError::backend)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        }
        tracing::debug!("ensured store schema and the (job_id, app_id) unique index");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let service = serde_json::to_value(&job.spec.service).map_err(StoreError::backend)?;
        let subscription =
            serde_json::to_value(&job.spec.subscription_request).map_err(StoreError::backend)?;
        let time_period =
            serde_json::to_value(&job.spec.time_period).map_err(StoreError::backend)?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs
                (request_id, request_kind, service, subscription_request, time_period,
                 x_correlator, status, calculation_triggered, notification_sent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&job.spec.request_id)
        .bind(kind_to_str(job.spec.request_kind))
        .bind(service)
        .bind(subscription)
        .bind(time_period)
        .bind(&job.x_correlator)
        .bind(job.status.map(status_to_str))
        .bind(job.calculation_triggered)
        .bind(job.notification_sent)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Duplicate(job.spec.request_id.clone()))
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn get_job(&self, request_id: &str) -> Result<Job, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT request_kind, service, subscription_request, time_period,
                   x_correlator, status, calculation_triggered, notification_sent
            FROM jobs WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .ok_or_else(|| StoreError::NotFound(format!("job '{request_id}'")))?;

        let kind: String = row.try_get("request_kind").map_err(StoreError::backend)?;
        let service: serde_json::Value = row.try_get("service").map_err(StoreError::backend)?;
        let subscription: serde_json::Value = row
            .try_get("subscription_request")
            .map_err(StoreError::backend)?;
        let time_period: Option<serde_json::Value> =
            row.try_get("time_period").map_err(StoreError::backend)?;
        let status: Option<String> = row.try_get("status").map_err(StoreError::backend)?;

        Ok(Job {
            spec: JobSpec {
                request_id: request_id.to_string(),
                request_kind: kind_from_str(&kind)?,
                service: serde_json::from_value(service).map_err(StoreError::backend)?,
                subscription_request: serde_json::from_value(subscription)
                    .map_err(StoreError::backend)?,
                time_period: match time_period {
                    Some(v) => serde_json::from_value(v).map_err(StoreError::backend)?,
                    None => None,
                },
            },
            x_correlator: row.try_get("x_correlator").map_err(StoreError::backend)?,
            calculation_triggered: row
                .try_get("calculation_triggered")
                .map_err(StoreError::backend)?,
            notification_sent: row
                .try_get("notification_sent")
                .map_err(StoreError::backend)?,
            status: status.as_deref().map(status_from_str).transpose()?,
        })
    }

    async fn set_job_status(&self, request_id: &str, status: JobStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jobs SET status = $2 WHERE request_id = $1")
            .bind(request_id)
            .bind(status_to_str(status))
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job '{request_id}'")));
        }
        Ok(())
    }

    async fn try_set_calculation_triggered(&self, request_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET calculation_triggered = TRUE \
             WHERE request_id = $1 AND calculation_triggered = FALSE",
        )
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_set_notification_sent(&self, request_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET notification_sent = TRUE \
             WHERE request_id = $1 AND notification_sent = FALSE",
        )
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_or_update_application_result(
        &self,
        meta: &JobAppResultMetadata,
        consumption: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_app_results
                (job_id, app_id, number_of_total_nes, app_instance_energy_consumption)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id, app_id) DO UPDATE
                SET app_instance_energy_consumption = EXCLUDED.app_instance_energy_consumption
            "#,
        )
        .bind(&meta.job_id)
        .bind(&meta.app_id)
        .bind(meta.number_of_total_nes as i32)
        .bind(consumption)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn set_network_element_energy(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        energy_consumption: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_app_results (job_id, app_id, number_of_total_nes, network_elements)
            VALUES ($1, $2, $3,
                    jsonb_build_object($4::text,
                        jsonb_build_object('energyConsumption', to_jsonb($5::double precision))))
            ON CONFLICT (job_id, app_id) DO UPDATE
                SET network_elements = job_app_results.network_elements
                    || jsonb_build_object($4::text,
                        coalesce(job_app_results.network_elements -> $4::text, '{}'::jsonb)
                        || jsonb_build_object('energyConsumption', to_jsonb($5::double precision)))
            "#,
        )
        .bind(&meta.job_id)
        .bind(&meta.app_id)
        .bind(meta.number_of_total_nes as i32)
        .bind(ne_instance_id)
        .bind(energy_consumption)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn set_network_element_traffic(
        &self,
        meta: &JobAppResultMetadata,
        ne_instance_id: &str,
        app_instance_traffic: f64,
        total_traffic: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_app_results (job_id, app_id, number_of_total_nes, network_elements)
            VALUES ($1, $2, $3,
                    jsonb_build_object($4::text, jsonb_build_object(
                        'appInstanceTraffic', to_jsonb($5::double precision),
                        'totalTraffic', to_jsonb($6::double precision))))
            ON CONFLICT (job_id, app_id) DO UPDATE
                SET network_elements = job_app_results.network_elements
                    || jsonb_build_object($4::text,
                        coalesce(job_app_results.network_elements -> $4::text, '{}'::jsonb)
                        || jsonb_build_object(
                            'appInstanceTraffic', to_jsonb($5::double precision),
                            'totalTraffic', to_jsonb($6::double precision)))
            "#,
        )
        .bind(&meta.job_id)
        .bind(&meta.app_id)
        .bind(meta.number_of_total_nes as i32)
        .bind(ne_instance_id)
        .bind(app_instance_traffic)
        .bind(total_traffic)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_job_app_result(
        &self,
        job_id: &str,
        app_id: &str,
    ) -> Result<Option<JobAppResult>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, app_id, number_of_total_nes,
                   app_instance_energy_consumption, network_elements
            FROM job_app_results WHERE job_id = $1 AND app_id = $2
            "#,
        )
        .bind(job_id)
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(row_to_result).transpose()
    }

    async fn get_all_job_app_results(&self, job_id: &str) -> Result<Vec<JobAppResult>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, app_id, number_of_total_nes,
                   app_instance_energy_consumption, network_elements
            FROM job_app_results WHERE job_id = $1
            ORDER BY app_id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(row_to_result).collect()
    }
}

fn row_to_result(row: sqlx::postgres::PgRow) -> Result<JobAppResult, StoreError> {
    let nes: i32 = row
        .try_get("number_of_total_nes")
        .map_err(StoreError::backend)?;
    let network_elements: serde_json::Value = row
        .try_get("network_elements")
        .map_err(StoreError::backend)?;

    Ok(JobAppResult {
        job_id: row.try_get("job_id").map_err(StoreError::backend)?,
        app_id: row.try_get("app_id").map_err(StoreError::backend)?,
        number_of_total_nes: nes as usize,
        app_instance_energy_consumption: row
            .try_get("app_instance_energy_consumption")
            .map_err(StoreError::backend)?,
        network_elements: serde_json::from_value(network_elements).map_err(StoreError::backend)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn kind_to_str(kind: efn_core::RequestKind) -> &'static str {
    match kind {
        efn_core::RequestKind::EnergyConsumption => "energy_consumption",
        efn_core::RequestKind::CarbonFootprint => "carbon_footprint",
    }
}

fn kind_from_str(s: &str) -> Result<efn_core::RequestKind, StoreError> {
    match s {
        "energy_consumption" => Ok(efn_core::RequestKind::EnergyConsumption),
        "carbon_footprint" => Ok(efn_core::RequestKind::CarbonFootprint),
        other => Err(StoreError::Backend(format!("unknown request kind '{other}'"))),
    }
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> Result<JobStatus, StoreError> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(StoreError::Backend(format!("unknown job status '{other}'"))),
    }
}
