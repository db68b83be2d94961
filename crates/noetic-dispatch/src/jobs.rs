//! ABOUTME: Top-level research job tracking, the handle a host uses to
//! ABOUTME: follow one query end-to-end across its batches

use chrono::{DateTime, Utc};
use noetic_core::{KernelError, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::pool::Database;

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub question: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct JobTracker<'a> {
    db: &'a Database,
}

impl<'a> JobTracker<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create_job(&self, question: &str) -> Result<Uuid> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "INSERT INTO research_jobs (question, status) VALUES ($1, 'running') RETURNING job_id",
                &[&question],
            )
            .await
            .map_err(storage_err)?;
        Ok(row.get("job_id"))
    }

    /// Records a coarse progress marker (e.g. `"classifying"`,
    /// `"delegating"`, `"synthesizing"`) without ending the job.
    pub async fn update_job_progress(&self, job_id: Uuid, status: &str) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                "UPDATE research_jobs SET status = $2, updated_at = now() WHERE job_id = $1",
                &[&job_id, &status],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn complete_job(&self, job_id: Uuid, succeeded: bool) -> Result<()> {
        let status = if succeeded { "completed" } else { "failed" };
        self.update_job_progress(job_id, status).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<JobRecord> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                "SELECT job_id, question, status, created_at FROM research_jobs WHERE job_id = $1",
                &[&job_id],
            )
            .await
            .map_err(storage_err)?
            .ok_or_else(|| KernelError::Validation { message: format!("job {job_id} not found") })?;
        Ok(JobRecord {
            job_id: row.get("job_id"),
            question: row.get("question"),
            status: row.get("status"),
            created_at: row.get("created_at"),
        })
    }
}

fn storage_err(e: tokio_postgres::Error) -> KernelError {
    KernelError::Storage { message: e.to_string() }
}
