//! ABOUTME: Execution batch/micro-task tracking with lease-based task pickup

use std::time::Duration;

use noetic_core::{KernelError, Result};
use uuid::Uuid;

use crate::models::{BatchStatus, LeasedTask, MicroTaskSpec, TaskOutcome};
use crate::pool::Database;

pub struct Dispatcher<'a> {
    db: &'a Database,
    lease_ttl: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(db: &'a Database, lease_ttl: Duration) -> Self {
        Self { db, lease_ttl }
    }

    /// Create a batch under `job_id` and insert its tasks, fire-and-forget
    /// style: the caller doesn't wait for tasks to run, only for them to be
    /// durably queued.
    pub async fn create_batch(&self, job_id: Uuid, tasks: &[MicroTaskSpec]) -> Result<Uuid> {
        let mut client = self.db.client().await?;
        let txn = client.transaction().await.map_err(storage_err)?;

        let row = txn
            .query_one(
                "INSERT INTO execution_batches (job_id, status) VALUES ($1, 'running') RETURNING batch_id",
                &[&job_id],
            )
            .await
            .map_err(storage_err)?;
        let batch_id: Uuid = row.get("batch_id");

        for task in tasks {
            txn.execute(
                "INSERT INTO micro_tasks (batch_id, tool_name, parameters, priority) VALUES ($1, $2, $3, $4)",
                &[&batch_id, &task.tool_name, &task.parameters, &task.priority],
            )
            .await
            .map_err(storage_err)?;
        }

        txn.commit().await.map_err(storage_err)?;
        Ok(batch_id)
    }

    /// Lease up to `limit` pending (or lease-expired) tasks, highest
    /// priority and oldest first. `SKIP LOCKED` lets multiple workers poll
    /// concurrently without blocking on each other's row locks.
    pub async fn lease_tasks(&self, limit: i64) -> Result<Vec<LeasedTask>> {
        let mut client = self.db.client().await?;
        let txn = client.transaction().await.map_err(storage_err)?;

        let lease_secs = self.lease_ttl.as_secs() as f64;
        let rows = txn
            .query(
                "SELECT task_id, batch_id, tool_name, parameters, retry_count, max_retries
                 FROM micro_tasks
                 WHERE (status = 'pending' OR (status = 'processing' AND locked_until < now()))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED",
                &[&limit],
            )
            .await
            .map_err(storage_err)?;

        let mut leased = Vec::with_capacity(rows.len());
        for row in &rows {
            let task_id: Uuid = row.get("task_id");
            txn.execute(
                "UPDATE micro_tasks
                 SET status = 'processing', locked_until = now() + make_interval(secs => $2), updated_at = now()
                 WHERE task_id = $1",
                &[&task_id, &lease_secs],
            )
            .await
            .map_err(storage_err)?;

            leased.push(LeasedTask {
                task_id,
                batch_id: row.get("batch_id"),
                tool_name: row.get("tool_name"),
                parameters: row.get("parameters"),
                retry_count: row.get("retry_count"),
                max_retries: row.get("max_retries"),
            });
        }

        txn.commit().await.map_err(storage_err)?;
        Ok(leased)
    }

    /// Record a task's outcome. A failed task that still has retries left
    /// goes back to `pending` instead of `failed`.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        outcome: TaskOutcome,
        result_summary: Option<&str>,
        error_log: Option<&str>,
    ) -> Result<()> {
        let client = self.db.client().await?;

        if outcome == TaskOutcome::Failed {
            let row = client
                .query_one("SELECT retry_count, max_retries FROM micro_tasks WHERE task_id = $1", &[&task_id])
                .await
                .map_err(storage_err)?;
            let retry_count: i32 = row.get("retry_count");
            let max_retries: i32 = row.get("max_retries");

            if retry_count < max_retries {
                client
                    .execute(
                        "UPDATE micro_tasks
                         SET status = 'pending', retry_count = retry_count + 1, error_log = $2,
                             locked_until = NULL, updated_at = now()
                         WHERE task_id = $1",
                        &[&task_id, &error_log],
                    )
                    .await
                    .map_err(storage_err)?;
                return Ok(());
            }
        }

        client
            .execute(
                "UPDATE micro_tasks
                 SET status = $2, result_summary = $3, error_log = $4, updated_at = now()
                 WHERE task_id = $1",
                &[&task_id, &outcome.as_status(), &result_summary, &error_log],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark `batch_id` completed once every task has left `pending`/`processing`.
    pub async fn complete_batch_if_done(&self, batch_id: Uuid) -> Result<bool> {
        let status = self.batch_status(batch_id).await?;
        if status.is_done() {
            let client = self.db.client().await?;
            client
                .execute(
                    "UPDATE execution_batches SET status = 'completed', updated_at = now() WHERE batch_id = $1",
                    &[&batch_id],
                )
                .await
                .map_err(storage_err)?;
        }
        Ok(status.is_done())
    }

    pub async fn batch_status(&self, batch_id: Uuid) -> Result<BatchStatus> {
        let client = self.db.client().await?;

        let status_row = client
            .query_opt("SELECT status FROM execution_batches WHERE batch_id = $1", &[&batch_id])
            .await
            .map_err(storage_err)?
            .ok_or_else(|| KernelError::Validation { message: format!("batch {batch_id} not found") })?;
        let status: String = status_row.get("status");

        let rows = client
            .query("SELECT status, COUNT(*) AS count FROM micro_tasks WHERE batch_id = $1 GROUP BY status", &[&batch_id])
            .await
            .map_err(storage_err)?;

        let mut pending = 0i64;
        let mut running = 0i64;
        let mut completed = 0i64;
        let mut failed = 0i64;
        for row in &rows {
            let s: String = row.get("status");
            let count: i64 = row.get("count");
            match s.as_str() {
                "pending" => pending = count,
                "processing" => running = count,
                "completed" => completed = count,
                "failed" => failed = count,
                _ => {}
            }
        }

        Ok(BatchStatus {
            batch_id,
            status,
            total: pending + running + completed + failed,
            pending,
            running,
            completed,
            failed,
        })
    }
}

fn storage_err(e: tokio_postgres::Error) -> KernelError {
    KernelError::Storage { message: e.to_string() }
}
