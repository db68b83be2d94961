//! ABOUTME: Staging area for bulk-collected data, monitored without loading content through the kernel

use noetic_core::Result;
use serde_json::Value;
use uuid::Uuid;

use crate::models::PoolItemStatus;
use crate::pool::Database;

pub struct DataPool<'a> {
    db: &'a Database,
}

impl<'a> DataPool<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a collected item. Called by worker cells as data arrives,
    /// independent of whatever consumes the pool later.
    pub async fn insert_item(&self, pool_id: &str, metadata: Value, artifact_ref: Option<&str>) -> Result<Uuid> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "INSERT INTO data_pool (pool_id, metadata, artifact_ref) VALUES ($1, $2, $3) RETURNING item_id",
                &[&pool_id, &metadata, &artifact_ref],
            )
            .await
            .map_err(storage_err)?;
        Ok(row.get("item_id"))
    }

    pub async fn mark_processed(&self, item_id: Uuid, artifact_ref: Option<&str>) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                "UPDATE data_pool SET status = 'processed', artifact_ref = COALESCE($2, artifact_ref), updated_at = now()
                 WHERE item_id = $1",
                &[&item_id, &artifact_ref],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn mark_failed(&self, item_id: Uuid) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute("UPDATE data_pool SET status = 'failed', updated_at = now() WHERE item_id = $1", &[&item_id])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Aggregate counts for `pool_id`, used by a monitor node deciding
    /// whether collection has reached its target size.
    pub async fn status(&self, pool_id: &str) -> Result<PoolItemStatus> {
        let client = self.db.client().await?;
        let rows = client
            .query("SELECT status, COUNT(*) AS count FROM data_pool WHERE pool_id = $1 GROUP BY status", &[&pool_id])
            .await
            .map_err(storage_err)?;

        let mut raw = 0i64;
        let mut processed = 0i64;
        let mut failed = 0i64;
        for row in &rows {
            let s: String = row.get("status");
            let count: i64 = row.get("count");
            match s.as_str() {
                "raw" => raw = count,
                "processed" => processed = count,
                "failed" => failed = count,
                _ => {}
            }
        }

        Ok(PoolItemStatus {
            pool_id: pool_id.to_string(),
            total_items: raw + processed + failed,
            raw_items: raw,
            processed_items: processed,
            failed_items: failed,
        })
    }
}

fn storage_err(e: tokio_postgres::Error) -> noetic_core::KernelError {
    noetic_core::KernelError::Storage { message: e.to_string() }
}
