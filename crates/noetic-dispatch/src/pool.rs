//! ABOUTME: Deadpool-managed Postgres connection pool plus refinery migrations

use std::str::FromStr;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use noetic_config::DatabaseConfig;
use noetic_core::{KernelError, Result};
use tokio_postgres::NoTls;

refinery::embed_migrations!("migrations");

/// Owns the connection pool and applies migrations exactly once.
pub struct Database {
    pool: Pool,
}

impl Database {
    pub fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pg_config = tokio_postgres::Config::from_str(&cfg.connection_string).map_err(|e| KernelError::Configuration {
            message: format!("invalid database connection string: {e}"),
        })?;

        let manager = Manager::from_config(pg_config, NoTls, ManagerConfig { recycling_method: RecyclingMethod::Fast });
        let pool = Pool::builder(manager)
            .max_size(16)
            .build()
            .map_err(|e| KernelError::Storage { message: e.to_string() })?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let mut client = self.pool.get().await.map_err(|e| KernelError::Storage { message: e.to_string() })?;
        migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| KernelError::Storage { message: format!("migration failed: {e}") })?;
        Ok(())
    }

    pub async fn client(&self) -> Result<deadpool_postgres::Client> {
        self.pool.get().await.map_err(|e| KernelError::Storage { message: format!("failed to acquire db connection: {e}") })
    }
}
