//! ABOUTME: Postgres-backed batch/task dispatch, data pool staging, and host resource governance

pub mod data_pool;
pub mod dispatcher;
pub mod governor;
pub mod jobs;
pub mod models;
pub mod pool;

pub use data_pool::DataPool;
pub use dispatcher::Dispatcher;
pub use governor::{HealthStatus, ResourceGovernor, SystemState};
pub use jobs::{JobRecord, JobTracker};
pub use models::{BatchStatus, LeasedTask, MicroTaskSpec, PoolItemStatus, TaskOutcome};
pub use pool::Database;
