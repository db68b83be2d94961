//! ABOUTME: Row shapes shared by the dispatcher and data pool

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct MicroTaskSpec {
    pub tool_name: String,
    pub parameters: Value,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeasedTask {
    pub task_id: Uuid,
    pub batch_id: Uuid,
    pub tool_name: String,
    pub parameters: Value,
    pub retry_count: i32,
    pub max_retries: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub batch_id: Uuid,
    pub status: String,
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl BatchStatus {
    pub fn is_done(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolItemStatus {
    pub pool_id: String,
    pub total_items: i64,
    pub raw_items: i64,
    pub processed_items: i64,
    pub failed_items: i64,
}

impl PoolItemStatus {
    pub fn completion_rate(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.processed_items as f64 / self.total_items as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskOutcome {
    Completed,
    Failed,
}

impl TaskOutcome {
    pub fn as_status(self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(pending: i64, running: i64) -> BatchStatus {
        BatchStatus { batch_id: Uuid::nil(), status: "running".to_string(), total: pending + running, pending, running, completed: 0, failed: 0 }
    }

    #[test]
    fn batch_with_pending_or_running_tasks_is_not_done() {
        assert!(!status(1, 0).is_done());
        assert!(!status(0, 1).is_done());
        assert!(status(0, 0).is_done());
    }

    #[test]
    fn completion_rate_of_empty_pool_is_zero() {
        let s = PoolItemStatus { pool_id: "p".to_string(), total_items: 0, raw_items: 0, processed_items: 0, failed_items: 0 };
        assert_eq!(s.completion_rate(), 0.0);
    }

    #[test]
    fn completion_rate_counts_only_processed_items() {
        let s = PoolItemStatus { pool_id: "p".to_string(), total_items: 10, raw_items: 4, processed_items: 5, failed_items: 1 };
        assert!((s.completion_rate() - 0.5).abs() < 1e-9);
    }
}
