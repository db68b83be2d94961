//! ABOUTME: StdioEnvelope — the universal output of any KernelCell
//! ABOUTME: The thin HTTP/SSE/chat formatter (out of core scope) consumes this shape

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structured product of a cell's research cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackage {
    pub summary: String,
    pub artifacts: Vec<String>,
    pub key_findings: Vec<String>,
}

impl WorkPackage {
    pub fn empty() -> Self {
        Self {
            summary: String::new(),
            artifacts: Vec::new(),
            key_findings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdoutPayload {
    pub content: String,
    pub work_package: WorkPackage,
    pub key_findings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub error: String,
    pub recovery_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub warning_type: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StderrBundle {
    pub failures: Vec<TaskFailure>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub cell_id: String,
    pub level: u32,
    pub role: String,
    pub domain: Option<String>,
    pub confidence: f64,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub children_count: u32,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Free-form extra fields (e.g. `tools_used`, `replans`) that downstream
    /// formatters and tests inspect without widening this struct every time.
    #[serde(default)]
    pub extra: Value,
}

/// The universal output of any cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioEnvelope {
    pub stdout: StdoutPayload,
    pub stderr: StderrBundle,
    pub metadata: EnvelopeMetadata,
}

impl StdioEnvelope {
    pub fn confidence(&self) -> f64 {
        self.metadata.confidence
    }

    pub fn is_cancelled(&self) -> bool {
        self.stderr
            .warnings
            .iter()
            .any(|w| w.warning_type == "cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = StdioEnvelope {
            stdout: StdoutPayload {
                content: "Paris".into(),
                work_package: WorkPackage::empty(),
                key_findings: vec![],
            },
            stderr: StderrBundle::default(),
            metadata: EnvelopeMetadata {
                cell_id: "ceo-1".into(),
                level: 0,
                role: "ceo".into(),
                domain: None,
                confidence: 1.0,
                duration_ms: 10,
                tokens_used: 5,
                children_count: 0,
                messages_sent: 0,
                messages_received: 0,
                extra: Value::Null,
            },
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: StdioEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stdout.content, "Paris");
        assert!((back.confidence() - 1.0).abs() < f64::EPSILON);
    }
}
