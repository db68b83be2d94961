//! ABOUTME: Tool and server descriptors shared across the registry

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Stdio,
    Sse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub enabled: bool,
    pub transport: Transport,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistration {
    pub name: String,
    pub description: String,
    pub server_name: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ToolStats {
    pub call_count: u64,
    pub avg_duration_ms: f64,
}

impl ToolStats {
    pub fn record(&mut self, duration_ms: f64) {
        self.call_count += 1;
        self.avg_duration_ms += (duration_ms - self.avg_duration_ms) / self.call_count as f64;
    }
}
