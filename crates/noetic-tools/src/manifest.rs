//! ABOUTME: Loads server/tool manifests from TOML files instead of hard-coding
//! ABOUTME: a built-in tool list, since tool implementations live outside this crate

use std::path::Path;

use noetic_core::{KernelError, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{ServerConfig, ToolRegistration, Transport};

/// One `*.toml` file under `tool_servers.dir` describing a server process
/// and the tools it exposes, so a host can register them without the
/// registry knowing anything about specific tool implementations.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerManifest {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub transport: Transport,
    pub url: Option<String>,
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestTool {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ServerManifest {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            enabled: self.enabled,
            transport: self.transport,
            url: self.url.clone(),
        }
    }

    pub fn tool_registrations(&self) -> Vec<ToolRegistration> {
        self.tools
            .iter()
            .map(|t| ToolRegistration {
                name: t.name.clone(),
                description: t.description.clone(),
                server_name: self.name.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }
}

/// Reads every `*.toml` file directly under `dir` as a `ServerManifest`.
/// A missing directory yields an empty list rather than an error, since a
/// fresh host with no tool servers configured is a valid starting state.
pub fn load_manifests(dir: impl AsRef<Path>) -> Result<Vec<ServerManifest>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| KernelError::Configuration { message: format!("reading {}: {e}", dir.display()) })?;

    for entry in entries {
        let entry = entry.map_err(|e| KernelError::Configuration { message: e.to_string() })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| KernelError::Configuration { message: format!("reading {}: {e}", path.display()) })?;
        let manifest: ServerManifest = toml::from_str(&text)
            .map_err(|e| KernelError::Configuration { message: format!("parsing {}: {e}", path.display()) })?;
        manifests.push(manifest);
    }

    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_no_manifests() {
        let manifests = load_manifests("/nonexistent/tool_servers_dir").unwrap();
        assert!(manifests.is_empty());
    }

    #[test]
    fn loads_and_sorts_manifests_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scraper.toml"),
            r#"
            name = "scraper"
            command = "scraper-server"

            [[tools]]
            name = "fetch_url"
            description = "Fetch URL content via HTTP GET"
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("math.toml"),
            r#"
            name = "math"
            command = "math-server"
            "#,
        )
        .unwrap();

        let manifests = load_manifests(dir.path()).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].name, "math");
        assert_eq!(manifests[1].tools[0].name, "fetch_url");
    }

    #[test]
    fn loads_the_illustrative_demo_manifests() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/tool_servers");
        let manifests = load_manifests(&dir).unwrap();
        assert_eq!(manifests.len(), 2);
        let search = manifests.iter().find(|m| m.name == "search").unwrap();
        assert_eq!(search.tools.len(), 2);
        assert_eq!(search.tools[0].input_schema["required"][0], "query");
    }
}
