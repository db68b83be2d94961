//! ABOUTME: Tool-session registry: JIT server spawning, discovery cache, idle-TTL sweeping

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use noetic_config::ToolServersConfig;
use noetic_core::{KernelError, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::manifest::ServerManifest;
use crate::transport::{StdioProcessTransport, ToolTransport};
use crate::types::{ServerConfig, ToolRegistration, ToolStats, Transport};

struct ServerSession {
    transport: Arc<dyn ToolTransport>,
    last_used: AtomicI64,
}

impl ServerSession {
    fn touch(&self) {
        self.last_used.store(now_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let elapsed_ms = now_millis().saturating_sub(self.last_used.load(Ordering::Relaxed));
        Duration::from_millis(elapsed_ms.max(0) as u64)
    }
}

fn now_millis() -> i64 {
    // Monotonic-ish wall clock stand-in: callers only ever compare deltas
    // computed from this same process, so epoch semantics don't matter.
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().duration_since(start).as_millis() as i64
}

/// Ephemeral tool-session registry: spawns stdio tool servers on first use,
/// caches their advertised tools, and sweeps sessions idle past `idle_ttl`.
pub struct ToolRegistry {
    servers: DashMap<String, ServerConfig>,
    sessions: DashMap<String, ServerSession>,
    tools: DashMap<String, ToolRegistration>,
    tool_to_server: DashMap<String, String>,
    stats: DashMap<String, ToolStats>,
    idle_ttl: Duration,
}

impl ToolRegistry {
    /// `cfg.dir` is a directory of server config files; loading them is the
    /// caller's concern (no filesystem access here) — register each via
    /// `register_server` after construction.
    pub fn new(cfg: &ToolServersConfig) -> Self {
        Self {
            servers: DashMap::new(),
            sessions: DashMap::new(),
            tools: DashMap::new(),
            tool_to_server: DashMap::new(),
            stats: DashMap::new(),
            idle_ttl: Duration::from_secs(cfg.idle_ttl_secs),
        }
    }

    pub fn register_server(&self, config: ServerConfig) {
        self.servers.insert(config.name.clone(), config);
    }

    /// Registers a server plus the tools its manifest declares up front,
    /// so `list_tools`/search can see them before the server is ever
    /// spawned — matching the builtin-tool bootstrap a host performs at
    /// startup instead of hard-coding a tool list.
    pub fn register_manifest(&self, manifest: &ServerManifest) {
        self.register_server(manifest.server_config());
        for tool in manifest.tool_registrations() {
            self.tool_to_server.insert(tool.name.clone(), tool.server_name.clone());
            self.tools.insert(tool.name.clone(), tool);
        }
    }

    pub fn server_config(&self, name: &str) -> Option<ServerConfig> {
        self.servers.get(name).map(|s| s.clone())
    }

    pub fn get_server_for_tool(&self, tool_name: &str) -> Option<String> {
        self.tool_to_server.get(tool_name).map(|s| s.clone())
    }

    pub fn lookup_tool(&self, tool_name: &str) -> Option<ToolRegistration> {
        self.tools.get(tool_name).map(|t| t.clone())
    }

    pub fn list_tools(&self) -> Vec<ToolRegistration> {
        self.tools.iter().map(|e| e.value().clone()).collect()
    }

    pub fn list_servers(&self) -> Vec<ServerConfig> {
        self.servers.iter().map(|e| e.value().clone()).collect()
    }

    /// Spawn (if not already running) the server backing `server_name` and
    /// cache the tools it advertises via `tools/list`.
    pub async fn discover(&self, server_name: &str) -> Result<Vec<ToolRegistration>> {
        let transport = self.session_for(server_name).await?;
        let tools = transport.list_tools().await?;
        for tool in &tools {
            self.tools.insert(tool.name.clone(), tool.clone());
            self.tool_to_server.insert(tool.name.clone(), server_name.to_string());
        }
        Ok(tools)
    }

    async fn session_for(&self, server_name: &str) -> Result<Arc<dyn ToolTransport>> {
        if let Some(session) = self.sessions.get(server_name) {
            session.touch();
            return Ok(session.transport.clone());
        }

        let config = self.servers.get(server_name).map(|c| c.clone()).ok_or_else(|| KernelError::Validation {
            message: format!("unknown tool server: {server_name}"),
        })?;
        if !config.enabled {
            return Err(KernelError::Validation { message: format!("tool server {server_name} is disabled") });
        }
        if config.transport != Transport::Stdio {
            return Err(KernelError::Validation {
                message: format!("tool server {server_name}: only stdio transport is implemented"),
            });
        }

        info!(server = %server_name, command = %config.command, "spawning tool server");
        let transport: Arc<dyn ToolTransport> =
            Arc::new(StdioProcessTransport::spawn(server_name, &config.command, &config.args).await?);
        self.sessions.insert(
            server_name.to_string(),
            ServerSession { transport: transport.clone(), last_used: AtomicI64::new(now_millis()) },
        );
        Ok(transport)
    }

    /// Call `tool_name`, spawning its owning server on demand, and track
    /// call-count/average-duration stats for it.
    pub async fn call_tool(&self, tool_name: &str, args: Value) -> Result<Value> {
        let server_name = self.get_server_for_tool(tool_name).ok_or_else(|| KernelError::Validation {
            message: format!("no server registered for tool {tool_name}"),
        })?;
        let transport = self.session_for(&server_name).await?;
        let started = Instant::now();
        let result = transport.call(tool_name, args).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.entry(tool_name.to_string()).or_default().record(duration_ms);
        result
    }

    pub fn stats_for(&self, tool_name: &str) -> Option<ToolStats> {
        self.stats.get(tool_name).map(|s| s.clone())
    }

    /// Drop sessions idle past `idle_ttl`, returning the server names evicted.
    /// Evicted tools remain resolvable via `get_server_for_tool`; the next
    /// call just respawns the server.
    pub fn sweep(&self) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|name, session| {
            let idle = session.idle_for() <= self.idle_ttl;
            if !idle {
                evicted.push(name.clone());
            }
            idle
        });
        if !evicted.is_empty() {
            warn!(?evicted, "swept idle tool server sessions");
        }
        evicted
    }
}
