//! ABOUTME: Line-delimited JSON-RPC 2.0 over a subprocess's stdio

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use noetic_core::{KernelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::types::ToolRegistration;

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    message: String,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn call(&self, tool_name: &str, args: Value) -> Result<Value>;
    async fn list_tools(&self) -> Result<Vec<ToolRegistration>>;
}

/// A running tool server process, speaking one JSON-RPC request/response
/// pair per line over stdin/stdout. A background reader task demultiplexes
/// responses by id onto pending oneshot channels, so concurrent callers
/// can share one process.
pub struct StdioProcessTransport {
    server_name: String,
    stdin: Mutex<tokio::process::ChildStdin>,
    pending: Arc<DashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
    next_id: AtomicU64,
    _child: Child,
}

impl StdioProcessTransport {
    pub async fn spawn(server_name: &str, command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| KernelError::Transient { message: format!("failed to spawn tool server {server_name}: {e}") })?;

        let stdin = child.stdin.take().ok_or_else(|| KernelError::Internal {
            message: format!("tool server {server_name} has no stdin"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| KernelError::Internal {
            message: format!("tool server {server_name} has no stdout"),
        })?;

        let pending: Arc<DashMap<u64, oneshot::Sender<JsonRpcResponse>>> = Arc::new(DashMap::new());
        let pending_reader = pending.clone();
        let name = server_name.to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<JsonRpcResponse>(&line) {
                        Ok(resp) => {
                            if let Some((_, tx)) = pending_reader.remove(&resp.id) {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => warn!(server = %name, error = %e, "malformed json-rpc line from tool server"),
                    },
                    Ok(None) => {
                        debug!(server = %name, "tool server stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(server = %name, error = %e, "error reading tool server stdout");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            server_name: server_name.to_string(),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: child,
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let req = JsonRpcRequest { jsonrpc: "2.0", id, method, params };
        let mut line = serde_json::to_string(&req).map_err(|e| KernelError::Internal { message: e.to_string() })?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(|e| KernelError::Transient {
                message: format!("failed writing to tool server {}: {e}", self.server_name),
            })?;
        }

        let resp = rx.await.map_err(|_| KernelError::Transient {
            message: format!("tool server {} closed before responding", self.server_name),
        })?;

        if let Some(err) = resp.error {
            return Err(KernelError::Permanent { message: err.message });
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ToolTransport for StdioProcessTransport {
    async fn call(&self, tool_name: &str, args: Value) -> Result<Value> {
        self.request("tools/call", serde_json::json!({ "name": tool_name, "arguments": args })).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolRegistration>> {
        let value = self.request("tools/list", Value::Null).await?;
        let tools: Vec<ToolRegistration> = serde_json::from_value(value).map_err(|e| KernelError::Permanent {
            message: format!("malformed tools/list response from {}: {e}", self.server_name),
        })?;
        Ok(tools)
    }
}
