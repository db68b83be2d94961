//! ABOUTME: Trait boundaries for the external collaborators a cell may call out to
//! ABOUTME: No concrete provider lives here; in-memory fakes back the test suites

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// `call(prompt, system?, stream?) -> content`, errors classifiable via `ErrorKind`.
#[async_trait]
pub trait LlmCaller: Send + Sync {
    async fn call(&self, prompt: &str, system: Option<&str>) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: Vec<String>, k: usize) -> Result<Vec<String>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Value) -> Result<()>;
    async fn search(&self, vector: Vec<f32>, k: usize, filter: Option<Value>) -> Result<Vec<(String, f32, Value)>>;
}

/// Fire-and-forget audit sink. `log` must never block or fail the caller;
/// implementations should swallow their own errors internally.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(
        &self,
        event_type: &str,
        action: &str,
        actor: &str,
        resource: &str,
        details: Value,
        session_id: Option<&str>,
    );
}

/// A no-op sink used by tests and by hosts that have not wired a real one.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn log(&self, _: &str, _: &str, _: &str, _: &str, _: Value, _: Option<&str>) {}
}
