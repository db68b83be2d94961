//! ABOUTME: Trait seam to tool execution and sandboxed code execution,
//! ABOUTME: kept separate from noetic-tools so this crate stays independently testable

use async_trait::async_trait;
use noetic_core::Result;
use serde_json::Value;

#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value>;

    /// JSON schema (`required`/`properties`) for `name`'s input, consulted
    /// by the executor to auto-wire missing required arguments from prior
    /// node artifacts before dispatch. `None` means the tool is unknown to
    /// this caller or it can't report a schema; required arguments then
    /// can't be distinguished from optional ones and are left unwired.
    fn input_schema(&self, _name: &str) -> Option<Value> {
        None
    }
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run_code(&self, source: &str, context: &Value) -> Result<Value>;
}
