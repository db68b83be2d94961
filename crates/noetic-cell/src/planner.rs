//! ABOUTME: Trait seam between a KernelCell and the planning/execution
//! ABOUTME: services (microplanner, DAG executor) that noetic-engine wires in

use async_trait::async_trait;
use noetic_core::{CellId, Result, StdioEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::role::Role;

/// A child cell this cell wants to delegate a sub-question to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationSpec {
    pub role: Role,
    pub question: String,
    pub domain: Option<String>,
}

/// A single step of a workflow blueprint, opaque to noetic-cell — the
/// concrete node shape is owned by whatever DAG executor is wired in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintStep {
    pub id: String,
    pub kind: String,
    pub spec: Value,
}

/// What a cell should do next, as decided by its planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanOutcome {
    Delegate(Vec<DelegationSpec>),
    RunBlueprint(Vec<BlueprintStep>),
    Direct(String),
}

/// Produces a `PlanOutcome` for a cell's question. noetic-cell depends
/// only on this trait, not on a concrete microplanner implementation, so
/// unit tests can substitute a scripted planner instead of calling out to
/// an LLM.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, cell_id: &CellId, role: Role, question: &str, domain: Option<&str>) -> Result<PlanOutcome>;
}

/// Executes a resolved blueprint and returns the resulting artifacts as a
/// JSON value the cell can fold into its own `WorkPackage`. Concrete
/// implementations live in the DAG execution crate; noetic-cell only
/// needs this seam.
#[async_trait]
pub trait DagRunner: Send + Sync {
    async fn run_blueprint(&self, cell_id: &CellId, steps: Vec<BlueprintStep>) -> Result<Value>;
}

/// Synthesizes a final `StdioEnvelope` from a cell's own findings plus its
/// children's completed envelopes. Kept as a trait so synthesis strategy
/// (heuristic merge vs. an LLM summarization pass) is swappable per host.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, cell_id: &CellId, own_findings: &Value, child_envelopes: &[StdioEnvelope]) -> Result<StdioEnvelope>;
}
