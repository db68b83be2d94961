//! ABOUTME: Concrete adapters wiring noetic-cell and noetic-dag's injected
//! ABOUTME: traits to the tool registry, DAG executor, and an optional LLM

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use noetic_cell::{BlueprintStep, DagRunner, DelegationSpec, PlanOutcome, Planner, Role, Synthesizer};
use noetic_config::{ExecutorConfig, RetryConfig};
use noetic_core::collaborators::LlmCaller;
use noetic_core::{CellId, KernelError, Result, StdioEnvelope, StdoutPayload};
use noetic_dag::{CodeRunner, Executor, NodeKind, ToolCaller, Workflow, WorkflowNode};
use noetic_tools::ToolRegistry;
use serde_json::Value;
use tracing::warn;

/// Feeds tool calls through the ephemeral tool-session registry, spawning
/// the owning server on first use.
pub struct RegistryToolCaller {
    registry: Arc<ToolRegistry>,
}

impl RegistryToolCaller {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolCaller for RegistryToolCaller {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        self.registry.call_tool(name, args).await
    }

    fn input_schema(&self, name: &str) -> Option<Value> {
        self.registry.lookup_tool(name).map(|t| t.input_schema)
    }
}

/// No sandboxed code runtime is wired into this host yet; `Code` nodes pass
/// their context through unchanged so a workflow author notices immediately
/// rather than silently losing a transform step.
pub struct PassthroughCodeRunner;

#[async_trait]
impl CodeRunner for PassthroughCodeRunner {
    async fn run_code(&self, _source: &str, context: &Value) -> Result<Value> {
        Ok(context.clone())
    }
}

/// Wraps `noetic_dag::Executor` behind the `DagRunner` seam `noetic-cell`
/// depends on, translating opaque `BlueprintStep`s into a typed `Workflow`.
pub struct DagExecutorAdapter {
    executor: Executor,
}

impl DagExecutorAdapter {
    pub fn new(
        tool_caller: Arc<dyn ToolCaller>,
        code_runner: Arc<dyn CodeRunner>,
        llm: Option<Arc<dyn LlmCaller>>,
        executor_cfg: Arc<ExecutorConfig>,
        retry_cfg: Arc<RetryConfig>,
        auto_wire_threshold: f64,
    ) -> Self {
        Self { executor: Executor::with_auto_wire_threshold(tool_caller, code_runner, llm, executor_cfg, retry_cfg, auto_wire_threshold) }
    }
}

#[async_trait]
impl DagRunner for DagExecutorAdapter {
    async fn run_blueprint(&self, cell_id: &CellId, steps: Vec<BlueprintStep>) -> Result<Value> {
        let nodes = steps
            .into_iter()
            .map(blueprint_step_to_node)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|message| KernelError::Validation { message: format!("{cell_id}: {message}") })?;

        let report = self.executor.run(Workflow { nodes }).await?;
        Ok(serde_json::to_value(report.outputs).unwrap_or(Value::Null))
    }
}

/// A blueprint step's `spec` carries both the node's typed payload and its
/// scheduling metadata (`phase`, `depends_on`, `timeout_secs`, `retries`)
/// as sibling keys, since `noetic-cell` treats the whole step as opaque.
fn blueprint_step_to_node(step: BlueprintStep) -> std::result::Result<WorkflowNode, String> {
    let phase = step.spec.get("phase").and_then(Value::as_u64).unwrap_or(0) as u32;
    let depends_on: Vec<String> = step
        .spec
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let timeout_secs = step.spec.get("timeout_secs").and_then(Value::as_u64);
    let retries = step.spec.get("retries").and_then(Value::as_u64).map(|r| r as u32);

    let kind = match step.kind.as_str() {
        "tool" => NodeKind::Tool {
            name: field_str(&step.spec, "name")?,
            args: step.spec.get("args").cloned().unwrap_or(Value::Null),
            input_mapping: string_map(&step.spec, "input_mapping"),
            output_artifact: field_str_opt(&step.spec, "output_artifact"),
        },
        "code" => NodeKind::Code {
            source: field_str(&step.spec, "source")?,
            input_mapping: string_map(&step.spec, "input_mapping"),
            output_artifact: field_str_opt(&step.spec, "output_artifact"),
        },
        "llm" => NodeKind::Llm { prompt: field_str(&step.spec, "prompt")?, system: field_str_opt(&step.spec, "system") },
        "switch" => NodeKind::Switch {
            condition: field_str(&step.spec, "condition")?,
            true_branch: node_list(&step.spec, "true_branch")?,
            false_branch: node_list(&step.spec, "false_branch")?,
        },
        "loop" => NodeKind::Loop {
            loop_over: field_str(&step.spec, "loop_over")?,
            loop_variable: field_str(&step.spec, "loop_variable")?,
            loop_body: node_list(&step.spec, "loop_body")?,
            max_parallel: step.spec.get("max_parallel").and_then(Value::as_u64).unwrap_or(1) as usize,
            output_artifact: field_str_opt(&step.spec, "output_artifact"),
        },
        "merge" => NodeKind::Merge {
            merge_inputs: step
                .spec
                .get("merge_inputs")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            merge_strategy: step
                .spec
                .get("merge_strategy")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| format!("invalid merge_strategy: {e}"))?
                .unwrap_or_default(),
        },
        "agentic" => NodeKind::Agentic {
            goal: field_str(&step.spec, "goal")?,
            agent_max_steps: step.spec.get("agent_max_steps").and_then(Value::as_u64).unwrap_or(5) as u32,
            agent_tools: step
                .spec
                .get("agent_tools")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        },
        other => return Err(format!("unknown blueprint step kind: {other}")),
    };

    Ok(WorkflowNode { id: step.id, phase, kind, depends_on, timeout_secs, retries })
}

fn field_str(spec: &Value, field: &str) -> std::result::Result<String, String> {
    spec.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("blueprint step spec missing string field '{field}'"))
}

fn field_str_opt(spec: &Value, field: &str) -> Option<String> {
    spec.get(field).and_then(Value::as_str).map(str::to_string)
}

fn string_map(spec: &Value, field: &str) -> HashMap<String, String> {
    spec.get(field)
        .and_then(Value::as_object)
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

/// Deserializes a `Vec<WorkflowNode>` carried inline in a blueprint step's
/// spec (switch branches, loop bodies) rather than as separate steps, since
/// they only ever run as a unit injected by the executor.
fn node_list(spec: &Value, field: &str) -> std::result::Result<Vec<WorkflowNode>, String> {
    match spec.get(field) {
        None => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| format!("invalid '{field}': {e}")),
    }
}

/// Decides whether a cell should delegate, run a blueprint directly, or
/// answer outright. Tries an LLM reflection call first when one is wired;
/// falls back to a deterministic heuristic so the host still functions
/// without model access configured.
pub struct ReflectivePlanner {
    llm: Option<Arc<dyn LlmCaller>>,
}

impl ReflectivePlanner {
    pub fn new(llm: Option<Arc<dyn LlmCaller>>) -> Self {
        Self { llm }
    }

    fn heuristic(&self, role: Role, question: &str) -> PlanOutcome {
        if role == Role::Staff {
            return PlanOutcome::Direct(format!("Findings for: {question}"));
        }
        match role.next_lower() {
            Some(child_role) => PlanOutcome::Delegate(vec![DelegationSpec { role: child_role, question: question.to_string(), domain: None }]),
            None => PlanOutcome::Direct(format!("Findings for: {question}")),
        }
    }
}

#[async_trait]
impl Planner for ReflectivePlanner {
    async fn plan(&self, cell_id: &CellId, role: Role, question: &str, domain: Option<&str>) -> Result<PlanOutcome> {
        let Some(llm) = &self.llm else {
            return Ok(self.heuristic(role, question));
        };

        let prompt = format!(
            "Cell {cell_id} ({role:?}) must decide how to answer: \"{question}\" (domain: {}).\n\
             Reply DELEGATE if a subordinate role should take a narrower piece of this,\n\
             or DIRECT followed by the answer if this cell can answer directly.",
            domain.unwrap_or("none")
        );

        match llm.call(&prompt, None).await {
            Ok(response) if response.trim_start().to_uppercase().starts_with("DIRECT") => {
                Ok(PlanOutcome::Direct(response.trim_start()[6..].trim().to_string()))
            }
            Ok(_) => Ok(self.heuristic(role, question)),
            Err(e) => {
                warn!(cell_id = %cell_id, error = %e, "planner llm call failed, falling back to heuristic");
                Ok(self.heuristic(role, question))
            }
        }
    }
}

/// Folds a cell's own findings and its children's envelopes into one
/// `StdioEnvelope` without calling an LLM: concatenates findings text and
/// merges child metadata extras for observability.
pub struct MergeSynthesizer;

#[async_trait]
impl Synthesizer for MergeSynthesizer {
    async fn synthesize(&self, cell_id: &CellId, own_findings: &Value, child_envelopes: &[StdioEnvelope]) -> Result<StdioEnvelope> {
        let mut sections = Vec::new();
        if !own_findings.is_null() {
            sections.push(findings_to_text(own_findings));
        }
        let mut key_findings = Vec::new();
        for child in child_envelopes {
            sections.push(child.stdout.content.clone());
            key_findings.extend(child.stdout.key_findings.iter().cloned());
        }
        let content = sections.join("\n\n");

        let mut children_tokens = 0u64;
        for child in child_envelopes {
            if let Some(tokens) = child.metadata.extra.get("tokens_total").and_then(Value::as_u64) {
                children_tokens += tokens;
            }
        }

        Ok(StdioEnvelope {
            stdout: StdoutPayload {
                content,
                work_package: noetic_core::WorkPackage::empty(),
                key_findings,
            },
            stderr: noetic_core::StderrBundle::default(),
            metadata: noetic_core::EnvelopeMetadata {
                cell_id: cell_id.as_str().to_string(),
                level: 0,
                role: String::new(),
                domain: None,
                confidence: if child_envelopes.is_empty() { 1.0 } else { 0.8 },
                duration_ms: 0,
                tokens_used: 0,
                children_count: child_envelopes.len() as u32,
                messages_sent: 0,
                messages_received: 0,
                extra: serde_json::json!({ "children_tokens_total": children_tokens }),
            },
        })
    }
}

fn findings_to_text(findings: &Value) -> String {
    match findings {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_role_always_answers_directly() {
        let planner = ReflectivePlanner::new(None);
        match planner.heuristic(Role::Staff, "anything") {
            PlanOutcome::Direct(_) => {}
            _ => panic!("staff must answer directly"),
        }
    }

    #[test]
    fn non_staff_role_without_llm_delegates_one_level_down() {
        let planner = ReflectivePlanner::new(None);
        match planner.heuristic(Role::Vp, "question") {
            PlanOutcome::Delegate(specs) => assert_eq!(specs[0].role, Role::Director),
            _ => panic!("expected delegation"),
        }
    }

    #[test]
    fn tool_blueprint_step_converts_to_tool_node() {
        let step = BlueprintStep {
            id: "s1".to_string(),
            kind: "tool".to_string(),
            spec: serde_json::json!({ "name": "web_search", "args": {"q": "x"}, "phase": 0 }),
        };
        let node = blueprint_step_to_node(step).unwrap();
        assert_eq!(node.phase, 0);
        assert!(matches!(node.kind, NodeKind::Tool { .. }));
    }

    #[test]
    fn unknown_blueprint_step_kind_is_rejected() {
        let step = BlueprintStep { id: "s1".to_string(), kind: "bogus".to_string(), spec: Value::Null };
        assert!(blueprint_step_to_node(step).is_err());
    }
}
