//! ABOUTME: Phase-barrier DAG executor with bounded per-phase parallelism,
//! ABOUTME: per-node retry/backoff, and a microplanner consulted after every node

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use noetic_config::{ExecutorConfig, RetryConfig};
use noetic_core::{ArtifactStore, ErrorKind, KernelError, Result};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::collaborators::{CodeRunner, ToolCaller};
use crate::microplanner::{Microplanner, PlannerDecision};
use crate::types::{MergeStrategy, NodeKind, Workflow, WorkflowNode};

pub struct Executor {
    tool_caller: Arc<dyn ToolCaller>,
    code_runner: Arc<dyn CodeRunner>,
    llm: Option<Arc<dyn noetic_core::LlmCaller>>,
    executor_cfg: Arc<ExecutorConfig>,
    retry_cfg: Arc<RetryConfig>,
    auto_wire_threshold: f64,
}

pub struct ExecutionReport {
    pub outputs: HashMap<String, Value>,
    pub replans_used: u32,
}

impl Executor {
    pub fn new(
        tool_caller: Arc<dyn ToolCaller>,
        code_runner: Arc<dyn CodeRunner>,
        llm: Option<Arc<dyn noetic_core::LlmCaller>>,
        executor_cfg: Arc<ExecutorConfig>,
        retry_cfg: Arc<RetryConfig>,
    ) -> Self {
        Self::with_auto_wire_threshold(tool_caller, code_runner, llm, executor_cfg, retry_cfg, 0.6)
    }

    pub fn with_auto_wire_threshold(
        tool_caller: Arc<dyn ToolCaller>,
        code_runner: Arc<dyn CodeRunner>,
        llm: Option<Arc<dyn noetic_core::LlmCaller>>,
        executor_cfg: Arc<ExecutorConfig>,
        retry_cfg: Arc<RetryConfig>,
        auto_wire_threshold: f64,
    ) -> Self {
        Self { tool_caller, code_runner, llm, executor_cfg, retry_cfg, auto_wire_threshold }
    }

    #[instrument(skip(self, workflow))]
    pub async fn run(&self, mut workflow: Workflow) -> Result<ExecutionReport> {
        workflow.validate().map_err(|e| KernelError::Validation { message: e.to_string() })?;

        let microplanner = Microplanner::new(self.llm.clone(), self.executor_cfg.max_replans);
        let outputs: Arc<DashMap<String, Value>> = Arc::new(DashMap::new());
        let artifacts = Arc::new(ArtifactStore::new());
        let mut replans_used = 0u32;
        let mut phase = 0u32;

        loop {
            let nodes: Vec<WorkflowNode> = workflow.nodes_in_phase(phase).into_iter().cloned().collect();
            if nodes.is_empty() && phase > workflow.max_phase() {
                break;
            }

            let semaphore = Arc::new(Semaphore::new(self.parallelism()));
            let mut running = FuturesUnordered::new();

            for node in nodes {
                let permit_source = semaphore.clone();
                let outputs = outputs.clone();
                let artifacts = artifacts.clone();
                let this = self;
                running.push(async move {
                    let _permit = permit_source.acquire_owned().await.expect("semaphore closed");
                    let result = this.run_node_with_retry(&node, &outputs, &artifacts).await;
                    (node, result)
                });
            }

            let mut phase_had_error = false;
            let mut decision = PlannerDecision::Continue;

            while let Some((node, result)) = running.next().await {
                let value = match result {
                    Ok(v) => v,
                    Err(e) => {
                        phase_had_error = true;
                        serde_json::json!({ "error": e.to_string() })
                    }
                };
                outputs.insert(node.id.clone(), value.clone());

                if let NodeKind::Switch { .. } = &node.kind {
                    if let Some(injected) = value.get("injected_nodes").cloned() {
                        if let Ok(new_nodes) = serde_json::from_value::<Vec<WorkflowNode>>(injected) {
                            if !new_nodes.is_empty() {
                                info!(node = %node.id, count = new_nodes.len(), "splicing switch branch into the workflow");
                                workflow.nodes.extend(new_nodes);
                            }
                        }
                    }
                }

                let remaining: Vec<WorkflowNode> = workflow
                    .nodes
                    .iter()
                    .filter(|n| n.phase > phase || (n.phase == phase && n.id != node.id))
                    .cloned()
                    .collect();

                decision = microplanner.decide(&node, &value, &remaining, replans_used).await;
                if matches!(decision, PlannerDecision::Replan(_) | PlannerDecision::Expand(_)) {
                    replans_used += 1;
                }
            }

            match decision {
                PlannerDecision::Complete => {
                    info!(phase, "microplanner signalled completion, stopping early");
                    break;
                }
                PlannerDecision::Replan(new_nodes) => {
                    workflow.nodes.retain(|n| n.phase <= phase);
                    workflow.nodes.extend(new_nodes);
                }
                PlannerDecision::Expand(extra_nodes) => {
                    workflow.nodes.extend(extra_nodes);
                }
                PlannerDecision::Continue => {}
            }

            if phase_had_error && self.executor_cfg.degraded_parallelism == 0 {
                return Err(KernelError::Resource {
                    message: format!("phase {phase} failed under zero-parallelism degrade mode"),
                });
            }

            phase += 1;
            if phase > workflow.max_phase() && workflow.nodes_in_phase(phase).is_empty() {
                break;
            }
        }

        let outputs = Arc::try_unwrap(outputs).map(|d| d.into_iter().collect()).unwrap_or_default();
        Ok(ExecutionReport { outputs, replans_used })
    }

    fn parallelism(&self) -> usize {
        self.executor_cfg.max_parallelism.max(1)
    }

    async fn run_node_with_retry(&self, node: &WorkflowNode, outputs: &DashMap<String, Value>, artifacts: &ArtifactStore) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            let timeout = self.node_timeout(node);
            let fut = self.run_node(node, outputs, artifacts);
            let outcome = tokio::time::timeout(timeout, fut).await;

            let result = match outcome {
                Ok(r) => r,
                Err(_) => Err(KernelError::Timeout { kind: node.id.clone() }),
            };

            match &result {
                Ok(_) => return result,
                Err(e) if e.kind().is_retryable() && attempt < self.retry_cfg.max_retries => {
                    let backoff = self.backoff_with_jitter(attempt);
                    warn!(node = %node.id, attempt, backoff_ms = backoff, "retrying node after transient failure");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(_) => return result,
            }
        }
    }

    /// Exponential backoff with full jitter: a random delay in
    /// `[0, exponential_backoff]` bounded by `jitter_ms`, so retrying nodes
    /// across a fan-out don't all wake up on the same tick.
    fn backoff_with_jitter(&self, attempt: u32) -> u64 {
        let exp = (self.retry_cfg.base_backoff_ms * 2u64.pow(attempt)).min(self.retry_cfg.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0..=self.retry_cfg.jitter_ms.max(1));
        (exp + jitter).min(self.retry_cfg.max_backoff_ms + self.retry_cfg.jitter_ms)
    }

    fn node_timeout(&self, node: &WorkflowNode) -> Duration {
        if let Some(secs) = node.timeout_secs {
            return Duration::from_secs(secs);
        }
        let secs = match &node.kind {
            NodeKind::Llm { .. } | NodeKind::Agentic { .. } => self.executor_cfg.llm_timeout_secs,
            NodeKind::Tool { .. } | NodeKind::Code { .. } => self.executor_cfg.tool_timeout_secs,
            NodeKind::Switch { .. } | NodeKind::Merge { .. } => self.executor_cfg.short_timeout_secs,
            NodeKind::Loop { .. } => self.executor_cfg.long_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    async fn run_node(&self, node: &WorkflowNode, outputs: &DashMap<String, Value>, artifacts: &ArtifactStore) -> Result<Value> {
        match &node.kind {
            NodeKind::Tool { name, args, input_mapping, output_artifact } => {
                let mapped = Self::apply_input_mapping(args, input_mapping, outputs, artifacts);
                let wired = self.auto_wire(name, mapped, artifacts)?;
                let result = self.tool_caller.call_tool(name, wired).await?;
                if let Some(artifact_name) = output_artifact {
                    artifacts.publish(node.id.clone(), artifact_name.clone(), result.clone(), None);
                }
                Ok(result)
            }
            NodeKind::Code { source, input_mapping, output_artifact } => {
                let mut context = self.gather_inputs(node, outputs);
                if let Value::Object(map) = &mut context {
                    for (arg_name, reference) in input_mapping {
                        if let Some(v) = Self::resolve_reference(reference, outputs, artifacts) {
                            map.insert(arg_name.clone(), v);
                        }
                    }
                }
                let result = self.code_runner.run_code(source, &context).await?;
                if let Some(artifact_name) = output_artifact {
                    artifacts.publish(node.id.clone(), artifact_name.clone(), result.clone(), None);
                }
                Ok(result)
            }
            NodeKind::Llm { prompt, system } => {
                let llm = self.llm.as_ref().ok_or_else(|| KernelError::Configuration {
                    message: "llm node requires an LlmCaller but none is configured".to_string(),
                })?;
                let content = llm.call(prompt, system.as_deref()).await?;
                Ok(serde_json::json!({ "content": content }))
            }
            NodeKind::Switch { condition, true_branch, false_branch } => {
                let resolved = Self::resolve_reference(condition, outputs, artifacts);
                let truthy = match &resolved {
                    Some(v) => is_truthy(v),
                    None => condition.eq_ignore_ascii_case("true"),
                };
                let chosen = if truthy { true_branch } else { false_branch };
                let injected: Vec<WorkflowNode> = chosen
                    .iter()
                    .cloned()
                    .map(|mut n| {
                        if !n.depends_on.contains(&node.id) {
                            n.depends_on.push(node.id.clone());
                        }
                        n.phase = node.phase + 1;
                        n
                    })
                    .collect();
                Ok(serde_json::json!({
                    "branch": if truthy { "true" } else { "false" },
                    "injected_nodes": injected,
                }))
            }
            NodeKind::Merge { merge_inputs, merge_strategy } => self.run_merge(merge_inputs, *merge_strategy, outputs, artifacts).await,
            NodeKind::Loop { loop_over, loop_variable, loop_body, max_parallel, output_artifact } => {
                self.run_loop(node, loop_over, loop_variable, loop_body, *max_parallel, output_artifact.as_deref(), outputs, artifacts).await
            }
            NodeKind::Agentic { goal, agent_max_steps, agent_tools } => self.run_agentic(node, goal, *agent_max_steps, agent_tools, artifacts).await,
        }
    }

    /// Overlays `input_mapping` (argument name -> artifact reference) onto
    /// `args`, resolving each reference against node outputs first and the
    /// artifact store second. Mapped values win over whatever `args` already
    /// carried for that key.
    fn apply_input_mapping(args: &Value, input_mapping: &HashMap<String, String>, outputs: &DashMap<String, Value>, artifacts: &ArtifactStore) -> Value {
        let mut map = match args.clone() {
            Value::Object(m) => m,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut m = serde_json::Map::new();
                m.insert("value".to_string(), other);
                m
            }
        };
        for (arg_name, reference) in input_mapping {
            if let Some(v) = Self::resolve_reference(reference, outputs, artifacts) {
                map.insert(arg_name.clone(), v);
            }
        }
        Value::Object(map)
    }

    /// Resolves `reference` as a node id (or artifact name) optionally
    /// followed by dot-separated JSON field lookups, e.g. `download.path`.
    /// Node outputs are checked before the artifact store, so a plain node
    /// id always wins over a same-named artifact.
    fn resolve_reference(reference: &str, outputs: &DashMap<String, Value>, artifacts: &ArtifactStore) -> Option<Value> {
        let mut segments = reference.split('.');
        let head = segments.next()?;
        let mut value = match outputs.get(head) {
            Some(v) => v.clone(),
            None => artifacts.flatten().into_iter().find(|e| e.name == head)?.value,
        };
        for segment in segments {
            value = value.get(segment)?.clone();
        }
        Some(value)
    }

    /// Fills any of a tool's schema-required arguments still missing from
    /// `args` after `input_mapping` resolution, scanning the artifact store
    /// most-recent-first. A tool with no reachable schema (`input_schema`
    /// returns `None`) is dispatched unchanged — required arguments can't be
    /// told apart from optional ones without one.
    fn auto_wire(&self, tool_name: &str, args: Value, artifacts: &ArtifactStore) -> Result<Value> {
        let Some(schema) = self.tool_caller.input_schema(tool_name) else {
            return Ok(args);
        };
        let required: Vec<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if required.is_empty() {
            return Ok(args);
        }
        let properties = schema.get("properties").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        let mut map = match args {
            Value::Object(m) => m,
            _ => serde_json::Map::new(),
        };

        let missing: Vec<String> = required.into_iter().filter(|r| !map.contains_key(r.as_str())).collect();
        if missing.is_empty() {
            return Ok(Value::Object(map));
        }

        let candidates = artifacts.flatten();
        let wired = noetic_core::wire_missing_args(&missing, &properties, &candidates, self.auto_wire_threshold);
        for name in &missing {
            if let Some(m) = wired.get(name) {
                map.insert(name.clone(), m.entry.value.clone());
            }
        }

        let still_missing: Vec<&str> = missing.iter().map(String::as_str).filter(|n| !map.contains_key(*n)).collect();
        if !still_missing.is_empty() {
            return Err(KernelError::Validation {
                message: format!("tool '{tool_name}' missing required argument(s): {}", still_missing.join(", ")),
            });
        }

        Ok(Value::Object(map))
    }

    async fn run_merge(&self, merge_inputs: &[String], merge_strategy: MergeStrategy, outputs: &DashMap<String, Value>, artifacts: &ArtifactStore) -> Result<Value> {
        let resolved: Vec<(String, Option<Value>)> =
            merge_inputs.iter().map(|r| (r.clone(), Self::resolve_reference(r, outputs, artifacts))).collect();

        let merged = match merge_strategy {
            MergeStrategy::Concat => {
                let mut merged = Vec::new();
                for (_, v) in &resolved {
                    match v {
                        Some(Value::Array(a)) => merged.extend(a.clone()),
                        Some(other) => merged.push(other.clone()),
                        None => {}
                    }
                }
                Value::Array(merged)
            }
            MergeStrategy::Dict => {
                let mut map = serde_json::Map::new();
                for (reference, v) in &resolved {
                    if let Some(v) = v {
                        let key = reference.split('.').next().unwrap_or(reference).to_string();
                        map.insert(key, v.clone());
                    }
                }
                Value::Object(map)
            }
            MergeStrategy::First => resolved.into_iter().find_map(|(_, v)| v).unwrap_or(Value::Null),
            MergeStrategy::Custom => {
                let inputs: serde_json::Map<String, Value> = resolved.into_iter().map(|(r, v)| (r, v.unwrap_or(Value::Null))).collect();
                self.code_runner.run_code("merge", &Value::Object(inputs)).await?
            }
        };

        Ok(serde_json::json!({ "merged": merged }))
    }

    /// Materializes `loop_body` once per item in `loop_over`, binding
    /// `loop_variable` to the item, up to `max_parallel` iterations running
    /// concurrently. Each iteration gets its own output namespace so body
    /// nodes with colliding ids across iterations don't clobber each other.
    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        node: &WorkflowNode,
        loop_over: &str,
        loop_variable: &str,
        loop_body: &[WorkflowNode],
        max_parallel: usize,
        output_artifact: Option<&str>,
        outputs: &DashMap<String, Value>,
        artifacts: &ArtifactStore,
    ) -> Result<Value> {
        let collection = Self::resolve_reference(loop_over, outputs, artifacts).unwrap_or(Value::Null);
        let items = collection.as_array().cloned().ok_or_else(|| KernelError::Validation {
            message: format!("loop node {} requires '{}' to resolve to an array", node.id, loop_over),
        })?;

        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut running = FuturesUnordered::new();
        for (index, item) in items.into_iter().enumerate() {
            let permit_source = semaphore.clone();
            let this = self;
            let body = loop_body.to_vec();
            let loop_variable = loop_variable.to_string();
            let node_id = node.id.clone();
            running.push(async move {
                let _permit = permit_source.acquire_owned().await.expect("semaphore closed");
                let outcome = this.run_loop_iteration(&node_id, index, &loop_variable, item, &body).await;
                (index, outcome)
            });
        }

        let mut indexed: Vec<(usize, Result<Value>)> = Vec::new();
        while let Some(pair) = running.next().await {
            indexed.push(pair);
        }
        indexed.sort_by_key(|(index, _)| *index);

        let mut iterations = Vec::with_capacity(indexed.len());
        for (_, outcome) in indexed {
            iterations.push(outcome?);
        }

        let result = serde_json::json!({ "iterations": iterations });
        if let Some(artifact_name) = output_artifact {
            artifacts.publish(node.id.clone(), artifact_name.to_string(), result.clone(), None);
        }
        Ok(result)
    }

    /// Runs one loop iteration's body nodes in ascending `phase` order
    /// against an iteration-scoped output namespace seeded with the loop
    /// variable, returning a map of each body node's id to its result.
    async fn run_loop_iteration(&self, loop_node_id: &str, index: usize, loop_variable: &str, item: Value, body: &[WorkflowNode]) -> Result<Value> {
        let iteration_outputs: DashMap<String, Value> = DashMap::new();
        iteration_outputs.insert(loop_variable.to_string(), item);
        let iteration_artifacts = ArtifactStore::new();

        let mut ordered = body.to_vec();
        ordered.sort_by_key(|n| n.phase);

        for body_node in &ordered {
            let result = self.run_node_with_retry(body_node, &iteration_outputs, &iteration_artifacts).await.map_err(|e| KernelError::Permanent {
                message: format!("{loop_node_id}[{index}].{}: {e}", body_node.id),
            })?;
            iteration_outputs.insert(body_node.id.clone(), result);
        }

        Ok(Value::Object(iteration_outputs.into_iter().collect()))
    }

    /// Bounded plan-act-observe loop for an agentic node: each step asks the
    /// model for one action as strict JSON (`tool` to call something from
    /// `agent_tools`, or `finish` with an answer), executes it, and folds the
    /// observation into the next prompt. A non-JSON reply is treated as a
    /// final answer rather than a hard failure, mirroring how the
    /// microplanner degrades on an unparsable reflection reply.
    async fn run_agentic(&self, node: &WorkflowNode, goal: &str, agent_max_steps: u32, agent_tools: &[String], artifacts: &ArtifactStore) -> Result<Value> {
        let llm = self.llm.as_ref().ok_or_else(|| KernelError::Configuration {
            message: "agentic node requires an LlmCaller but none is configured".to_string(),
        })?;

        let system = format!(
            "Work step by step toward the goal, calling at most one tool per step from {agent_tools:?}. \
             Reply with strict JSON only: {{\"action\": \"tool\"|\"finish\", \"tool\": <name or null>, \
             \"args\": <object or null>, \"answer\": <string or null>}}."
        );
        let mut transcript = String::new();

        for step in 0..agent_max_steps {
            let prompt = format!("Goal: {goal}\nAllowed tools: {agent_tools:?}\nTranscript so far:\n{transcript}\nDecide step {step}.");
            let reply = llm.call(&prompt, Some(&system)).await?;

            let Some(decision) = serde_json::from_str::<AgenticStep>(reply.trim()).ok() else {
                return Ok(serde_json::json!({ "content": reply, "steps_taken": step + 1 }));
            };

            if decision.action == "finish" {
                let answer = decision.answer.unwrap_or(reply);
                return Ok(serde_json::json!({ "content": answer, "steps_taken": step + 1 }));
            }

            let Some(tool_name) = decision.tool else {
                transcript.push_str("observation: step requested a tool call without naming a tool\n");
                continue;
            };
            if !agent_tools.iter().any(|t| t == &tool_name) {
                transcript.push_str(&format!("observation: tool '{tool_name}' is not in the allowed list\n"));
                continue;
            }

            let args = decision.args.unwrap_or(Value::Null);
            match self.tool_caller.call_tool(&tool_name, args.clone()).await {
                Ok(observation) => {
                    artifacts.publish(node.id.clone(), format!("{tool_name}_step{step}"), observation.clone(), None);
                    transcript.push_str(&format!("action: {tool_name}({args})\nobservation: {observation}\n"));
                }
                Err(e) => {
                    transcript.push_str(&format!("action: {tool_name}({args})\nobservation: error: {e}\n"));
                }
            }
        }

        Ok(serde_json::json!({
            "content": Value::Null,
            "steps_taken": agent_max_steps,
            "error": "agent exhausted its step budget without finishing",
        }))
    }

    fn gather_inputs(&self, node: &WorkflowNode, outputs: &DashMap<String, Value>) -> Value {
        let mut map = serde_json::Map::new();
        for dep in &node.depends_on {
            if let Some(v) = outputs.get(dep) {
                map.insert(dep.clone(), v.clone());
            }
        }
        Value::Object(map)
    }
}

#[derive(Debug, Deserialize)]
struct AgenticStep {
    action: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    answer: Option<String>,
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;
    #[async_trait]
    impl ToolCaller for EchoTool {
        async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
            Ok(serde_json::json!({ "tool": name, "args": args }))
        }
    }

    struct NoopCode;
    #[async_trait]
    impl CodeRunner for NoopCode {
        async fn run_code(&self, _source: &str, context: &Value) -> Result<Value> {
            Ok(context.clone())
        }
    }

    fn make_executor() -> Executor {
        Executor::new(
            Arc::new(EchoTool),
            Arc::new(NoopCode),
            None,
            Arc::new(ExecutorConfig::default()),
            Arc::new(RetryConfig::default()),
        )
    }

    fn tool_node(id: &str, phase: u32, depends_on: &[&str]) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            phase,
            kind: NodeKind::Tool {
                name: "fetch".to_string(),
                args: Value::Null,
                input_mapping: HashMap::new(),
                output_artifact: None,
            },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            timeout_secs: None,
            retries: None,
        }
    }

    fn code_node(id: &str, phase: u32, depends_on: &[&str]) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            phase,
            kind: NodeKind::Code { source: "summarize".to_string(), input_mapping: HashMap::new(), output_artifact: None },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            timeout_secs: None,
            retries: None,
        }
    }

    #[tokio::test]
    async fn two_phase_workflow_runs_in_order() {
        let wf = Workflow { nodes: vec![tool_node("fetch", 0, &[]), code_node("summarize", 1, &["fetch"])] };

        let report = make_executor().run(wf).await.unwrap();
        assert!(report.outputs.contains_key("fetch"));
        assert!(report.outputs.contains_key("summarize"));
        assert_eq!(report.outputs["summarize"]["fetch"]["tool"], "fetch");
    }

    #[tokio::test]
    async fn invalid_workflow_is_rejected_before_running() {
        let wf = Workflow { nodes: vec![code_node("a", 0, &["ghost"])] };
        assert!(make_executor().run(wf).await.is_err());
    }

    #[tokio::test]
    async fn loop_over_non_array_fails_validation() {
        let outputs = DashMap::new();
        outputs.insert("items".to_string(), Value::String("not an array".to_string()));
        let artifacts = ArtifactStore::new();
        let node = WorkflowNode {
            id: "loop1".to_string(),
            phase: 0,
            kind: NodeKind::Loop {
                loop_over: "items".to_string(),
                loop_variable: "item".to_string(),
                loop_body: vec![],
                max_parallel: 1,
                output_artifact: None,
            },
            depends_on: vec![],
            timeout_secs: None,
            retries: None,
        };
        let executor = make_executor();
        let err = executor.run_loop(&node, "items", "item", &[], 1, None, &outputs, &artifacts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn loop_runs_body_once_per_item_with_variable_bound() {
        let outputs = DashMap::new();
        outputs.insert("tickers".to_string(), serde_json::json!(["AAPL", "MSFT"]));
        let artifacts = ArtifactStore::new();
        let body = vec![WorkflowNode {
            id: "echo".to_string(),
            phase: 0,
            kind: NodeKind::Code { source: "echo".to_string(), input_mapping: HashMap::new(), output_artifact: None },
            depends_on: vec!["ticker".to_string()],
            timeout_secs: None,
            retries: None,
        }];
        let node = WorkflowNode {
            id: "per_ticker".to_string(),
            phase: 0,
            kind: NodeKind::Loop {
                loop_over: "tickers".to_string(),
                loop_variable: "ticker".to_string(),
                loop_body: body.clone(),
                max_parallel: 2,
                output_artifact: None,
            },
            depends_on: vec![],
            timeout_secs: None,
            retries: None,
        };
        let executor = make_executor();
        let result = executor.run_loop(&node, "tickers", "ticker", &body, 2, None, &outputs, &artifacts).await.unwrap();
        let iterations = result["iterations"].as_array().unwrap();
        assert_eq!(iterations.len(), 2);
        assert_eq!(iterations[0]["echo"]["ticker"], "AAPL");
        assert_eq!(iterations[1]["echo"]["ticker"], "MSFT");
    }

    #[tokio::test]
    async fn missing_required_tool_argument_without_a_wireable_artifact_fails_precall() {
        struct SchemaTool;
        #[async_trait]
        impl ToolCaller for SchemaTool {
            async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
                Ok(serde_json::json!({ "tool": name, "args": args }))
            }
            fn input_schema(&self, _name: &str) -> Option<Value> {
                Some(serde_json::json!({ "required": ["ticker"], "properties": { "ticker": { "type": "string" } } }))
            }
        }

        let executor = Executor::new(
            Arc::new(SchemaTool),
            Arc::new(NoopCode),
            None,
            Arc::new(ExecutorConfig::default()),
            Arc::new(RetryConfig::default()),
        );
        let wf = Workflow {
            nodes: vec![WorkflowNode {
                id: "quote".to_string(),
                phase: 0,
                kind: NodeKind::Tool { name: "get_quote".to_string(), args: Value::Null, input_mapping: HashMap::new(), output_artifact: None },
                depends_on: vec![],
                timeout_secs: None,
                retries: None,
            }],
        };
        let report = executor.run(wf).await.unwrap();
        assert!(report.outputs["quote"]["error"].as_str().unwrap().contains("ticker"));
    }

    #[tokio::test]
    async fn switch_injects_chosen_branch_as_new_nodes() {
        let wf = Workflow {
            nodes: vec![
                WorkflowNode {
                    id: "check".to_string(),
                    phase: 0,
                    kind: NodeKind::Switch {
                        condition: "true".to_string(),
                        true_branch: vec![code_node("taken", 0, &[])],
                        false_branch: vec![code_node("not_taken", 0, &[])],
                    },
                    depends_on: vec![],
                    timeout_secs: None,
                    retries: None,
                },
            ],
        };
        let report = make_executor().run(wf).await.unwrap();
        assert!(report.outputs.contains_key("taken"));
        assert!(!report.outputs.contains_key("not_taken"));
    }
}
