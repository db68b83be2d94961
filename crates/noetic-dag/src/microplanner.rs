//! ABOUTME: Reactive planning hook: runs after every node completion and
//! ABOUTME: decides whether the remaining workflow still fits the goal

use std::collections::HashMap;
use std::sync::Arc;

use noetic_core::LlmCaller;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{NodeKind, WorkflowNode};

#[derive(Debug, Clone)]
pub enum PlannerDecision {
    Continue,
    Replan(Vec<WorkflowNode>),
    Expand(Vec<WorkflowNode>),
    Complete,
}

pub struct Microplanner {
    llm: Option<Arc<dyn LlmCaller>>,
    max_replans: u32,
}

impl Microplanner {
    pub fn new(llm: Option<Arc<dyn LlmCaller>>, max_replans: u32) -> Self {
        Self { llm, max_replans }
    }

    pub fn heuristic_only() -> Self {
        Self { llm: None, max_replans: 0 }
    }

    /// Called once per completed node. `remaining` is every node not yet
    /// started. Fast, deterministic checks run first and never consume a
    /// replan; only when those are inconclusive and an LLM is configured,
    /// and the per-workflow replan budget is not exhausted, is a bounded
    /// reflection call made.
    pub async fn decide(
        &self,
        completed: &WorkflowNode,
        result: &Value,
        remaining: &[WorkflowNode],
        replans_used: u32,
    ) -> PlannerDecision {
        if let Some(err) = result.get("error") {
            warn!(node = %completed.id, error = %err, "node reported an error, flagging for replan consideration");

            let survivors: Vec<WorkflowNode> =
                remaining.iter().filter(|n| !n.depends_on.contains(&completed.id)).cloned().collect();
            if survivors.len() != remaining.len() {
                info!(node = %completed.id, dropped = remaining.len() - survivors.len(), "dropping dependents of a failed node");
                return PlannerDecision::Replan(survivors);
            }

            if replans_used >= self.max_replans {
                debug!(node = %completed.id, "replan budget exhausted, continuing with original plan");
                return PlannerDecision::Continue;
            }
            if let Some(llm) = &self.llm {
                return self.reflect(completed, result, remaining, llm).await;
            }
            return PlannerDecision::Continue;
        }

        if is_data_fetch(completed) && !is_web_search(completed) && result_is_thin(result) {
            info!(node = %completed.id, "data-fetch node returned a thin result, expanding with a fallback search");
            return PlannerDecision::Expand(vec![fallback_search_node(completed)]);
        }

        if remaining.is_empty() {
            return PlannerDecision::Complete;
        }

        PlannerDecision::Continue
    }

    async fn reflect(
        &self,
        completed: &WorkflowNode,
        result: &Value,
        remaining: &[WorkflowNode],
        llm: &Arc<dyn LlmCaller>,
    ) -> PlannerDecision {
        let prompt = format!(
            "Node '{}' produced: {}. Remaining plan has {} steps. Reply CONTINUE, COMPLETE, or EXPAND.",
            completed.id,
            result,
            remaining.len()
        );
        match llm.call(&prompt, Some("You are a workflow reflection step.")).await {
            Ok(reply) => {
                let upper = reply.to_uppercase();
                if upper.contains("COMPLETE") {
                    PlannerDecision::Complete
                } else {
                    PlannerDecision::Continue
                }
            }
            Err(e) => {
                warn!(error = %e, "microplanner reflection call failed, continuing with original plan");
                PlannerDecision::Continue
            }
        }
    }
}

fn is_data_fetch(node: &WorkflowNode) -> bool {
    matches!(&node.kind, NodeKind::Tool { .. })
}

fn is_web_search(node: &WorkflowNode) -> bool {
    matches!(&node.kind, NodeKind::Tool { name, .. } if name == "web_search")
}

const MIN_MEANINGFUL_TEXT_LEN: usize = 8;
const ERROR_MARKERS: [&str; 5] = ["no results", "not found", "error", "failed", "empty"];

fn result_is_thin(result: &Value) -> bool {
    match result {
        Value::Null => true,
        Value::String(s) => text_is_thin(s),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) if o.is_empty() => true,
        Value::Object(o) if o.contains_key("error") => true,
        Value::Object(o) => o.values().all(field_is_thin),
        _ => false,
    }
}

fn field_is_thin(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => text_is_thin(s),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn text_is_thin(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.len() < MIN_MEANINGFUL_TEXT_LEN {
        return true;
    }
    let lower = trimmed.to_lowercase();
    ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Builds a one-off `web_search` fallback node depending on the failed
/// data-fetch node, reusing whatever query-shaped argument it was called
/// with.
fn fallback_search_node(completed: &WorkflowNode) -> WorkflowNode {
    let query = match &completed.kind {
        NodeKind::Tool { args, .. } => {
            args.get("query").or_else(|| args.get("q")).cloned().unwrap_or_else(|| Value::String(completed.id.clone()))
        }
        _ => Value::String(completed.id.clone()),
    };

    WorkflowNode {
        id: format!("{}-fallback-search", completed.id),
        phase: completed.phase + 1,
        kind: NodeKind::Tool {
            name: "web_search".to_string(),
            args: serde_json::json!({ "query": query }),
            input_mapping: HashMap::new(),
            output_artifact: None,
        },
        depends_on: vec![completed.id.clone()],
        timeout_secs: None,
        retries: None,
    }
}
