//! ABOUTME: Workflow node and blueprint types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Flatten array-valued inputs and append scalar ones, in `merge_inputs` order.
    #[default]
    Concat,
    /// Keyed by the producing node id.
    Dict,
    /// The first `merge_inputs` entry that resolved to a value.
    First,
    /// Delegates to the configured `CodeRunner` with all inputs as context.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Tool {
        name: String,
        args: Value,
        /// Argument name -> artifact reference (a node id, optionally
        /// followed by dotted field lookups, e.g. `download.path`),
        /// resolved against prior outputs before dispatch and merged over
        /// `args`. Still-missing required arguments are then auto-wired
        /// from the artifact store; any left over fail the node pre-call.
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        /// Name under which this node's result is published to the
        /// artifact store, in addition to its node id.
        #[serde(default)]
        output_artifact: Option<String>,
    },
    Code {
        source: String,
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        #[serde(default)]
        output_artifact: Option<String>,
    },
    Llm {
        prompt: String,
        #[serde(default)]
        system: Option<String>,
    },
    Switch {
        /// An artifact reference resolved and tested for truthiness, or
        /// the literal `"true"`/`"false"`.
        condition: String,
        #[serde(default)]
        true_branch: Vec<WorkflowNode>,
        #[serde(default)]
        false_branch: Vec<WorkflowNode>,
    },
    Loop {
        /// Artifact reference that must resolve to a JSON array.
        loop_over: String,
        /// Name each iteration's item is published under for its body to consume.
        loop_variable: String,
        loop_body: Vec<WorkflowNode>,
        #[serde(default = "default_max_parallel")]
        max_parallel: usize,
        #[serde(default)]
        output_artifact: Option<String>,
    },
    Merge {
        merge_inputs: Vec<String>,
        #[serde(default)]
        merge_strategy: MergeStrategy,
    },
    Agentic {
        goal: String,
        #[serde(default = "default_agent_max_steps")]
        agent_max_steps: u32,
        /// Allow-list of tool names the inner loop may call; empty means
        /// the node can only plan and finish, never call a tool.
        #[serde(default)]
        agent_tools: Vec<String>,
    },
}

fn default_max_parallel() -> usize {
    1
}

fn default_agent_max_steps() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    /// Nodes in the same phase run concurrently; phase N waits for every
    /// node in phase N-1 to finish before starting.
    pub phase: u32,
    pub kind: NodeKind,
    /// Extra edges beyond the phase barrier. Each must name a node in an
    /// earlier phase; see `Workflow::validate`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Workflow {
    pub nodes: Vec<WorkflowNode>,
}

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("workflow validation failed: {0}")]
    Validation(String),
    #[error("node {0} timed out")]
    Timeout(String),
    #[error("node {0} failed: {1}")]
    NodeFailed(String, String),
}

impl Workflow {
    pub fn nodes_in_phase(&self, phase: u32) -> Vec<&WorkflowNode> {
        self.nodes.iter().filter(|n| n.phase == phase).collect()
    }

    pub fn max_phase(&self) -> u32 {
        self.nodes.iter().map(|n| n.phase).max().unwrap_or(0)
    }

    /// Every `depends_on` edge must point at a node declared in a strictly
    /// earlier phase; a same-phase or forward edge is a validation error
    /// rather than something the executor tries to resolve at runtime.
    pub fn validate(&self) -> Result<(), DagError> {
        let phase_of: HashMap<&str, u32> = self.nodes.iter().map(|n| (n.id.as_str(), n.phase)).collect();
        for node in &self.nodes {
            for dep in &node.depends_on {
                match phase_of.get(dep.as_str()) {
                    None => {
                        return Err(DagError::Validation(format!(
                            "node {} depends on unknown node {}",
                            node.id, dep
                        )))
                    }
                    Some(&dep_phase) if dep_phase >= node.phase => {
                        return Err(DagError::Validation(format!(
                            "node {} (phase {}) cannot depend on node {} (phase {})",
                            node.id, node.phase, dep, dep_phase
                        )))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
