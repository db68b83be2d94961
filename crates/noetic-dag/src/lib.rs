//! ABOUTME: Workflow DAG types, phase-barrier executor, and the reactive microplanner

pub mod collaborators;
pub mod executor;
pub mod microplanner;
pub mod types;

pub use collaborators::{CodeRunner, ToolCaller};
pub use executor::{ExecutionReport, Executor};
pub use microplanner::{Microplanner, PlannerDecision};
pub use types::{DagError, MergeStrategy, NodeKind, Workflow, WorkflowNode};
