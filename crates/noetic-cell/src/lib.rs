//! ABOUTME: Recursive KernelCell executor: role ladder, budget governance,
//! ABOUTME: artifact store, and the planner/DAG-runner seam a host wires in

pub mod budget;
pub mod cell;
pub mod governance;
pub mod planner;
pub mod role;
pub mod state;

pub use budget::Budget;
pub use noetic_core::{ArtifactEntry, ArtifactStore};
pub use cell::{CellDeps, KernelCell};
pub use planner::{BlueprintStep, DagRunner, DelegationSpec, PlanOutcome, Planner, Synthesizer};
pub use role::Role;
pub use state::CellState;
