//! ABOUTME: KernelCell lifecycle state machine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Created,
    Planning,
    Delegating,
    Waiting,
    Synthesizing,
    Done,
    Failed,
    Cancelled,
}

impl CellState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CellState::Done | CellState::Failed | CellState::Cancelled)
    }
}

/// Valid forward transitions. Cells never move backward; a failure or
/// cancellation from any non-terminal state jumps straight to its
/// terminal counterpart rather than rejecting the transition, so callers
/// always route failures through `fail()`/`cancel()` rather than this
/// table.
pub fn can_transition(from: CellState, to: CellState) -> bool {
    use CellState::*;
    matches!(
        (from, to),
        (Created, Planning)
            | (Planning, Delegating)
            | (Planning, Synthesizing)
            | (Delegating, Waiting)
            | (Waiting, Synthesizing)
            | (Synthesizing, Done)
    ) || to.is_terminal()
}
