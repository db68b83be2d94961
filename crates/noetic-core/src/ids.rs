//! ABOUTME: Stable identifiers used across cells, nodes, batches and tasks

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier for a `KernelCell`. Cells are addressed by name, not by
/// a random id, so that parent/child references in log output stay legible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub String);

impl CellId {
    /// Derive a child id from a parent id and a role-qualified suffix.
    pub fn child_of(parent: &CellId, suffix: &str) -> Self {
        Self(format!("{}/{}", parent.0, suffix))
    }

    pub fn root(role: &str) -> Self {
        Self(format!("{role}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CellId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CellId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_id_is_namespaced_under_parent() {
        let parent = CellId::from("ceo-1");
        let child = CellId::child_of(&parent, "vp-research");
        assert_eq!(child.as_str(), "ceo-1/vp-research");
    }

    #[test]
    fn root_ids_are_unique() {
        let a = CellId::root("ceo");
        let b = CellId::root("ceo");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ceo-"));
    }
}
