//! ABOUTME: Artifact store keyed by producing step, scanned most-recent-first
//! ABOUTME: by the auto-wirer when filling a tool call's missing arguments

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub step_id: String,
    pub name: String,
    pub value: Value,
    pub type_hint: Option<String>,
}

/// Artifacts published by completed steps (DAG nodes, child-cell
/// `WorkPackage`s, ...), available for the auto-wirer to scan when filling
/// missing tool arguments. Entries are appended in publication order and
/// `flatten()` returns them reversed so the most recently published
/// artifact is scanned first — a fresher artifact should win over a stale
/// one with the same name.
#[derive(Default)]
pub struct ArtifactStore {
    entries: RwLock<Vec<ArtifactEntry>>,
    by_step: RwLock<HashMap<String, Vec<usize>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, step_id: impl Into<String>, name: impl Into<String>, value: Value, type_hint: Option<String>) {
        let step_id = step_id.into();
        let entry = ArtifactEntry { step_id: step_id.clone(), name: name.into(), value, type_hint };
        let mut entries = self.entries.write();
        let idx = entries.len();
        entries.push(entry);
        self.by_step.write().entry(step_id).or_default().push(idx);
    }

    /// All artifacts, most recently published first.
    pub fn flatten(&self) -> Vec<ArtifactEntry> {
        let mut entries = self.entries.read().clone();
        entries.reverse();
        entries
    }

    pub fn for_step(&self, step_id: &str) -> Vec<ArtifactEntry> {
        let entries = self.entries.read();
        self.by_step
            .read()
            .get(step_id)
            .map(|idxs| idxs.iter().rev().map(|&i| entries[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_returns_most_recent_first() {
        let store = ArtifactStore::new();
        store.publish("step1", "ticker", serde_json::json!("AAPL"), Some("string".into()));
        store.publish("step2", "ticker", serde_json::json!("MSFT"), Some("string".into()));

        let flat = store.flatten();
        assert_eq!(flat[0].value, serde_json::json!("MSFT"));
        assert_eq!(flat[1].value, serde_json::json!("AAPL"));
    }

    #[test]
    fn for_step_scopes_to_one_producer() {
        let store = ArtifactStore::new();
        store.publish("step1", "a", serde_json::json!(1), None);
        store.publish("step2", "b", serde_json::json!(2), None);
        let step1 = store.for_step("step1");
        assert_eq!(step1.len(), 1);
        assert_eq!(step1[0].name, "a");
    }
}
