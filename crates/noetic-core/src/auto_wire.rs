//! ABOUTME: Heuristic argument wiring: fills missing tool inputs from prior artifacts

use serde_json::Value;

use crate::artifacts::ArtifactEntry;

#[derive(Debug, Clone)]
pub struct WiringMatch {
    pub entry: ArtifactEntry,
    pub score: f64,
}

const PERFECT_MATCH: f64 = 1.3;

/// Fill `missing` argument names with the best-scoring candidate for each,
/// given the JSON schema `properties` object for the tool (used only for
/// its `type` fields, keyed by argument name). `accept_threshold` is
/// `ToolServersConfig::auto_wire_accept_threshold`.
///
/// `candidates` should already be ordered most-recent-first (`ArtifactStore::flatten`);
/// ties keep the first (most recent) candidate seen.
pub fn wire_missing_args(
    missing: &[String],
    properties: &Value,
    candidates: &[ArtifactEntry],
    accept_threshold: f64,
) -> std::collections::HashMap<String, WiringMatch> {
    let mut wired = std::collections::HashMap::new();
    for arg_name in missing {
        let arg_type = properties.get(arg_name).and_then(|p| p.get("type")).and_then(|t| t.as_str());
        if let Some(m) = find_best_match(arg_name, arg_type, candidates, accept_threshold) {
            wired.insert(arg_name.clone(), m);
        }
    }
    wired
}

fn find_best_match(
    arg_name: &str,
    arg_type: Option<&str>,
    candidates: &[ArtifactEntry],
    accept_threshold: f64,
) -> Option<WiringMatch> {
    let mut best: Option<WiringMatch> = None;

    for candidate in candidates {
        let mut score = 0.0;

        if candidate.name == arg_name {
            score += 1.0;
        } else if arg_name.contains(&candidate.name) || candidate.name.contains(arg_name) {
            score += 0.5;
        }

        if let Some(ty) = arg_type {
            if type_matches(&candidate.value, ty) {
                score += 0.3;
            } else {
                score -= 1.0;
            }
        }

        let better_than_current = best.as_ref().map(|b| score > b.score).unwrap_or(true);
        if score > accept_threshold && better_than_current {
            best = Some(WiringMatch { entry: candidate.clone(), score });
            if score >= PERFECT_MATCH {
                return best;
            }
        }
    }

    best
}

fn type_matches(value: &Value, schema_type: &str) -> bool {
    match schema_type {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, step: &str, value: Value) -> ArtifactEntry {
        ArtifactEntry { step_id: step.to_string(), name: name.to_string(), value, type_hint: None }
    }

    #[test]
    fn exact_name_and_type_match_wins_outright() {
        let candidates = vec![
            candidate("ticker", "s1", Value::String("AAPL".to_string())),
            candidate("stock_ticker", "s2", Value::String("MSFT".to_string())),
        ];
        let props = serde_json::json!({ "ticker": { "type": "string" } });
        let wired = wire_missing_args(&["ticker".to_string()], &props, &candidates, 0.6);
        let m = wired.get("ticker").unwrap();
        assert_eq!(m.entry.step_id, "s1");
        assert!((m.score - 1.3).abs() < 1e-9);
    }

    #[test]
    fn partial_name_match_with_correct_type_clears_threshold() {
        let candidates = vec![candidate("stock_ticker", "s1", Value::String("AAPL".to_string()))];
        let props = serde_json::json!({ "ticker": { "type": "string" } });
        let wired = wire_missing_args(&["ticker".to_string()], &props, &candidates, 0.6);
        assert!(wired.contains_key("ticker"));
    }

    #[test]
    fn type_mismatch_penalty_drops_below_threshold() {
        let candidates = vec![candidate("ticker", "s1", Value::Number(42.into()))];
        let props = serde_json::json!({ "ticker": { "type": "string" } });
        let wired = wire_missing_args(&["ticker".to_string()], &props, &candidates, 0.6);
        assert!(!wired.contains_key("ticker"));
    }

    #[test]
    fn no_candidate_leaves_arg_unwired() {
        let candidates: Vec<ArtifactEntry> = vec![];
        let props = serde_json::json!({});
        let wired = wire_missing_args(&["anything".to_string()], &props, &candidates, 0.6);
        assert!(wired.is_empty());
    }
}
