use noetic_core::{wire_missing_args, ArtifactEntry};
use serde_json::{json, Value};

/// Mirrors the flow in `ToolRegistry::discover` + the auto-wiring used to
/// fill a tool call's missing arguments from prior step outputs, without
/// needing a live registry or subprocess.
#[test]
fn missing_required_args_are_filled_from_most_recent_matching_artifact() {
    let schema: Value = json!({
        "required": ["ticker", "period"],
        "properties": {
            "ticker": { "type": "string" },
            "period": { "type": "string" },
        }
    });

    let candidates = vec![
        ArtifactEntry { step_id: "s0".to_string(), name: "period".to_string(), value: json!("1mo"), type_hint: None },
        ArtifactEntry { step_id: "s1".to_string(), name: "stock_ticker".to_string(), value: json!("AAPL"), type_hint: None },
        ArtifactEntry { step_id: "s2".to_string(), name: "stock_ticker".to_string(), value: json!("MSFT"), type_hint: None },
    ];
    // Most-recent-first ordering, matching ArtifactStore::flatten's reversal.
    let most_recent_first: Vec<ArtifactEntry> = candidates.into_iter().rev().collect();

    let required = schema["required"].as_array().unwrap();
    let explicit: Value = json!({});
    let missing: Vec<String> = required
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .filter(|name| explicit.get(name).is_none())
        .collect();

    let wired = wire_missing_args(&missing, &schema["properties"], &most_recent_first, 0.6);

    assert_eq!(wired["ticker"].entry.step_id, "s2");
    assert_eq!(wired["period"].entry.step_id, "s0");
}
