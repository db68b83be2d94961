//! ABOUTME: Prompt-injection and oversized-input pre-pass, run before classification proper

const RISKY_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "system override",
    "you are now",
    "developer mode",
    "do anything now",
    "forget all instructions",
];

const MAX_INPUT_LEN: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailFinding {
    pub description: String,
}

/// Scan for prompt-injection phrases and oversized input. An empty result
/// means the text passed the pre-pass; callers treat the text as safe to
/// proceed with ordinary classification.
pub fn check_prompt_injection(text: &str) -> Vec<GuardrailFinding> {
    let lower = text.to_lowercase();
    let mut findings = Vec::new();

    for phrase in RISKY_PHRASES {
        if lower.contains(phrase) {
            findings.push(GuardrailFinding {
                description: format!("prompt_injection_risk:{phrase}"),
            });
        }
    }

    if text.len() > MAX_INPUT_LEN {
        findings.push(GuardrailFinding {
            description: "input_too_long".to_string(),
        });
    }

    findings
}
