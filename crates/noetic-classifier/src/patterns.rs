//! ABOUTME: Fixed pattern table used by the classifier
//! ABOUTME: Lightweight substring matching, no ML required

use once_cell::sync::Lazy;
use regex::Regex;

pub const CASUAL_PATTERNS: &[&str] = &[
    "hello", "hi ", "hi!", "hey ", "hey!", "howdy", "greetings",
    "good morning", "good afternoon", "good evening", "good night",
    "bye", "goodbye", "see you", "take care", "later",
    "thank", "thanks", "thx", "appreciate",
    "ok", "okay", "got it", "understood", "sure", "alright",
    "how are you", "what's up", "how's it going", "nice to meet",
];

pub const UTILITY_PATTERNS: &[&str] = &[
    "translate", "in english", "in indonesian", "to english", "to indonesian",
    "how do you say",
    "summarize", "summary", "tldr", "tl;dr", "in brief", "briefly",
    "give me the gist", "key points", "main points",
    "format", "reformat", "convert to", "bullet points", "numbered list", "as a table",
    "explain", "what is", "what are", "define", "meaning of", "eli5", "simple terms",
];

pub const KNOWLEDGE_PATTERNS: &[&str] = &[
    "who is", "who was", "when was", "when did", "where is", "where was",
    "how many", "how much", "how old", "how long", "how far",
    "capital of", "population of", "founder of", "ceo of",
];

pub const RESEARCH_PATTERNS: &[&str] = &[
    "research", "analyze", "investigate", "deep dive", "comprehensive",
    "compare", "contrast", "evaluate", "assess", "review",
    "financial", "earnings", "revenue", "market", "stock",
    "statistics", "data on", "trends", "forecast", "predict",
    "sources", "evidence", "studies", "papers", "reports",
    "verify", "validate", "fact check", "cross-reference",
];

pub const UNSAFE_PATTERNS: &[&str] = &[
    "how to hack", "how to steal", "how to kill", "how to hurt",
    "illegal", "malware", "exploit", "bypass security",
    "social security", "credit card number", "ssn",
];

pub const SYSTEM_PATTERNS: &[&str] = &[
    "settings", "configure", "config", "preferences",
    "help", "commands", "what can you do",
    "clear history", "reset", "start over",
];

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap());

pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

pub fn is_casual(query_lower: &str) -> bool {
    if query_lower.len() <= 10 {
        for pattern in &CASUAL_PATTERNS[..10] {
            if query_lower.contains(pattern) {
                return true;
            }
        }
    }
    matches_any(query_lower, CASUAL_PATTERNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_url() {
        let urls = extract_urls("see https://example.com/a?b=1 for details");
        assert_eq!(urls, vec!["https://example.com/a?b=1".to_string()]);
    }

    #[test]
    fn short_greeting_is_casual() {
        assert!(is_casual("hi!"));
    }
}
