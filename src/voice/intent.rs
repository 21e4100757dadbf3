//! Intent classification
//!
//! Ordered keyword rules over the lowercased transcription. The first rule
//! whose keyword appears as a whole word (or whole phrase) wins; no hit
//! yields [`DEFAULT_INTENT`].

use serde::{Deserialize, Serialize};

/// Intent reported when no rule matches
pub const DEFAULT_INTENT: &str = "none";

/// A single keyword rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRule {
    /// Word or phrase to look for
    pub keyword: String,
    /// Intent name reported on match
    pub intent: String,
    /// Whether a match triggers the downstream notification
    #[serde(default)]
    pub notify: bool,
}

impl IntentRule {
    pub fn new(keyword: impl Into<String>, intent: impl Into<String>, notify: bool) -> Self {
        Self {
            keyword: keyword.into(),
            intent: intent.into(),
            notify,
        }
    }
}

/// Built-in rule set used when the configuration names none
pub fn default_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new("cancel", "cancel", false),
        IntentRule::new("book", "book_service", true),
        IntentRule::new("appointment", "book_service", true),
        IntentRule::new("call back", "callback", true),
        IntentRule::new("yes", "confirm", false),
        IntentRule::new("no", "decline", false),
    ]
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub name: String,
    pub notify: bool,
}

impl Intent {
    fn fallback() -> Self {
        Self {
            name: DEFAULT_INTENT.to_string(),
            notify: false,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_INTENT
    }
}

/// Ordered first-match keyword classifier
#[derive(Debug, Clone)]
pub struct IntentMatcher {
    rules: Vec<(String, IntentRule)>,
}

impl Default for IntentMatcher {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl IntentMatcher {
    /// Build a matcher; rule order is match priority. Rules with an empty
    /// keyword are dropped.
    pub fn new(rules: Vec<IntentRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let needle = normalize(&rule.keyword);
                (!needle.trim().is_empty()).then_some((needle, rule))
            })
            .collect();
        Self { rules }
    }

    /// Classify a transcription
    pub fn classify(&self, text: &str) -> Intent {
        let haystack = normalize(text);
        self.rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, rule)| Intent {
                name: rule.intent.clone(),
                notify: rule.notify,
            })
            .unwrap_or_else(Intent::fallback)
    }

    /// Keywords in priority order, used as speech recognition hints
    pub fn keywords(&self) -> Vec<&str> {
        self.rules.iter().map(|(_, rule)| rule.keyword.as_str()).collect()
    }
}

/// Lowercase, collapse everything that is not alphanumeric into single
/// spaces, and pad both ends so `contains(" word ")` is a whole-word test.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(word);
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let matcher = IntentMatcher::default();
        let intent = matcher.classify("Please cancel, I do not want to book");
        assert_eq!(intent.name, "cancel");
        assert!(!intent.notify);
    }

    #[test]
    fn test_book_requires_notification() {
        let matcher = IntentMatcher::default();
        let intent = matcher.classify("Book");
        assert_eq!(intent.name, "book_service");
        assert!(intent.notify);
    }

    #[test]
    fn test_whole_word_only() {
        let matcher = IntentMatcher::default();
        // "booking" is not "book"; "know" is not "no"
        let intent = matcher.classify("I don't know about the booking");
        assert!(intent.is_default());
    }

    #[test]
    fn test_phrase_keyword() {
        let matcher = IntentMatcher::default();
        assert_eq!(matcher.classify("Could you call back later?").name, "callback");
        assert!(matcher.classify("callback").is_default());
    }

    #[test]
    fn test_no_match_is_default() {
        let matcher = IntentMatcher::default();
        let intent = matcher.classify("the weather is nice");
        assert_eq!(intent.name, DEFAULT_INTENT);
        assert!(!intent.notify);
        assert!(matcher.classify("").is_default());
    }

    #[test]
    fn test_custom_rules_and_empty_keywords() {
        let matcher = IntentMatcher::new(vec![
            IntentRule::new("", "ignored", true),
            IntentRule::new("Tow Truck", "tow", true),
        ]);
        assert_eq!(matcher.classify("send a tow-truck please").name, "tow");
        assert_eq!(matcher.keywords(), vec!["Tow Truck"]);
    }

    #[test]
    fn test_rule_deserialize_defaults_notify() {
        let rule: IntentRule =
            serde_json::from_str(r#"{"keyword": "repair", "intent": "repair"}"#).unwrap();
        assert!(!rule.notify);
    }
}
