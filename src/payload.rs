//! Filter-update document carried in an event's `content`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One rule set (`cosmetic`, `network` or `scripts`).
///
/// Rules are opaque to this crate; applying them is the consumer's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosmetic: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<RuleSet>,
}

/// Producer-reported rule counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosmetic_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_count: Option<u64>,
}

/// Producer wall clock: Unix seconds or an ISO-8601 string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Timestamp {
    Unix(u64),
    Text(String),
}

/// Parsed filter-update document.
///
/// Rule sets live under `filters`, or at the top level in documents written
/// by the analyzer:
///
/// ```json
/// {
///   "version": "1.0.1",
///   "timestamp": 1700000000,
///   "source": "adablock-agent",
///   "filters": { "cosmetic": { "rules": [] }, "network": { "rules": [] } },
///   "stats": { "cosmetic_count": 0 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosmetic: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// Unrecognized top-level fields, kept for the consumer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Actual number of rules per set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleCounts {
    pub cosmetic: usize,
    pub network: usize,
    pub scripts: usize,
}

impl FilterDocument {
    /// Parse an event's `content` string.
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Cosmetic rules, from `filters` when present there.
    pub fn cosmetic_rules(&self) -> Option<&RuleSet> {
        self.filters.cosmetic.as_ref().or(self.cosmetic.as_ref())
    }

    pub fn network_rules(&self) -> Option<&RuleSet> {
        self.filters.network.as_ref().or(self.network.as_ref())
    }

    pub fn script_rules(&self) -> Option<&RuleSet> {
        self.filters.scripts.as_ref().or(self.scripts.as_ref())
    }

    pub fn rule_counts(&self) -> RuleCounts {
        let count = |set: Option<&RuleSet>| set.map_or(0, |s| s.rules.len());
        RuleCounts {
            cosmetic: count(self.cosmetic_rules()),
            network: count(self.network_rules()),
            scripts: count(self.script_rules()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_document() {
        let doc = FilterDocument::parse(r#"{"version":"1.0.1"}"#).unwrap();
        assert_eq!(doc.version, "1.0.1");
        assert_eq!(doc.rule_counts(), RuleCounts::default());
        assert!(doc.stats.is_none());
    }

    #[test]
    fn parses_full_document_and_keeps_unknown_fields() {
        let content = json!({
            "version": "2.0.0",
            "timestamp": 1700000000u64,
            "source": "adablock-agent",
            "filters": {
                "cosmetic": {"rules": [{"selector": ".ad"}, {"selector": "#promo"}]},
                "network": {"rules": [{"pattern": "pagead"}], "updated": "today"},
                "scripts": {"rules": []}
            },
            "stats": {"cosmetic_count": 2, "network_count": 1, "script_count": 0},
            "channel": "beta"
        })
        .to_string();
        let doc = FilterDocument::parse(&content).unwrap();
        assert_eq!(doc.source.as_deref(), Some("adablock-agent"));
        assert_eq!(
            doc.rule_counts(),
            RuleCounts {
                cosmetic: 2,
                network: 1,
                scripts: 0
            }
        );
        assert_eq!(doc.extra["channel"], "beta");
        let network = doc.filters.network.as_ref().unwrap();
        assert_eq!(network.extra["updated"], "today");
        assert_eq!(doc.stats.unwrap().cosmetic_count, Some(2));
    }

    #[test]
    fn parses_analyzer_document_with_top_level_rules() {
        let content = json!({
            "version": "1.0.4",
            "timestamp": "2026-10-19T12:00:00+00:00",
            "generated_by": "adablock-analyzer",
            "cosmetic": {
                "name": "YouTube Cosmetic Filters",
                "version": "1.0.4",
                "rules": [{"selector": ".ytp-ad-overlay"}, {"selector": "#masthead-ad"}]
            },
            "network": {"name": "YouTube Network Filters", "rules": [{"pattern": "doubleclick"}]},
            "scripts": {"rules": []}
        })
        .to_string();
        let doc = FilterDocument::parse(&content).unwrap();
        assert_eq!(
            doc.timestamp,
            Some(Timestamp::Text("2026-10-19T12:00:00+00:00".into()))
        );
        assert_eq!(
            doc.rule_counts(),
            RuleCounts {
                cosmetic: 2,
                network: 1,
                scripts: 0
            }
        );
        assert_eq!(doc.cosmetic_rules().unwrap().extra["name"], "YouTube Cosmetic Filters");
        assert_eq!(doc.extra["generated_by"], "adablock-analyzer");
        assert!(!doc.extra.contains_key("cosmetic"));
    }

    #[test]
    fn nested_filters_take_precedence() {
        let content = json!({
            "version": "1",
            "timestamp": 1700000000u64,
            "filters": {"cosmetic": {"rules": [1]}},
            "cosmetic": {"rules": [1, 2, 3]}
        })
        .to_string();
        let doc = FilterDocument::parse(&content).unwrap();
        assert_eq!(doc.timestamp, Some(Timestamp::Unix(1700000000)));
        assert_eq!(doc.rule_counts().cosmetic, 1);
    }

    #[test]
    fn rejects_invalid_documents() {
        assert!(FilterDocument::parse("not json").is_err());
        assert!(FilterDocument::parse("[1,2]").is_err());
        assert!(FilterDocument::parse(r#"{"filters":{}}"#).is_err());
        assert!(FilterDocument::parse(r#"{"version":3}"#).is_err());
        assert!(FilterDocument::parse(r#"{"version":"1","timestamp":true}"#).is_err());
    }
}
