use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// How a pattern is compared against an action name.
///
/// `Exact` exists so that a short pattern like "cta" cannot accidentally
/// match an unrelated longer action name containing that substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Substring,
    Exact,
}

/// One advertiser's classification rule set, loaded from configuration.
///
/// An empty pattern list is a business decision ("no contact conversions for
/// this advertiser"), not a configuration error.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub contact_patterns: Vec<String>,
    #[serde(default)]
    pub directions_patterns: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    /// When true, a row stops at the first bucket it matches (contact wins).
    #[serde(default)]
    pub mutually_exclusive: bool,
    /// Free-text annotation for the business owner; never interpreted.
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    default: RuleSet,
    #[serde(default)]
    advertisers: HashMap<String, RuleSet>,
}

/// All classification rule sets, loaded once at startup and shared read-only
/// across concurrent account pipelines.
#[derive(Debug, Clone)]
pub struct RuleBook {
    default: RuleSet,
    advertisers: HashMap<String, RuleSet>,
}

/// Normalizes an action name or pattern for comparison: lower-case, trim,
/// collapse non-breaking spaces, and unify en/em dashes.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .replace('\u{a0}', " ")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .trim()
        .to_string()
}

impl RuleBook {
    /// Loads the rule file from disk. Patterns are normalized once here so
    /// the per-row hot path only normalizes the action name.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read rule file {}: {}", path.display(), e))?;
        let file: RuleFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid rule file {}: {}", path.display(), e))?;

        let book = Self {
            default: normalize_set(file.default),
            advertisers: file
                .advertisers
                .into_iter()
                .map(|(id, set)| (id, normalize_set(set)))
                .collect(),
        };

        tracing::info!(
            "Rule book loaded: {} advertiser overrides + default set",
            book.advertisers.len()
        );
        Ok(book)
    }

    /// Builds a rule book directly from parts (used by tests).
    pub fn from_parts(default: RuleSet, advertisers: HashMap<String, RuleSet>) -> Self {
        Self {
            default: normalize_set(default),
            advertisers: advertisers
                .into_iter()
                .map(|(id, set)| (id, normalize_set(set)))
                .collect(),
        }
    }

    /// Rule lookup with hard override: an advertiser's set is used
    /// exclusively when present, otherwise the default set. Never a union.
    pub fn rule_for(&self, advertiser_id: &str) -> &RuleSet {
        self.advertisers.get(advertiser_id).unwrap_or(&self.default)
    }

    /// Whether an advertiser has its own override set.
    pub fn has_override(&self, advertiser_id: &str) -> bool {
        self.advertisers.contains_key(advertiser_id)
    }

    /// Advertiser ids carrying override rule sets, sorted for stable output.
    pub fn advertiser_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.advertisers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

fn normalize_set(mut set: RuleSet) -> RuleSet {
    set.contact_patterns = set.contact_patterns.iter().map(|p| normalize(p)).collect();
    set.directions_patterns = set
        .directions_patterns
        .iter()
        .map(|p| normalize(p))
        .collect();
    set
}
