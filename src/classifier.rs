use crate::models::ConversionRow;
use crate::rules::{normalize, MatchMode, RuleSet};

/// Which business bucket(s) a single conversion row landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Contact,
    Directions,
    /// Matched both pattern lists; only possible for rule sets that do not
    /// enforce mutual exclusivity.
    Both,
    None,
}

/// Totals of one classification pass over an account's conversion rows.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub contact_total: f64,
    pub directions_total: f64,
    /// Action names that matched neither list, kept for auditing.
    pub unmatched: Vec<String>,
    /// Rows dropped because their action name was empty.
    pub skipped: usize,
}

/// Where one row landed, plus the first pattern that put it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub bucket: Bucket,
    pub matched_pattern: Option<String>,
}

// First pattern that matches, in list order.
fn first_match<'a>(name: &str, patterns: &'a [String], mode: MatchMode) -> Option<&'a String> {
    match mode {
        MatchMode::Substring => patterns.iter().find(|p| name.contains(p.as_str())),
        MatchMode::Exact => patterns.iter().find(|p| name == p.as_str()),
    }
}

/// Classifies one action name against a rule set.
///
/// Contact is always evaluated before directions; when the set is mutually
/// exclusive a contact match suppresses the directions check entirely.
pub fn classify(action_name: &str, rules: &RuleSet) -> ClassificationResult {
    let name = normalize(action_name);

    let contact = first_match(&name, &rules.contact_patterns, rules.match_mode);
    if let Some(pattern) = contact {
        if rules.mutually_exclusive {
            return ClassificationResult {
                bucket: Bucket::Contact,
                matched_pattern: Some(pattern.clone()),
            };
        }
    }
    let directions = first_match(&name, &rules.directions_patterns, rules.match_mode);

    let (bucket, pattern) = match (contact, directions) {
        (Some(c), Some(_)) => (Bucket::Both, Some(c)),
        (Some(c), None) => (Bucket::Contact, Some(c)),
        (None, Some(d)) => (Bucket::Directions, Some(d)),
        (None, None) => (Bucket::None, None),
    };
    ClassificationResult {
        bucket,
        matched_pattern: pattern.cloned(),
    }
}

/// Bucket-only shorthand for callers that do not need the matched pattern.
pub fn classify_action(action_name: &str, rules: &RuleSet) -> Bucket {
    classify(action_name, rules).bucket
}

/// Single pass over an account's conversion rows: resolves each row's value,
/// routes it to bucket totals, and records unmatched action names.
pub fn classify_rows(rows: &[ConversionRow], rules: &RuleSet) -> Classification {
    let mut out = Classification::default();

    for row in rows {
        if row.action_name.trim().is_empty() {
            out.skipped += 1;
            continue;
        }
        let value = row.resolved_value();
        match classify_action(&row.action_name, rules) {
            Bucket::Contact => out.contact_total += value,
            Bucket::Directions => out.directions_total += value,
            Bucket::Both => {
                out.contact_total += value;
                out.directions_total += value;
            }
            Bucket::None => out.unmatched.push(row.action_name.clone()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substring_set() -> RuleSet {
        RuleSet {
            contact_patterns: vec!["appels".into(), "cta".into()],
            directions_patterns: vec!["itinéraires".into()],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        }
    }

    fn row(name: &str, raw: f64, exact: Option<f64>) -> ConversionRow {
        ConversionRow {
            action_name: name.to_string(),
            action_id: "1".to_string(),
            raw_value: raw,
            exact_value: exact,
        }
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let rules = substring_set();
        assert_eq!(classify_action("Appels directs", &rules), Bucket::Contact);
        assert_eq!(classify_action("Itinéraires magasin", &rules), Bucket::Directions);
    }

    #[test]
    fn result_reports_first_matching_pattern() {
        let rules = RuleSet {
            contact_patterns: vec!["cta".into(), "appel (cta)".into()],
            directions_patterns: vec![],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        };
        // "appel (cta)" also matches, but "cta" comes first in list order.
        let result = classify("Appel (CTA)", &rules);
        assert_eq!(result.bucket, Bucket::Contact);
        assert_eq!(result.matched_pattern.as_deref(), Some("cta"));
    }

    #[test]
    fn exact_mode_rejects_longer_names() {
        let rules = RuleSet {
            match_mode: MatchMode::Exact,
            ..substring_set()
        };
        // "cta" must not match a longer name containing it.
        assert_eq!(classify_action("[TARMAAC] Click CTA", &rules), Bucket::None);
        assert_eq!(classify_action("CTA", &rules), Bucket::Contact);
    }

    #[test]
    fn mutual_exclusivity_stops_at_contact() {
        let rules = RuleSet {
            contact_patterns: vec!["appels".into()],
            directions_patterns: vec!["appels magasin".into()],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        };
        assert_eq!(classify_action("Appels magasin", &rules), Bucket::Contact);
    }

    #[test]
    fn non_exclusive_set_can_hit_both() {
        let rules = RuleSet {
            contact_patterns: vec!["appels".into()],
            directions_patterns: vec!["appels magasin".into()],
            match_mode: MatchMode::Substring,
            mutually_exclusive: false,
            notes: None,
        };
        assert_eq!(classify_action("Appels magasin", &rules), Bucket::Both);
    }

    #[test]
    fn pass_totals_use_resolved_values() {
        let rules = substring_set();
        let rows = vec![
            row("Appels", 2.0, None),
            row("CTA", 0.0, Some(1.0)),
            row("Itinéraires", 4.0, Some(0.0)),
            row("Newsletter signup", 9.0, None),
            row("   ", 3.0, None),
        ];
        let result = classify_rows(&rows, &rules);
        assert_eq!(result.contact_total, 3.0);
        assert_eq!(result.directions_total, 4.0);
        assert_eq!(result.unmatched, vec!["Newsletter signup".to_string()]);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn empty_contact_list_matches_nothing() {
        let rules = RuleSet {
            contact_patterns: vec![],
            directions_patterns: vec!["itinéraires".into()],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        };
        assert_eq!(classify_action("Appels", &rules), Bucket::None);
        assert_eq!(classify_action("Itinéraires", &rules), Bucket::Directions);
    }
}
