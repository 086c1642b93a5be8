/// Classification tests against the shipped rule file
/// Exercises the real advertiser rule sets end to end, including overrides
use rust_ads_report::classifier::{classify_action, classify_rows, Bucket};
use rust_ads_report::models::ConversionRow;
use rust_ads_report::rules::{MatchMode, RuleBook, RuleSet};
use std::collections::HashMap;

fn load_book() -> RuleBook {
    RuleBook::load("config/classification_rules.json").expect("rule file should load")
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
fn default_set_routes_common_actions() {
    let book = load_book();
    let rules = book.rule_for("0000000000");

    assert_eq!(classify_action("Appels", rules), Bucket::Contact);
    assert_eq!(classify_action("Clicks to call", rules), Bucket::Contact);
    assert_eq!(classify_action("Itinéraires magasin", rules), Bucket::Directions);
    assert_eq!(
        classify_action("Local actions - Directions", rules),
        Bucket::Directions
    );
    assert_eq!(classify_action("Achat en ligne", rules), Bucket::None);
}

#[test]
fn default_set_is_mutually_exclusive() {
    let book = load_book();
    let rules = book.rule_for("0000000000");
    // Contains both a contact pattern ("call") and a directions pattern
    // ("directions"); contact must win, never Both.
    assert_eq!(
        classify_action("Call after directions", rules),
        Bucket::Contact
    );
}

#[test]
fn exact_override_ignores_decorated_action_names() {
    let book = load_book();
    // France Literie Antibes runs in exact mode.
    let rules = book.rule_for("2485486745");
    assert_eq!(rules.match_mode, MatchMode::Exact);

    assert_eq!(classify_action("CTA", rules), Bucket::Contact);
    assert_eq!(classify_action("[TARMAAC] Click CTA", rules), Bucket::None);
}

#[test]
fn override_totals_with_value_resolution() {
    let book = load_book();
    let rules = book.rule_for("2485486745");

    let rows = vec![
        row("Appels", 2.0, None),
        row("CTA", 1.0, None),
        row("Itinéraires", 4.0, Some(0.0)),
        row("[TARMAAC] Click CTA", 9.0, None),
    ];
    let result = classify_rows(&rows, rules);
    assert_eq!(result.contact_total, 3.0);
    assert_eq!(result.directions_total, 4.0);
    assert_eq!(result.unmatched, vec!["[TARMAAC] Click CTA".to_string()]);
}

#[test]
fn whatsapp_only_advertiser() {
    let book = load_book();
    // Laserel Auxerre counts only WhatsApp contacts and has no directions.
    let rules = book.rule_for("3345723560");
    assert_eq!(classify_action("Click WhatsApp", rules), Bucket::Contact);
    assert_eq!(classify_action("Appels", rules), Bucket::None);
    assert_eq!(classify_action("Itinéraires", rules), Bucket::None);
}

#[test]
fn empty_contact_list_is_respected() {
    let book = load_book();
    // Cuisine Plus Perpignan tracks directions only.
    let rules = book.rule_for("9360801546");
    assert!(rules.contact_patterns.is_empty());
    assert_eq!(classify_action("Appels", rules), Bucket::None);
    assert_eq!(classify_action("Itinéraires", rules), Bucket::Directions);
}

#[test]
fn dash_variants_normalize_before_matching() {
    let book = load_book();
    // Univers Construction's directions patterns carry an en dash variant.
    let rules = book.rule_for("5509129108");
    assert_eq!(
        classify_action("Actions locales \u{2013} Itinéraire", rules),
        Bucket::Directions
    );
    assert_eq!(
        classify_action("Actions locales - Itinéraire", rules),
        Bucket::Directions
    );
}

#[test]
fn classification_is_deterministic() {
    let book = load_book();
    let rules = book.rule_for("1513412386");
    let rows = vec![
        row("Appels", 2.0, None),
        row("Itinéraires", 1.0, None),
        row("Session longue", 5.0, None),
    ];
    let a = classify_rows(&rows, rules);
    let b = classify_rows(&rows, rules);
    assert_eq!(a.contact_total, b.contact_total);
    assert_eq!(a.directions_total, b.directions_total);
    assert_eq!(a.unmatched, b.unmatched);
}

#[test]
fn unknown_advertiser_uses_default_not_union() {
    let mut advertisers = HashMap::new();
    advertisers.insert(
        "111".to_string(),
        RuleSet {
            contact_patterns: vec!["call bouton".to_string()],
            directions_patterns: vec![],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        },
    );
    let book = RuleBook::from_parts(
        RuleSet {
            contact_patterns: vec!["appels".to_string()],
            directions_patterns: vec!["itinéraires".to_string()],
            match_mode: MatchMode::Substring,
            mutually_exclusive: true,
            notes: None,
        },
        advertisers,
    );

    // "Appels" is a default contact pattern; the override must not inherit it.
    assert_eq!(
        classify_action("Appels", book.rule_for("111")),
        Bucket::None
    );
    assert_eq!(
        classify_action("Appels", book.rule_for("999")),
        Bucket::Contact
    );
}
