/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use proptest::prelude::*;
use rust_ads_report::classifier::{classify_action, Bucket};
use rust_ads_report::models::{CampaignRow, ChannelType, ConversionRow};
use rust_ads_report::retry::BackoffTable;
use rust_ads_report::rules::{normalize, MatchMode, RuleSet};

fn substring_rules() -> RuleSet {
    RuleSet {
        contact_patterns: vec!["appels".to_string(), "cta".to_string()],
        directions_patterns: vec!["itinéraires".to_string()],
        match_mode: MatchMode::Substring,
        mutually_exclusive: true,
        notes: None,
    }
}

// Property: classification should never panic, whatever the action name
proptest! {
    #[test]
    fn classification_never_panics(name in "\\PC*") {
        let _ = classify_action(&name, &substring_rules());
    }

    #[test]
    fn normalization_is_idempotent(name in "\\PC*") {
        let once = normalize(&name);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn exclusive_sets_never_report_both(name in "\\PC*") {
        let bucket = classify_action(&name, &substring_rules());
        prop_assert!(bucket != Bucket::Both);
    }

    #[test]
    fn exact_match_implies_substring_match(name in "[a-zA-Z é\\-]{0,30}") {
        let exact = RuleSet { match_mode: MatchMode::Exact, mutually_exclusive: false, ..substring_rules() };
        let sub = RuleSet { mutually_exclusive: false, ..substring_rules() };
        // Anything exact mode classifies, substring mode must classify too.
        if classify_action(&name, &exact) != Bucket::None {
            prop_assert!(classify_action(&name, &sub) != Bucket::None);
        }
    }
}

// Property: value resolution picks exact > raw > 0, never a negative total
proptest! {
    #[test]
    fn resolved_value_prefers_positive_exact(raw in 0.0f64..1e6, exact in proptest::option::of(0.0f64..1e6)) {
        let row = ConversionRow {
            action_name: "Appels".to_string(),
            action_id: "1".to_string(),
            raw_value: raw,
            exact_value: exact,
        };
        let resolved = row.resolved_value();
        prop_assert!(resolved >= 0.0);
        match exact {
            Some(e) if e > 0.0 => prop_assert_eq!(resolved, e),
            _ => prop_assert_eq!(resolved, if raw > 0.0 { raw } else { 0.0 }),
        }
    }
}

// Property: derived metrics stay in range under arbitrary bucket contents
proptest! {
    #[test]
    fn ctr_is_a_ratio(clicks in 0u64..1_000_000, extra_impressions in 0u64..1_000_000) {
        let row = CampaignRow {
            campaign_name: "c".to_string(),
            channel: ChannelType::Search,
            clicks,
            impressions: clicks + extra_impressions,
            cost_micros: 0,
            conversions: 0.0,
            phone_calls: 0,
        };
        let mut bucket = rust_ads_report::models::ChannelBucket::default();
        bucket.absorb(&row);
        let ctr = bucket.ctr();
        prop_assert!((0.0..=1.0).contains(&ctr));
    }

    #[test]
    fn cpc_zero_without_clicks(cost_micros in 0u64..10_000_000_000) {
        let bucket = rust_ads_report::models::ChannelBucket {
            cost_micros,
            ..Default::default()
        };
        prop_assert_eq!(bucket.cpc(), 0.0);
    }
}

// Property: every error code resolves to one of the table's waits
proptest! {
    #[test]
    fn backoff_table_is_total(code in 0u32..100_000, subcode in proptest::option::of(0u32..10_000_000)) {
        let table = BackoffTable::default();
        let wait = table.wait_for(code, subcode);
        prop_assert!(
            wait == table.app_level || wait == table.user_level || wait == table.unknown
        );
    }
}
