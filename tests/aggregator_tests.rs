/// Aggregation tests: channel buckets, derived metrics, and sheet naming
use rust_ads_report::aggregator::{
    aggregate_campaigns, aggregate_meta, google_metric_values, meta_metric_values,
};
use rust_ads_report::classifier::Classification;
use rust_ads_report::models::{CampaignRow, ChannelType, MetaAction, MetaInsightsRow};

fn campaign(
    name: &str,
    channel: ChannelType,
    clicks: u64,
    impressions: u64,
    cost_micros: u64,
) -> CampaignRow {
    CampaignRow {
        campaign_name: name.to_string(),
        channel,
        clicks,
        impressions,
        cost_micros,
        conversions: 0.0,
        phone_calls: 0,
    }
}

#[test]
fn buckets_sum_per_channel_and_total() {
    let rows = vec![
        campaign("brand", ChannelType::Search, 100, 1000, 50_000_000),
        campaign("generic", ChannelType::Search, 50, 500, 30_000_000),
        campaign("pmax", ChannelType::PerformanceMax, 20, 4000, 10_000_000),
        campaign("banner", ChannelType::Display, 5, 10_000, 2_000_000),
    ];
    let report = aggregate_campaigns(&rows, &Classification::default());

    let search = &report.per_channel[&ChannelType::Search];
    assert_eq!(search.clicks, 150);
    assert_eq!(search.impressions, 1500);
    assert!((search.cost() - 80.0).abs() < 1e-9);

    assert_eq!(report.totals.clicks, 175);
    assert_eq!(report.totals.impressions, 15_500);
    assert!((report.totals.cost() - 92.0).abs() < 1e-9);
}

#[test]
fn ctr_and_cpc_zero_guards() {
    let rows = vec![campaign("dormant", ChannelType::Search, 0, 0, 0)];
    let report = aggregate_campaigns(&rows, &Classification::default());
    let search = &report.per_channel[&ChannelType::Search];
    assert_eq!(search.ctr(), 0.0);
    assert_eq!(search.cpc(), 0.0);
}

#[test]
fn global_cpc_is_cost_over_clicks_not_mean_of_channels() {
    // Search CPC 0.40, Display CPC 0.025. Mean would be ~0.2125.
    let rows = vec![
        campaign("s", ChannelType::Search, 10, 100, 4_000_000),
        campaign("d", ChannelType::Display, 40, 100, 1_000_000),
    ];
    let report = aggregate_campaigns(&rows, &Classification::default());
    assert!((report.totals.cpc() - 0.10).abs() < 1e-9);

    let values = google_metric_values(&report);
    assert_eq!(values["CPC Google ADS"], serde_json::Value::from(0.1));
}

#[test]
fn unknown_channel_reported_not_bucketed() {
    let rows = vec![
        campaign("video", ChannelType::Unknown, 7, 70, 700_000),
        campaign("search", ChannelType::Search, 3, 30, 300_000),
    ];
    let report = aggregate_campaigns(&rows, &Classification::default());
    assert_eq!(report.unrecognized_rows, 1);
    assert_eq!(report.totals.clicks, 10);
    assert!(!report.per_channel.contains_key(&ChannelType::Unknown));
}

#[test]
fn classification_totals_flow_into_report_and_sheet_values() {
    let classification = Classification {
        contact_total: 12.5,
        directions_total: 8.0,
        unmatched: vec![],
        skipped: 0,
    };
    let report = aggregate_campaigns(&[], &classification);
    assert_eq!(report.contact_total, 12.5);

    let values = google_metric_values(&report);
    assert_eq!(values["Contacts Google ADS"], serde_json::Value::from(12.5));
    assert_eq!(
        values["Itinéraires Google ADS"],
        serde_json::Value::from(8.0)
    );
}

#[test]
fn meta_aggregate_extracts_contacts_and_place_searches() {
    let rows = vec![
        MetaInsightsRow {
            campaign_name: "leads".to_string(),
            impressions: 10_000,
            clicks: 300,
            spend: 120.0,
            actions: vec![
                MetaAction {
                    action_type: "link_click".to_string(),
                    value: 250,
                },
                MetaAction {
                    action_type: "onsite_web_lead".to_string(),
                    value: 5,
                },
                MetaAction {
                    action_type: "offsite_conversion.fb_pixel_lead".to_string(),
                    value: 2,
                },
                MetaAction {
                    action_type: "offsite_conversion.fb_pixel_custom".to_string(),
                    value: 9,
                },
            ],
            cost_per_result: vec![17.1],
        },
        MetaInsightsRow {
            campaign_name: "reach".to_string(),
            impressions: 5_000,
            clicks: 100,
            spend: 30.0,
            actions: vec![MetaAction {
                action_type: "link_click".to_string(),
                value: 80,
            }],
            cost_per_result: vec![2.9],
        },
    ];
    let agg = aggregate_meta(&rows);

    assert_eq!(agg.contact_conversions, 7);
    assert_eq!(agg.place_search_conversions, 9);
    assert_eq!(agg.link_clicks, 330);
    // Only the leads campaign spent toward contacts.
    assert!((agg.spend_with_contacts - 120.0).abs() < 1e-9);
    // Both campaigns are active, so both CPL values count.
    assert!((agg.cpl_average - 10.0).abs() < 1e-9);
    // CPC over link clicks: 150 / 330.
    assert!((agg.cpc() - 150.0 / 330.0).abs() < 1e-9);
}

#[test]
fn meta_zero_guards() {
    let agg = aggregate_meta(&[]);
    assert_eq!(agg.ctr_percent(), 0.0);
    assert_eq!(agg.cpc(), 0.0);
    assert_eq!(agg.cpl_average, 0.0);
}

#[test]
fn meta_sheet_values_round_to_cents() {
    let rows = vec![MetaInsightsRow {
        campaign_name: "c".to_string(),
        impressions: 3,
        clicks: 1,
        spend: 10.339,
        actions: vec![MetaAction {
            action_type: "link_click".to_string(),
            value: 3,
        }],
        cost_per_result: vec![],
    }];
    let values = meta_metric_values(&aggregate_meta(&rows));
    assert_eq!(values["Coût Total (€)"], serde_json::Value::from(10.34));
    assert_eq!(values["CPC Meta"], serde_json::Value::from(3.45));
    // 1 click / 3 impressions, shown as a percentage string.
    assert_eq!(values["CTR Meta"], serde_json::Value::from("33.33%"));
}
