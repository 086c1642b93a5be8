use crate::classifier::Classification;
use crate::models::{
    AggregatedReport, CampaignRow, ChannelBucket, ChannelType, MetaAggregate, MetaInsightsRow,
};
use std::collections::BTreeMap;

/// Meta action types counted as contact conversions.
pub const META_CONTACT_ACTIONS: [&str; 3] = [
    "onsite_web_lead",
    "lead",
    "offsite_conversion.fb_pixel_lead",
];

/// Meta action type counted as a place-search conversion.
pub const META_PLACE_SEARCH_ACTION: &str = "offsite_conversion.fb_pixel_custom";

/// Buckets campaign rows by channel and folds in the classification totals.
///
/// Rows on a channel outside the fixed enumeration still count toward the
/// grand totals but are surfaced through `unrecognized_rows` instead of
/// getting a bucket of their own.
pub fn aggregate_campaigns(rows: &[CampaignRow], classification: &Classification) -> AggregatedReport {
    let mut per_channel: BTreeMap<ChannelType, ChannelBucket> = BTreeMap::new();
    let mut totals = ChannelBucket::default();
    let mut unrecognized = 0usize;

    for row in rows {
        totals.absorb(row);
        match row.channel {
            ChannelType::Unknown => {
                unrecognized += 1;
                tracing::debug!(
                    "Campaign '{}' on unrecognized channel, counted in totals only",
                    row.campaign_name
                );
            }
            channel => per_channel.entry(channel).or_default().absorb(row),
        }
    }

    AggregatedReport {
        per_channel,
        totals,
        contact_total: classification.contact_total,
        directions_total: classification.directions_total,
        unrecognized_rows: unrecognized,
        skipped_rows: classification.skipped,
    }
}

/// Folds Meta campaign-level insights into one account-level aggregate.
///
/// CPC is based on link clicks. CPL is the mean of per-campaign
/// cost-per-result over active campaigns (spend and impressions both
/// non-zero), matching how the platform UI reports it.
pub fn aggregate_meta(rows: &[MetaInsightsRow]) -> MetaAggregate {
    let mut agg = MetaAggregate::default();
    let mut cpl_values: Vec<f64> = Vec::new();

    for row in rows {
        agg.impressions += row.impressions;
        agg.clicks += row.clicks;
        agg.spend += row.spend;

        let mut campaign_contacts = 0i64;
        for action in &row.actions {
            if action.action_type == "link_click" {
                agg.link_clicks += action.value.max(0) as u64;
            }
            if META_CONTACT_ACTIONS.contains(&action.action_type.as_str()) {
                campaign_contacts += action.value;
            }
            if action.action_type == META_PLACE_SEARCH_ACTION {
                agg.place_search_conversions += action.value;
            }
        }
        agg.contact_conversions += campaign_contacts;
        if campaign_contacts > 0 {
            agg.spend_with_contacts += row.spend;
        }

        let active = row.spend > 0.0 && row.impressions > 0;
        if active {
            cpl_values.extend(row.cost_per_result.iter().copied());
        }
    }

    if !cpl_values.is_empty() {
        agg.cpl_average = cpl_values.iter().sum::<f64>() / cpl_values.len() as f64;
    }

    agg
}

/// Sheet metric names for a Google Ads account report.
///
/// Names are the spreadsheet row labels the business works with; values are
/// rounded at presentation time only, never during aggregation.
pub fn google_metric_values(report: &AggregatedReport) -> BTreeMap<String, serde_json::Value> {
    let mut out = BTreeMap::new();

    let bucket = |c: ChannelType| report.per_channel.get(&c).cloned().unwrap_or_default();
    let search = bucket(ChannelType::Search);
    let pmax = bucket(ChannelType::PerformanceMax);
    let display = bucket(ChannelType::Display);

    let num =
        |v: f64| serde_json::Value::from((v * 100.0).round() / 100.0);
    let int = |v: u64| serde_json::Value::from(v);
    // CTR leaves the aggregator as a ratio; the sheet shows it as "x.xx%".
    let pct = |ratio: f64| serde_json::Value::from(format!("{:.2}%", ratio * 100.0));

    out.insert("Clics Search".to_string(), int(search.clicks));
    out.insert("Impressions Search".to_string(), int(search.impressions));
    out.insert("CTR Search".to_string(), pct(search.ctr()));
    out.insert("CPC Search".to_string(), num(search.cpc()));
    out.insert("Coût Search (€)".to_string(), num(search.cost()));

    out.insert("Clics PMax".to_string(), int(pmax.clicks));
    out.insert("Impressions PMax".to_string(), int(pmax.impressions));
    out.insert("CTR PMax".to_string(), pct(pmax.ctr()));
    out.insert("CPC PMax".to_string(), num(pmax.cpc()));
    out.insert("Coût PMax (€)".to_string(), num(pmax.cost()));

    out.insert("Clics Display".to_string(), int(display.clicks));
    out.insert("Impressions Display".to_string(), int(display.impressions));
    out.insert("CTR Display".to_string(), pct(display.ctr()));
    out.insert("CPC Display".to_string(), num(display.cpc()));
    out.insert("Coût Display (€)".to_string(), num(display.cost()));

    out.insert("Clics Google ADS".to_string(), int(report.totals.clicks));
    out.insert(
        "Impressions Google ADS".to_string(),
        int(report.totals.impressions),
    );
    out.insert("CTR Google ADS".to_string(), pct(report.totals.ctr()));
    // Global CPC is total cost over total clicks, not a mean of channel CPCs.
    out.insert("CPC Google ADS".to_string(), num(report.totals.cpc()));
    out.insert("Cout Google ADS".to_string(), num(report.totals.cost()));
    out.insert(
        "Appels Google ADS".to_string(),
        int(report.totals.phone_calls),
    );

    out.insert("Contacts Google ADS".to_string(), num(report.contact_total));
    out.insert(
        "Itinéraires Google ADS".to_string(),
        num(report.directions_total),
    );

    out
}

/// Sheet metric names for a Meta account report.
pub fn meta_metric_values(agg: &MetaAggregate) -> BTreeMap<String, serde_json::Value> {
    let mut out = BTreeMap::new();

    let num = |v: f64| serde_json::Value::from((v * 100.0).round() / 100.0);

    out.insert("Clics Meta".to_string(), serde_json::Value::from(agg.clicks));
    out.insert(
        "Impressions Meta".to_string(),
        serde_json::Value::from(agg.impressions),
    );
    out.insert(
        "CTR Meta".to_string(),
        serde_json::Value::from(format!("{:.2}%", agg.ctr_percent())),
    );
    out.insert("CPC Meta".to_string(), num(agg.cpc()));
    out.insert("Coût Total (€)".to_string(), num(agg.spend));
    out.insert(
        "Contacts Meta".to_string(),
        serde_json::Value::from(agg.contact_conversions),
    );
    out.insert(
        "Recherches de lieux".to_string(),
        serde_json::Value::from(agg.place_search_conversions),
    );
    out.insert("CPL Meta".to_string(), num(agg.cpl_average));

    out
}
