use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive date range for a report run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

/// Ad platform an account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleAds,
    MetaAds,
}

/// Advertising delivery surface used to group campaign metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Search,
    PerformanceMax,
    Display,
    Unknown,
}

impl ChannelType {
    /// Maps the platform's channel name (e.g. `PERFORMANCE_MAX`) to a bucket key.
    pub fn from_api_name(name: &str) -> Self {
        match name {
            "SEARCH" => ChannelType::Search,
            "PERFORMANCE_MAX" => ChannelType::PerformanceMax,
            "DISPLAY" => ChannelType::Display,
            _ => ChannelType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Search => "SEARCH",
            ChannelType::PerformanceMax => "PERFORMANCE_MAX",
            ChannelType::Display => "DISPLAY",
            ChannelType::Unknown => "UNKNOWN",
        }
    }
}

/// One conversion-action row as returned by a platform query.
///
/// `raw_value` is the platform's inferred/all-conversions counter,
/// `exact_value` the exact-conversions counter when the platform reports one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRow {
    pub action_name: String,
    pub action_id: String,
    pub raw_value: f64,
    pub exact_value: Option<f64>,
}

impl ConversionRow {
    /// Two-tier value resolution: prefer the exact counter when strictly
    /// positive, fall back to the inferred counter, else zero. Applied once
    /// per row, before any bucket totals are summed.
    pub fn resolved_value(&self) -> f64 {
        match self.exact_value {
            Some(exact) if exact > 0.0 => exact,
            _ => {
                if self.raw_value > 0.0 {
                    self.raw_value
                } else {
                    0.0
                }
            }
        }
    }
}

/// One per-campaign metrics row from a platform query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRow {
    pub campaign_name: String,
    pub channel: ChannelType,
    pub clicks: u64,
    pub impressions: u64,
    pub cost_micros: u64,
    pub conversions: f64,
    pub phone_calls: u64,
}

/// Mutable per-channel accumulator, owned by one aggregation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelBucket {
    pub clicks: u64,
    pub impressions: u64,
    pub cost_micros: u64,
    pub conversions: f64,
    pub phone_calls: u64,
}

impl ChannelBucket {
    pub fn absorb(&mut self, row: &CampaignRow) {
        self.clicks += row.clicks;
        self.impressions += row.impressions;
        self.cost_micros += row.cost_micros;
        self.conversions += row.conversions;
        self.phone_calls += row.phone_calls;
    }

    /// Cost in currency units. Micros are only converted at presentation time.
    pub fn cost(&self) -> f64 {
        self.cost_micros as f64 / 1_000_000.0
    }

    /// CTR as a ratio; 0 when there are no impressions.
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }

    /// CPC in currency units; 0 when there are no clicks.
    pub fn cpc(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.cost() / self.clicks as f64
        }
    }
}

/// Read-only result of one aggregation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedReport {
    pub per_channel: BTreeMap<ChannelType, ChannelBucket>,
    pub totals: ChannelBucket,
    pub contact_total: f64,
    pub directions_total: f64,
    /// Rows whose channel type was not in the fixed enumeration. They count
    /// toward `totals` but are excluded from `per_channel`.
    pub unrecognized_rows: usize,
    /// Malformed rows skipped during classification/aggregation.
    pub skipped_rows: usize,
}

/// An action recorded by a Meta campaign (e.g. `link_click`, `lead`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAction {
    pub action_type: String,
    pub value: i64,
}

/// One Meta campaign-level insights row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaInsightsRow {
    pub campaign_name: String,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub actions: Vec<MetaAction>,
    /// Per-campaign cost-per-result values, when reported.
    pub cost_per_result: Vec<f64>,
}

/// Aggregate over all Meta campaigns of one account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetaAggregate {
    pub impressions: u64,
    pub clicks: u64,
    /// Link clicks extracted from actions; CPC is based on these, not raw clicks.
    pub link_clicks: u64,
    pub spend: f64,
    /// Spend restricted to campaigns that generated contacts, for CPL.
    pub spend_with_contacts: f64,
    pub contact_conversions: i64,
    pub place_search_conversions: i64,
    /// Mean of per-campaign cost-per-result over active campaigns.
    pub cpl_average: f64,
}

impl MetaAggregate {
    /// CTR as a percentage (the Graph API convention); 0 when no impressions.
    pub fn ctr_percent(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64 * 100.0
        }
    }

    /// CPC based on link clicks; 0 when there are none.
    pub fn cpc(&self) -> f64 {
        if self.link_clicks == 0 {
            0.0
        } else {
            self.spend / self.link_clicks as f64
        }
    }
}

/// One account to include in a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSpec {
    pub account_id: String,
    pub platform: Platform,
    /// Display name, used in per-account outcome messages.
    #[serde(default)]
    pub name: Option<String>,
    /// Worksheet tab this account's metrics are written to. Accounts without
    /// one share the request-level worksheet.
    #[serde(default)]
    pub worksheet: Option<String>,
}

impl AccountSpec {
    /// Worksheet for this account, falling back to the request-level tab so
    /// two clients in one batch never overwrite each other's cells.
    pub fn worksheet_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.worksheet.as_deref().unwrap_or(default)
    }
}

/// Request payload for a multi-account report run.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub accounts: Vec<AccountSpec>,
    pub date_range: DateRange,
    /// Metric keys to push to the sheet; the full set is computed regardless.
    pub selected_metrics: Vec<String>,
    pub worksheet: String,
    pub month: String,
    /// Optional overall deadline in seconds for the whole batch.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

/// Terminal state of one account pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Done,
    Failed,
}

/// Outcome of one account pipeline: either a complete report, or a partial
/// best-effort report plus a human-readable failure reason.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOutcome {
    pub account_id: String,
    pub platform: Platform,
    pub status: PipelineStatus,
    pub report: AggregatedReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaAggregate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Conversion rows that matched no rule, kept for auditing.
    pub unmatched_actions: Vec<String>,
}

/// Result of a batch run: per-account successes and failures, never a single
/// opaque batch failure.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub successes: Vec<AccountOutcome>,
    pub failures: Vec<AccountOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_resolution_prefers_exact_when_positive() {
        let row = ConversionRow {
            action_name: "Appels".to_string(),
            action_id: "1".to_string(),
            raw_value: 12.0,
            exact_value: Some(5.0),
        };
        assert_eq!(row.resolved_value(), 5.0);
    }

    #[test]
    fn value_resolution_falls_back_to_raw() {
        let row = ConversionRow {
            action_name: "Appels".to_string(),
            action_id: "1".to_string(),
            raw_value: 7.0,
            exact_value: Some(0.0),
        };
        assert_eq!(row.resolved_value(), 7.0);
    }

    #[test]
    fn value_resolution_zero_when_both_absent() {
        let row = ConversionRow {
            action_name: "Appels".to_string(),
            action_id: "1".to_string(),
            raw_value: 0.0,
            exact_value: None,
        };
        assert_eq!(row.resolved_value(), 0.0);
    }

    #[test]
    fn account_worksheet_falls_back_to_request_level() {
        let mut account = AccountSpec {
            account_id: "123".to_string(),
            platform: Platform::GoogleAds,
            name: None,
            worksheet: None,
        };
        assert_eq!(account.worksheet_or("Suivi 2026"), "Suivi 2026");
        account.worksheet = Some("Client A".to_string());
        assert_eq!(account.worksheet_or("Suivi 2026"), "Client A");
    }

    #[test]
    fn channel_from_api_name() {
        assert_eq!(ChannelType::from_api_name("SEARCH"), ChannelType::Search);
        assert_eq!(
            ChannelType::from_api_name("PERFORMANCE_MAX"),
            ChannelType::PerformanceMax
        );
        assert_eq!(ChannelType::from_api_name("VIDEO"), ChannelType::Unknown);
    }
}
