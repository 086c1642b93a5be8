use crate::config::Config;
use crate::errors::{AppError, PartialFetch};
use crate::models::{DateRange, MetaAction, MetaInsightsRow};
use crate::retry::{with_retries, BackoffTable, ThrottleMap};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Client for the Meta Graph insights endpoint.
///
/// Campaign-level insights come from `act_{id}/insights`; pagination follows
/// the absolute `paging.next` URL the API hands back, up to the page ceiling.
/// Each page request is retried on its own, and a fetch that fails
/// mid-pagination hands back the rows it already collected.
pub struct MetaAdsClient {
    client: Client,
    base_url: String,
    access_token: String,
    page_limit: usize,
    max_attempts: u32,
    backoff: BackoffTable,
    throttle: ThrottleMap,
}

impl MetaAdsClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.meta_base_url.clone(),
            access_token: config.meta_access_token.clone(),
            page_limit: config.fetch_page_limit,
            max_attempts: config.fetch_max_attempts,
            backoff: BackoffTable::default(),
            throttle: ThrottleMap::default(),
        })
    }

    /// All campaign-level insights rows for an ad account over the range.
    pub async fn fetch_insights(
        &self,
        account_id: &str,
        range: &DateRange,
        deadline: Option<Instant>,
    ) -> Result<Vec<MetaInsightsRow>, PartialFetch<MetaInsightsRow>> {
        // Honor a backoff window left behind by an earlier fetch for this
        // account instead of burning attempts against a known throttle.
        if let Some(wait) = self.throttle.remaining_backoff(account_id).await {
            tracing::info!(
                "Meta account {} still in backoff, waiting {}s",
                account_id,
                wait.as_secs()
            );
            if let Some(deadline) = deadline {
                if Instant::now() + wait >= deadline {
                    return Err(PartialFetch::from(AppError::DeadlineExceeded(format!(
                        "meta-insights/{}: deadline would pass during account backoff",
                        account_id
                    ))));
                }
            }
            tokio::time::sleep(wait).await;
        }

        let time_range = format!(
            "{{\"since\":\"{}\",\"until\":\"{}\"}}",
            range.since, range.until
        );
        let first_url = reqwest::Url::parse_with_params(
            &format!("{}/act_{}/insights", self.base_url, account_id),
            &[
                ("access_token", self.access_token.as_str()),
                ("level", "campaign"),
                (
                    "fields",
                    "campaign_name,impressions,clicks,spend,actions,cost_per_result",
                ),
                ("time_range", time_range.as_str()),
            ],
        )
        .map_err(|e| {
            PartialFetch::from(AppError::InternalError(format!("Failed to build URL: {}", e)))
        })?;

        let op = format!("meta-insights/{}", account_id);
        let mut rows = Vec::new();
        let mut next: Option<String> = Some(first_url.to_string());
        let mut page = 0usize;

        while let Some(url) = next.take() {
            if page == self.page_limit {
                tracing::warn!(
                    "Meta page ceiling ({}) reached for account {}, truncating",
                    self.page_limit,
                    account_id
                );
                break;
            }
            page += 1;
            tracing::debug!("Meta insights for account {} (page {})", account_id, page);

            let fetched = with_retries(&op, self.max_attempts, deadline, &self.backoff, |_| {
                self.insights_page(&url)
            })
            .await;

            let payload = match fetched {
                Ok(payload) => payload,
                Err(e) => {
                    self.throttle.record_failure(account_id, &e).await;
                    return Err(PartialFetch { rows, error: e });
                }
            };

            if let Some(data) = payload.get("data").and_then(Value::as_array) {
                rows.extend(data.iter().map(parse_insights_row));
            }

            // The next cursor is an absolute URL with the token baked in.
            next = payload
                .pointer("/paging/next")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        self.throttle.record_success(account_id).await;
        Ok(rows)
    }

    /// One page request against an absolute insights URL.
    async fn insights_page(&self, url: &str) -> Result<Value, AppError> {
        let response = self.client.get(url).send().await.map_err(AppError::from)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if !status.is_success() {
            return Err(self.classify_error(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::FatalApi(format!("Meta response parse: {}", e)))
    }

    /// Maps a Graph API error body to the retry taxonomy. Throttling comes
    /// back as 403/400 with an `error.code` the backoff table knows how to
    /// wait out; subcodes distinguish limit classes within a code.
    fn classify_error(&self, status: reqwest::StatusCode, body: &str) -> AppError {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/code"))
            .and_then(Value::as_u64)
            .map(|c| c as u32);
        let subcode = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/error_subcode"))
            .and_then(Value::as_u64)
            .map(|c| c as u32);

        if let Some(code) = code {
            if matches!(code, 4 | 17 | 32 | 613) {
                return AppError::RateLimited {
                    code,
                    subcode,
                    wait: self.backoff.wait_for(code, subcode),
                };
            }
        }
        if status.is_server_error() {
            return AppError::RetryableNetwork(format!("Meta {}: {}", status, body));
        }
        AppError::FatalApi(format!("Meta {}: {}", status, body))
    }
}

// Graph serializes counters as strings.
fn lenient_u64(v: &Value) -> u64 {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

fn lenient_f64(v: &Value) -> f64 {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0)
}

fn parse_insights_row(row: &Value) -> MetaInsightsRow {
    let actions = row
        .get("actions")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .map(|a| MetaAction {
                    action_type: a["action_type"].as_str().unwrap_or_default().to_string(),
                    value: lenient_u64(&a["value"]) as i64,
                })
                .collect()
        })
        .unwrap_or_default();

    // cost_per_result entries each carry a values list; flatten them.
    let cost_per_result = row
        .get("cost_per_result")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .flat_map(|entry| {
                    entry
                        .get("values")
                        .and_then(Value::as_array)
                        .map(|vals| vals.iter().map(|v| lenient_f64(&v["value"])).collect())
                        .unwrap_or_else(Vec::new)
                })
                .collect()
        })
        .unwrap_or_default();

    MetaInsightsRow {
        campaign_name: row["campaign_name"].as_str().unwrap_or_default().to_string(),
        impressions: lenient_u64(&row["impressions"]),
        clicks: lenient_u64(&row["clicks"]),
        spend: lenient_f64(&row["spend"]),
        actions,
        cost_per_result,
    }
}
