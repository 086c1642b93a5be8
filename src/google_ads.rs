use crate::config::Config;
use crate::errors::{AppError, PartialFetch};
use crate::models::{CampaignRow, ChannelType, ConversionRow, DateRange};
use crate::retry::{with_retries, BackoffTable, ThrottleMap};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Client for the Google Ads REST search endpoint.
///
/// All queries go through `customers/{id}/googleAds:search` with GAQL bodies;
/// cursor pagination follows `nextPageToken` up to a fixed page ceiling so a
/// single account can never stall a whole report run. Each page request is
/// retried on its own, and a fetch that fails mid-pagination hands back the
/// rows it already collected.
pub struct GoogleAdsClient {
    client: Client,
    base_url: String,
    developer_token: String,
    access_token: String,
    login_customer_id: Option<String>,
    page_limit: usize,
    max_attempts: u32,
    backoff: BackoffTable,
    throttle: ThrottleMap,
}

impl GoogleAdsClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.google_ads_base_url.clone(),
            developer_token: config.google_ads_developer_token.clone(),
            access_token: config.google_ads_access_token.clone(),
            login_customer_id: config.google_ads_login_customer_id.clone(),
            page_limit: config.fetch_page_limit,
            max_attempts: config.fetch_max_attempts,
            backoff: BackoffTable::default(),
            throttle: ThrottleMap::default(),
        })
    }

    /// Per-campaign metrics for the date range, grouped later by channel.
    pub async fn fetch_campaign_rows(
        &self,
        customer_id: &str,
        range: &DateRange,
        deadline: Option<Instant>,
    ) -> Result<Vec<CampaignRow>, PartialFetch<CampaignRow>> {
        let query = format!(
            "SELECT campaign.name, campaign.advertising_channel_type, \
             metrics.clicks, metrics.impressions, metrics.cost_micros, \
             metrics.conversions, metrics.phone_calls \
             FROM campaign WHERE segments.date BETWEEN '{}' AND '{}'",
            range.since, range.until
        );
        match self
            .search(customer_id, &query, "google-campaigns", deadline)
            .await
        {
            Ok(results) => Ok(results.iter().map(parse_campaign_row).collect()),
            Err(partial) => Err(PartialFetch {
                rows: partial.rows.iter().map(parse_campaign_row).collect(),
                error: partial.error,
            }),
        }
    }

    /// Per-conversion-action rows for the date range, fed to classification.
    pub async fn fetch_conversion_rows(
        &self,
        customer_id: &str,
        range: &DateRange,
        deadline: Option<Instant>,
    ) -> Result<Vec<ConversionRow>, PartialFetch<ConversionRow>> {
        let query = format!(
            "SELECT conversion_action.name, conversion_action.id, \
             metrics.all_conversions, metrics.conversions \
             FROM conversion_action WHERE segments.date BETWEEN '{}' AND '{}'",
            range.since, range.until
        );
        match self
            .search(customer_id, &query, "google-conversions", deadline)
            .await
        {
            Ok(results) => Ok(results.iter().map(parse_conversion_row).collect()),
            Err(partial) => Err(PartialFetch {
                rows: partial.rows.iter().map(parse_conversion_row).collect(),
                error: partial.error,
            }),
        }
    }

    /// Runs one GAQL query, following the page cursor until it runs out or
    /// the page ceiling is hit. A page that fails after its retries returns
    /// the rows of every page before it alongside the error.
    async fn search(
        &self,
        customer_id: &str,
        query: &str,
        op_name: &str,
        deadline: Option<Instant>,
    ) -> Result<Vec<Value>, PartialFetch<Value>> {
        // Honor a backoff window left behind by an earlier fetch for this
        // account instead of burning attempts against a known throttle.
        if let Some(wait) = self.throttle.remaining_backoff(customer_id).await {
            tracing::info!(
                "Google Ads customer {} still in backoff, waiting {}s",
                customer_id,
                wait.as_secs()
            );
            if let Some(deadline) = deadline {
                if Instant::now() + wait >= deadline {
                    return Err(PartialFetch::from(AppError::DeadlineExceeded(format!(
                        "{}/{}: deadline would pass during account backoff",
                        op_name, customer_id
                    ))));
                }
            }
            tokio::time::sleep(wait).await;
        }

        let op = format!("{}/{}", op_name, customer_id);
        let mut results = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..self.page_limit {
            let fetched = with_retries(&op, self.max_attempts, deadline, &self.backoff, |_| {
                self.search_page(customer_id, query, page_token.as_deref(), page)
            })
            .await;

            let payload = match fetched {
                Ok(payload) => payload,
                Err(e) => {
                    self.throttle.record_failure(customer_id, &e).await;
                    return Err(PartialFetch { rows: results, error: e });
                }
            };

            if let Some(rows) = payload.get("results").and_then(Value::as_array) {
                results.extend(rows.iter().cloned());
            }

            page_token = payload
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
            if page + 1 == self.page_limit {
                tracing::warn!(
                    "Google Ads page ceiling ({}) reached for customer {}, truncating",
                    self.page_limit,
                    customer_id
                );
            }
        }

        self.throttle.record_success(customer_id).await;
        Ok(results)
    }

    /// One page request: POST the query (with the cursor when present) and
    /// parse the body.
    async fn search_page(
        &self,
        customer_id: &str,
        query: &str,
        page_token: Option<&str>,
        page: usize,
    ) -> Result<Value, AppError> {
        let url = format!("{}/customers/{}/googleAds:search", self.base_url, customer_id);
        let mut body = json!({ "query": query });
        if let Some(token) = page_token {
            body["pageToken"] = json!(token);
        }

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("developer-token", &self.developer_token)
            .json(&body);
        if let Some(login) = &self.login_customer_id {
            request = request.header("login-customer-id", login);
        }

        tracing::debug!(
            "Google Ads search for customer {} (page {})",
            customer_id,
            page + 1
        );

        let response = request.send().await.map_err(AppError::from)?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.classify_error(status, &text));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::FatalApi(format!("Google Ads response parse: {}", e)))
    }

    /// Sorts an error response into the retry taxonomy. Quota exhaustion
    /// (429, or 403 carrying RESOURCE_EXHAUSTED) is a rate limit; other 5xx
    /// are transient; everything else is fatal for this account.
    fn classify_error(&self, status: reqwest::StatusCode, body: &str) -> AppError {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/code"))
            .and_then(Value::as_u64)
            .unwrap_or(status.as_u16() as u64) as u32;
        let status_text = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/status"))
            .and_then(Value::as_str)
            .unwrap_or("");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || (status == reqwest::StatusCode::FORBIDDEN && status_text == "RESOURCE_EXHAUSTED")
        {
            return AppError::RateLimited {
                code,
                subcode: None,
                wait: self.backoff.wait_for(code, None),
            };
        }
        if status.is_server_error() {
            return AppError::RetryableNetwork(format!("Google Ads {}: {}", status, body));
        }
        AppError::FatalApi(format!("Google Ads {}: {}", status, body))
    }
}

// Google's REST encoding serializes int64 metrics as JSON strings.
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

fn parse_campaign_row(result: &Value) -> CampaignRow {
    let metrics = &result["metrics"];
    CampaignRow {
        campaign_name: result["campaign"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        channel: ChannelType::from_api_name(
            result["campaign"]["advertisingChannelType"]
                .as_str()
                .unwrap_or_default(),
        ),
        clicks: lenient_u64(&metrics["clicks"]),
        impressions: lenient_u64(&metrics["impressions"]),
        cost_micros: lenient_u64(&metrics["costMicros"]),
        conversions: lenient_f64(&metrics["conversions"]),
        phone_calls: lenient_u64(&metrics["phoneCalls"]),
    }
}

fn parse_conversion_row(result: &Value) -> ConversionRow {
    let metrics = &result["metrics"];
    ConversionRow {
        action_name: result["conversionAction"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        action_id: result["conversionAction"]["id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| lenient_u64(&result["conversionAction"]["id"]).to_string()),
        raw_value: lenient_f64(&metrics["allConversions"]),
        exact_value: metrics.get("conversions").map(lenient_f64),
    }
}
