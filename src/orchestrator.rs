use crate::aggregator::{
    aggregate_campaigns, aggregate_meta, google_metric_values, meta_metric_values,
};
use crate::circuit_breaker::{create_fetch_circuit_breaker, FetchCircuitBreaker};
use crate::classifier::{classify_rows, Classification};
use crate::errors::AppError;
use crate::google_ads::GoogleAdsClient;
use crate::meta_ads::MetaAdsClient;
use crate::models::{
    AccountOutcome, AccountSpec, AggregatedReport, BatchReport, DateRange, PipelineStatus,
    Platform, ReportRequest,
};
use crate::rules::RuleBook;
use failsafe::CircuitBreaker;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Stages of one account pipeline. An account only ever moves forward; a
/// failure in any stage jumps straight to `Failed` keeping whatever data
/// earlier stages produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Fetching,
    Classifying,
    Aggregating,
    Done,
    Failed,
}

fn advance(account_id: &str, state: &mut PipelineState, to: PipelineState) {
    tracing::debug!("Account {}: {:?} -> {:?}", account_id, *state, to);
    *state = to;
}

/// Runs report pipelines for a batch of accounts with bounded concurrency.
///
/// One failed account never aborts the batch; its outcome lands in the
/// failure list with whatever partial data it managed to compute.
pub struct Orchestrator {
    google: Arc<GoogleAdsClient>,
    meta: Arc<MetaAdsClient>,
    rules: Arc<RuleBook>,
    max_concurrent: usize,
    // One breaker per platform; a Google outage must not block Meta fetches.
    google_breaker: FetchCircuitBreaker,
    meta_breaker: FetchCircuitBreaker,
}

impl Orchestrator {
    pub fn new(
        google: Arc<GoogleAdsClient>,
        meta: Arc<MetaAdsClient>,
        rules: Arc<RuleBook>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            google,
            meta,
            rules,
            max_concurrent,
            google_breaker: create_fetch_circuit_breaker(),
            meta_breaker: create_fetch_circuit_breaker(),
        }
    }

    /// Runs every account in the request, at most `max_concurrent` at a time,
    /// and partitions the outcomes into successes and failures.
    pub async fn run_batch(self: Arc<Self>, request: &ReportRequest) -> BatchReport {
        let deadline = request
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for account in request.accounts.clone() {
            let orchestrator = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let range = request.date_range;
            tasks.spawn(async move {
                // Closed only on runtime shutdown.
                let _permit = semaphore.acquire_owned().await.ok();
                orchestrator.run_account(account, range, deadline).await
            });
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) if outcome.status == PipelineStatus::Done => successes.push(outcome),
                Ok(outcome) => failures.push(outcome),
                Err(e) => tracing::error!("Account task panicked: {}", e),
            }
        }

        // Stable output order regardless of completion order.
        successes.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        failures.sort_by(|a, b| a.account_id.cmp(&b.account_id));

        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            successes.len(),
            failures.len()
        );
        BatchReport {
            successes,
            failures,
        }
    }

    /// One account's pipeline: fetch, classify, aggregate.
    pub async fn run_account(
        &self,
        account: AccountSpec,
        range: DateRange,
        deadline: Option<Instant>,
    ) -> AccountOutcome {
        let mut state = PipelineState::Fetching;
        let id = account.account_id.clone();

        // An account that spent its queue time waiting out the batch deadline
        // fails before touching the network.
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                advance(&id, &mut state, PipelineState::Failed);
                return failed_outcome(
                    account,
                    AggregatedReport::default(),
                    None,
                    "deadline exceeded before fetch started".to_string(),
                );
            }
        }

        tracing::info!(
            "Account {} ({:?}): starting report for {}..{}",
            id,
            account.platform,
            range.since,
            range.until
        );

        match account.platform {
            Platform::GoogleAds => self.run_google(account, range, deadline, &mut state).await,
            Platform::MetaAds => self.run_meta(account, range, deadline, &mut state).await,
        }
    }

    async fn run_google(
        &self,
        account: AccountSpec,
        range: DateRange,
        deadline: Option<Instant>,
        state: &mut PipelineState,
    ) -> AccountOutcome {
        let id = account.account_id.clone();

        if !self.google_breaker.is_call_permitted() {
            advance(&id, state, PipelineState::Failed);
            return failed_outcome(
                account,
                AggregatedReport::default(),
                None,
                "upstream circuit open, failing fast".to_string(),
            );
        }

        let campaigns = record_on(
            &self.google_breaker,
            self.google.fetch_campaign_rows(&id, &range, deadline).await,
        );
        let campaigns = match campaigns {
            Ok(rows) => rows,
            Err(partial) => {
                // Pages fetched before the failure still reach the report.
                advance(&id, state, PipelineState::Failed);
                let report = aggregate_campaigns(&partial.rows, &Classification::default());
                return failed_outcome(
                    account,
                    report,
                    None,
                    format!("campaign fetch failed: {}", partial.error),
                );
            }
        };

        let conversions = record_on(
            &self.google_breaker,
            self.google.fetch_conversion_rows(&id, &range, deadline).await,
        );
        let (conversions, fetch_error) = match conversions {
            Ok(rows) => (rows, None),
            Err(partial) => (partial.rows, Some(partial.error)),
        };

        // Whatever conversion pages arrived are classified and aggregated,
        // complete fetch or not.
        advance(&id, state, PipelineState::Classifying);
        let rule_set = self.rules.rule_for(&id);
        let classification = classify_rows(&conversions, rule_set);
        if !classification.unmatched.is_empty() {
            tracing::warn!(
                "Account {}: {} conversion action(s) matched no rule",
                id,
                classification.unmatched.len()
            );
        }

        advance(&id, state, PipelineState::Aggregating);
        let report = aggregate_campaigns(&campaigns, &classification);

        match fetch_error {
            None => {
                advance(&id, state, PipelineState::Done);
                AccountOutcome {
                    account_id: account.account_id,
                    platform: account.platform,
                    status: PipelineStatus::Done,
                    report,
                    meta: None,
                    failure_reason: None,
                    unmatched_actions: classification.unmatched,
                }
            }
            Some(e) => {
                advance(&id, state, PipelineState::Failed);
                let mut outcome = failed_outcome(
                    account,
                    report,
                    None,
                    format!("conversion fetch failed: {}", e),
                );
                outcome.unmatched_actions = classification.unmatched;
                outcome
            }
        }
    }

    async fn run_meta(
        &self,
        account: AccountSpec,
        range: DateRange,
        deadline: Option<Instant>,
        state: &mut PipelineState,
    ) -> AccountOutcome {
        let id = account.account_id.clone();

        if !self.meta_breaker.is_call_permitted() {
            advance(&id, state, PipelineState::Failed);
            return failed_outcome(
                account,
                AggregatedReport::default(),
                None,
                "upstream circuit open, failing fast".to_string(),
            );
        }

        let insights = record_on(
            &self.meta_breaker,
            self.meta.fetch_insights(&id, &range, deadline).await,
        );

        match insights {
            Ok(rows) => {
                advance(&id, state, PipelineState::Aggregating);
                let aggregate = aggregate_meta(&rows);
                advance(&id, state, PipelineState::Done);
                AccountOutcome {
                    account_id: account.account_id,
                    platform: account.platform,
                    status: PipelineStatus::Done,
                    report: AggregatedReport::default(),
                    meta: Some(aggregate),
                    failure_reason: None,
                    unmatched_actions: Vec::new(),
                }
            }
            Err(partial) => {
                advance(&id, state, PipelineState::Failed);
                let aggregate = if partial.rows.is_empty() {
                    None
                } else {
                    Some(aggregate_meta(&partial.rows))
                };
                failed_outcome(
                    account,
                    AggregatedReport::default(),
                    aggregate,
                    partial.error.to_string(),
                )
            }
        }
    }
}

/// Feeds a finished fetch result through the platform breaker so consecutive
/// exhausted fetches eventually open the circuit.
fn record_on<T, E>(breaker: &FetchCircuitBreaker, result: Result<T, E>) -> Result<T, E>
where
    E: From<AppError>,
{
    match breaker.call(|| result) {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(err)) => Err(err),
        Err(failsafe::Error::Rejected) => Err(E::from(AppError::RetryableNetwork(
            "upstream circuit open, failing fast".to_string(),
        ))),
    }
}

fn failed_outcome(
    account: AccountSpec,
    report: AggregatedReport,
    meta: Option<crate::models::MetaAggregate>,
    reason: String,
) -> AccountOutcome {
    tracing::error!("Account {}: pipeline failed: {}", account.account_id, reason);
    AccountOutcome {
        account_id: account.account_id,
        platform: account.platform,
        status: PipelineStatus::Failed,
        report,
        meta,
        failure_reason: Some(reason),
        unmatched_actions: Vec::new(),
    }
}

/// Sheet-ready metric values for one account outcome.
pub fn outcome_metric_values(outcome: &AccountOutcome) -> BTreeMap<String, Value> {
    match (&outcome.platform, &outcome.meta) {
        (Platform::MetaAds, Some(meta)) => meta_metric_values(meta),
        (Platform::MetaAds, None) => BTreeMap::new(),
        (Platform::GoogleAds, _) => google_metric_values(&outcome.report),
    }
}
