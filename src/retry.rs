use crate::errors::AppError;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Rate-limit class derived from a platform error code/subcode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    /// Application-wide throttle; every account is affected.
    AppLevel,
    /// Per-user/per-account throttle.
    UserLevel,
    /// Code we have no table entry for.
    Unknown,
}

/// Wait durations per rate-limit class.
///
/// App-level throttles get the longest wait since hammering them extends the
/// block; unknown codes sit in between.
#[derive(Debug, Clone)]
pub struct BackoffTable {
    pub app_level: Duration,
    pub user_level: Duration,
    pub unknown: Duration,
    /// Fixed wait after a transient network failure.
    pub network: Duration,
}

impl Default for BackoffTable {
    fn default() -> Self {
        Self {
            app_level: Duration::from_secs(300),
            user_level: Duration::from_secs(60),
            unknown: Duration::from_secs(120),
            network: Duration::from_secs(5),
        }
    }
}

impl BackoffTable {
    /// Maps a Graph API error code to a limit class. Code 4 is the
    /// application-level limit, 17 the user-level one; 613 is the legacy
    /// per-user call-count limit.
    pub fn classify(code: u32, subcode: Option<u32>) -> LimitClass {
        match (code, subcode) {
            (4, _) | (32, _) => LimitClass::AppLevel,
            (17, _) | (613, _) => LimitClass::UserLevel,
            _ => LimitClass::Unknown,
        }
    }

    pub fn wait_for(&self, code: u32, subcode: Option<u32>) -> Duration {
        match Self::classify(code, subcode) {
            LimitClass::AppLevel => self.app_level,
            LimitClass::UserLevel => self.user_level,
            LimitClass::Unknown => self.unknown,
        }
    }
}

/// Throttle memory for one account on one client instance.
#[derive(Debug, Default)]
pub struct RateLimitState {
    pub consecutive_failures: u32,
    backoff_until: Option<Instant>,
}

impl RateLimitState {
    pub fn record_rate_limit(&mut self, wait: Duration) {
        self.consecutive_failures += 1;
        self.backoff_until = Some(Instant::now() + wait);
    }

    pub fn record_network_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.backoff_until = None;
    }

    /// Remaining wait before the next call should be attempted, if any.
    pub fn remaining_backoff(&self) -> Option<Duration> {
        self.backoff_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }
}

/// Per-account throttle memory held by one client instance.
///
/// A fetch that exhausted its attempts on a rate limit leaves a backoff
/// window here; the next fetch for the same account waits it out instead of
/// burning attempts. Entries are keyed by account so one account's backoff
/// never delays another's fetches, and the map is never shared across client
/// instances.
#[derive(Debug, Default)]
pub struct ThrottleMap {
    states: tokio::sync::Mutex<HashMap<String, RateLimitState>>,
}

impl ThrottleMap {
    /// Remaining backoff window for an account, if one is active.
    pub async fn remaining_backoff(&self, account_id: &str) -> Option<Duration> {
        self.states
            .lock()
            .await
            .get(account_id)
            .and_then(RateLimitState::remaining_backoff)
    }

    /// Records a finished fetch that failed. Rate-limit errors open a backoff
    /// window for the account; other failures only bump the failure counter.
    pub async fn record_failure(&self, account_id: &str, error: &AppError) {
        let mut states = self.states.lock().await;
        let state = states.entry(account_id.to_string()).or_default();
        match error.wait_hint() {
            Some(wait) => state.record_rate_limit(wait),
            None => state.record_network_failure(),
        }
    }

    /// Clears the account's throttle memory after a successful fetch.
    pub async fn record_success(&self, account_id: &str) {
        self.states.lock().await.remove(account_id);
    }
}

/// Runs `op` up to `max_attempts` times, sleeping between attempts on
/// retryable errors. Rate-limit errors wait the platform-selected duration,
/// network errors wait the fixed network backoff. The deadline is checked
/// before every attempt and before every sleep; crossing it returns
/// immediately so partial results upstream stay usable.
pub async fn with_retries<T, F, Fut>(
    op_name: &str,
    max_attempts: u32,
    deadline: Option<Instant>,
    table: &BackoffTable,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                tracing::warn!("{}: deadline passed before attempt {}", op_name, attempt);
                return Err(AppError::DeadlineExceeded(format!(
                    "{}: deadline passed before attempt {}",
                    op_name, attempt
                )));
            }
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let wait = err.wait_hint().unwrap_or(table.network);
                tracing::warn!(
                    "{} attempt {}/{} failed ({}), retrying in {}s",
                    op_name,
                    attempt,
                    max_attempts,
                    err,
                    wait.as_secs()
                );
                if let Some(deadline) = deadline {
                    if Instant::now() + wait >= deadline {
                        tracing::warn!("{}: deadline would pass during backoff, giving up", op_name);
                        return Err(err);
                    }
                }
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!("{}: retries exhausted: {}", op_name, err);
                } else {
                    tracing::error!("{}: fatal error: {}", op_name, err);
                }
                return Err(err);
            }
        }
    }
}
