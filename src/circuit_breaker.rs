use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Concrete breaker type so clients can hold one in a struct field.
pub type FetchCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for upstream ad-platform calls.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast.
/// - **HALF_OPEN**: Testing if the platform recovered.
///
/// One breaker guards one platform client, so a Google Ads outage cannot
/// starve Meta fetches of their attempts.
pub fn create_fetch_circuit_breaker() -> FetchCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
