use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Application-specific error types.
///
/// The first three variants form the ad-platform error taxonomy: rate-limit
/// responses and transient network failures are retryable, everything else
/// surfaced by a platform (auth failure, malformed request, retries
/// exhausted) is fatal for the current account pipeline.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Platform throttling response (403-class with a rate-limit error code).
    /// `wait` is the backoff selected from the subcode table.
    RateLimited {
        /// Platform error code (e.g. Meta Graph code 4 or 17).
        code: u32,
        /// Optional subcode distinguishing limit classes.
        subcode: Option<u32>,
        /// How long to wait before the next attempt.
        wait: Duration,
    },
    /// Transient network failure (timeout, connection reset, 5xx).
    RetryableNetwork(String),
    /// Non-recoverable platform error; the account yields zero (or partial) data.
    FatalApi(String),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// The batch deadline passed before the operation could run.
    DeadlineExceeded(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Whether a fetch attempt hitting this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited { .. } | AppError::RetryableNetwork(_) => true,
            AppError::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The wait the platform asked for, if this is a throttling error.
    pub fn wait_hint(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { wait, .. } => Some(*wait),
            AppError::WithContext { source, .. } => source.wait_hint(),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::RateLimited { code, subcode, wait } => match subcode {
                Some(sub) => write!(
                    f,
                    "Rate limited (code {}, subcode {}): retry in {}s",
                    code,
                    sub,
                    wait.as_secs()
                ),
                None => write!(f, "Rate limited (code {}): retry in {}s", code, wait.as_secs()),
            },
            AppError::RetryableNetwork(msg) => write!(f, "Network error: {}", msg),
            AppError::FatalApi(msg) => write!(f, "Ad platform error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::DeadlineExceeded(msg) => write!(f, "Deadline exceeded: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RateLimited { code, subcode, .. } => {
                tracing::warn!("Upstream rate limit: code={}, subcode={:?}", code, subcode);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Upstream ad platform is throttling requests".to_string(),
                )
            }
            AppError::RetryableNetwork(msg) => {
                tracing::error!("Upstream network error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream network error".to_string())
            }
            AppError::FatalApi(msg) => {
                tracing::error!("Ad platform error: {}", msg);
                (StatusCode::BAD_GATEWAY, "External service error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::DeadlineExceeded(msg) => {
                tracing::warn!("Deadline exceeded: {}", msg);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Report deadline exceeded".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Failure of a paginated fetch carrying the rows collected before the
/// failing page, so the caller can still classify and aggregate them.
#[derive(Debug)]
pub struct PartialFetch<T> {
    pub rows: Vec<T>,
    pub error: AppError,
}

impl<T> From<AppError> for PartialFetch<T> {
    fn from(error: AppError) -> Self {
        Self {
            rows: Vec::new(),
            error,
        }
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    ///
    /// Timeouts and connection failures are retryable; everything else
    /// (e.g. body decode failures) is fatal.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::RetryableNetwork(err.to_string())
        } else {
            AppError::FatalApi(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    #[allow(dead_code)]
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
