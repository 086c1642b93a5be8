mod aggregator;
mod circuit_breaker;
mod classifier;
mod config;
mod errors;
mod google_ads;
mod handlers;
mod meta_ads;
mod models;
mod orchestrator;
mod retry;
mod rules;
mod sheets;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::google_ads::GoogleAdsClient;
use crate::meta_ads::MetaAdsClient;
use crate::orchestrator::Orchestrator;
use crate::rules::RuleBook;
use crate::sheets::{GoogleSheetsClient, StaticCellResolver};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Classification rules and sheet layout.
/// - Ad platform clients and the report orchestrator.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_ads_report=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Load the classification rules and spreadsheet layout once; handlers
    // share them read-only.
    let rules = Arc::new(RuleBook::load(&config.rules_path)?);
    let resolver = Arc::new(StaticCellResolver::load(&config.sheet_layout_path)?);

    // Ad platform clients
    let google = Arc::new(GoogleAdsClient::new(&config)?);
    let meta = Arc::new(MetaAdsClient::new(&config)?);
    let sheets = Arc::new(GoogleSheetsClient::new(&config)?);
    tracing::info!("Platform clients initialized");

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&google),
        Arc::clone(&meta),
        Arc::clone(&rules),
        config.max_concurrent_accounts,
    ));

    // Finished report cache (10 minute TTL). A repeated request within the
    // window returns the same response without re-fetching or re-writing.
    let report_cache = Cache::builder()
        .time_to_live(Duration::from_secs(600))
        .max_capacity(1_000)
        .build();
    tracing::info!("Report cache initialized (10m TTL)");

    // Build application state
    let app_state = Arc::new(crate::handlers::AppState {
        config: config.clone(),
        rules,
        orchestrator,
        sheets,
        resolver,
        report_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/reports", post(handlers::run_report))
        .route("/api/v1/clients", get(handlers::list_clients))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
