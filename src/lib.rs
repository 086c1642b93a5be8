//! Ads Reporting API Library
//!
//! This library provides the core functionality for the ads reporting
//! service: rate-limited Google Ads and Meta clients, conversion-action
//! classification, per-channel metric aggregation, and the orchestrated
//! multi-account report pipeline that feeds a Google Sheet.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `aggregator`: Channel bucketing and derived metric computation.
//! - `circuit_breaker`: Circuit breaker implementation.
//! - `classifier`: Conversion-action classification.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `google_ads`: Google Ads search client.
//! - `handlers`: HTTP request handlers.
//! - `meta_ads`: Meta Graph insights client.
//! - `models`: Core data models.
//! - `orchestrator`: Multi-account report pipeline.
//! - `retry`: Backoff tables and the retry loop.
//! - `rules`: Classification rule sets.
//! - `sheets`: Spreadsheet cell resolution and writes.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod aggregator;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod google_ads;
pub mod handlers;
pub mod meta_ads;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod rules;
pub mod sheets;
