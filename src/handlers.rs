use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{AccountOutcome, BatchReport, ReportRequest};
use crate::orchestrator::{outcome_metric_values, Orchestrator};
use crate::rules::RuleBook;
use crate::sheets::{plan_updates, CellResolver, GoogleSheetsClient, SheetWriter, StaticCellResolver};
use axum::{extract::State, http::StatusCode, Json};
use moka::future::Cache;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Classification rule sets, loaded once at startup.
    pub rules: Arc<RuleBook>,
    /// Batch pipeline runner.
    pub orchestrator: Arc<Orchestrator>,
    /// Spreadsheet write client.
    pub sheets: Arc<GoogleSheetsClient>,
    /// Spreadsheet layout: metric row and month column tables.
    pub resolver: Arc<StaticCellResolver>,
    /// Cache of finished report responses, keyed by the request signature.
    /// A hit skips both the platform fetches and the sheet writes.
    pub report_cache: Cache<String, String>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-ads-report",
            "version": "0.1.0"
        })),
    )
}

/// GET /api/v1/clients
///
/// Lists advertiser ids that carry their own classification rule set.
pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<Value> {
    let ids: Vec<String> = state
        .rules
        .advertiser_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(json!({ "advertisers": ids }))
}

/// What came out of pushing one batch's successful outcomes to the sheet.
/// A failed write for one account is reported here and never aborts the
/// writes of the remaining accounts.
#[derive(Debug, Default, Serialize)]
pub struct CellWriteSummary {
    pub cells_written: usize,
    /// Metrics per account that could not be placed on the sheet.
    pub unresolved_metrics: BTreeMap<String, Vec<String>>,
    /// Per-account write failures, keyed by account id.
    pub write_errors: BTreeMap<String, String>,
}

/// Writes every successful outcome's selected metrics to its worksheet.
///
/// Each account resolves its own tab (falling back to the request-level one)
/// and gets its own batchUpdate call, so one failure leaves the others'
/// cells written and reported.
pub async fn write_report_cells(
    writer: &impl SheetWriter,
    resolver: &impl CellResolver,
    request: &ReportRequest,
    successes: &[AccountOutcome],
) -> CellWriteSummary {
    let mut summary = CellWriteSummary::default();

    for outcome in successes {
        let worksheet = request
            .accounts
            .iter()
            .find(|a| a.account_id == outcome.account_id && a.platform == outcome.platform)
            .map(|a| a.worksheet_or(&request.worksheet))
            .unwrap_or(&request.worksheet);

        let values = outcome_metric_values(outcome);
        let (updates, missing) = plan_updates(
            resolver,
            worksheet,
            &request.month,
            &request.selected_metrics,
            &values,
        );
        if !missing.is_empty() {
            summary
                .unresolved_metrics
                .insert(outcome.account_id.clone(), missing);
        }

        let written = writer
            .write_updates(&updates)
            .await
            .with_context(|| format!("writing cells for account {}", outcome.account_id));
        match written {
            Ok(count) => summary.cells_written += count,
            Err(e) => {
                tracing::error!("{}", e);
                summary
                    .write_errors
                    .insert(outcome.account_id.clone(), e.to_string());
            }
        }
    }

    summary
}

/// POST /api/v1/reports
///
/// Runs the report pipeline for every requested account, writes the selected
/// metrics to the spreadsheet, and returns per-account outcomes. Accounts
/// that fail stay in the response with their partial data; only the request
/// itself being invalid produces an error status.
pub async fn run_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<Value>, AppError> {
    tracing::info!(
        "POST /api/v1/reports - {} account(s), {}..{}",
        request.accounts.len(),
        request.date_range.since,
        request.date_range.until
    );

    if request.accounts.is_empty() {
        return Err(AppError::BadRequest(
            "At least one account required".to_string(),
        ));
    }
    if request.date_range.since > request.date_range.until {
        return Err(AppError::BadRequest(
            "date_range.since must not be after date_range.until".to_string(),
        ));
    }

    let cache_key = request_signature(&request);
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        tracing::info!("Returning cached report for identical request");
        let value: Value = serde_json::from_str(&cached)
            .map_err(|e| AppError::InternalError(format!("Cached report parse: {}", e)))?;
        return Ok(Json(value));
    }

    let batch: BatchReport = Arc::clone(&state.orchestrator).run_batch(&request).await;
    let summary = write_report_cells(
        state.sheets.as_ref(),
        state.resolver.as_ref(),
        &request,
        &batch.successes,
    )
    .await;

    let response = json!({
        "successes": batch.successes,
        "failures": batch.failures,
        "cells_written": summary.cells_written,
        "unresolved_metrics": summary.unresolved_metrics,
        "write_errors": summary.write_errors,
    });

    // A run with failed writes is not cached; a retry should write again.
    if summary.write_errors.is_empty() {
        let serialized = serde_json::to_string(&response)
            .map_err(|e| AppError::InternalError(format!("Report serialize: {}", e)))?;
        state.report_cache.insert(cache_key, serialized).await;
    }

    Ok(Json(response))
}

fn request_signature(request: &ReportRequest) -> String {
    let mut ids: Vec<String> = request
        .accounts
        .iter()
        .map(|a| {
            format!(
                "{}:{}",
                a.account_id,
                a.worksheet.as_deref().unwrap_or_default()
            )
        })
        .collect();
    ids.sort_unstable();
    format!(
        "{}|{}|{}|{}|{}|{}",
        ids.join(","),
        request.date_range.since,
        request.date_range.until,
        request.selected_metrics.join(","),
        request.worksheet,
        request.month
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountSpec, DateRange, Platform};
    use chrono::NaiveDate;

    fn request(ids: &[&str]) -> ReportRequest {
        ReportRequest {
            accounts: ids
                .iter()
                .map(|id| AccountSpec {
                    account_id: id.to_string(),
                    platform: Platform::GoogleAds,
                    name: None,
                    worksheet: None,
                })
                .collect(),
            date_range: DateRange {
                since: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                until: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            },
            selected_metrics: vec!["Clics Search".to_string()],
            worksheet: "Suivi 2026".to_string(),
            month: "Janvier".to_string(),
            deadline_secs: None,
        }
    }

    #[test]
    fn signature_ignores_account_order() {
        let a = request_signature(&request(&["111", "222"]));
        let b = request_signature(&request(&["222", "111"]));
        assert_eq!(a, b);
    }

    #[test]
    fn signature_distinguishes_months() {
        let mut r = request(&["111"]);
        let a = request_signature(&r);
        r.month = "Février".to_string();
        assert_ne!(a, request_signature(&r));
    }

    #[test]
    fn signature_distinguishes_account_worksheets() {
        let mut r = request(&["111"]);
        let a = request_signature(&r);
        r.accounts[0].worksheet = Some("Client A".to_string());
        assert_ne!(a, request_signature(&r));
    }
}
