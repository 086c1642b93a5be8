use anyhow::Result;
use chrono::NaiveDate;
use rust_ads_report::config::Config;
use rust_ads_report::google_ads::GoogleAdsClient;
use rust_ads_report::meta_ads::MetaAdsClient;
use rust_ads_report::models::{AccountSpec, DateRange, Platform, ReportRequest};
use rust_ads_report::orchestrator::Orchestrator;
use rust_ads_report::rules::RuleBook;
use std::sync::Arc;

/// One-off batch run from the command line, without the HTTP server.
///
/// Usage: cargo run --example batch_report -- <google_customer_id> <since> <until>
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Batch Ads Report ===\n");

    let mut args = std::env::args().skip(1);
    let account_id = args.next().expect("customer id argument required");
    let since: NaiveDate = args
        .next()
        .expect("since date argument required (YYYY-MM-DD)")
        .parse()?;
    let until: NaiveDate = args
        .next()
        .expect("until date argument required (YYYY-MM-DD)")
        .parse()?;

    let config = Config::from_env()?;
    let rules = Arc::new(RuleBook::load(&config.rules_path)?);
    let google = Arc::new(GoogleAdsClient::new(&config)?);
    let meta = Arc::new(MetaAdsClient::new(&config)?);
    let orchestrator = Arc::new(Orchestrator::new(
        google,
        meta,
        rules,
        config.max_concurrent_accounts,
    ));

    let request = ReportRequest {
        accounts: vec![AccountSpec {
            account_id: account_id.clone(),
            platform: Platform::GoogleAds,
            name: None,
            worksheet: None,
        }],
        date_range: DateRange { since, until },
        selected_metrics: vec![],
        worksheet: String::new(),
        month: String::new(),
        deadline_secs: None,
    };

    println!("Running report for {} ({} .. {})\n", account_id, since, until);
    let batch = orchestrator.run_batch(&request).await;

    for outcome in &batch.successes {
        println!("✓ Account {}:", outcome.account_id);
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        if !outcome.unmatched_actions.is_empty() {
            println!("  Unmatched actions: {:?}", outcome.unmatched_actions);
        }
    }
    for outcome in &batch.failures {
        println!(
            "✗ Account {}: {}",
            outcome.account_id,
            outcome.failure_reason.as_deref().unwrap_or("unknown")
        );
    }

    println!(
        "\nDone: {} succeeded, {} failed",
        batch.successes.len(),
        batch.failures.len()
    );
    Ok(())
}
