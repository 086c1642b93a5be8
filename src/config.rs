use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub google_ads_base_url: String,
    pub google_ads_developer_token: String,
    pub google_ads_access_token: String,
    pub google_ads_login_customer_id: Option<String>,
    pub meta_base_url: String,
    pub meta_access_token: String,
    pub sheet_id: String,
    pub sheets_base_url: String,
    pub sheets_access_token: String,
    pub rules_path: String,
    pub sheet_layout_path: String,
    /// Maximum number of account pipelines running at once.
    pub max_concurrent_accounts: usize,
    /// Ceiling on pages followed per fetch, to bound a report run.
    pub fetch_page_limit: usize,
    /// Attempts per logical fetch before the account goes Fatal.
    pub fetch_max_attempts: u32,
    /// Per-HTTP-call timeout in seconds.
    pub fetch_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            google_ads_base_url: optional_url(
                "GOOGLE_ADS_BASE_URL",
                "https://googleads.googleapis.com/v16",
            )?,
            google_ads_developer_token: required_non_empty("GOOGLE_ADS_DEVELOPER_TOKEN")?,
            google_ads_access_token: required_non_empty("GOOGLE_ADS_ACCESS_TOKEN")?,
            google_ads_login_customer_id: std::env::var("GOOGLE_ADS_LOGIN_CUSTOMER_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            meta_base_url: optional_url("META_BASE_URL", "https://graph.facebook.com/v19.0")?,
            meta_access_token: required_non_empty("META_ACCESS_TOKEN")?,
            sheet_id: required_non_empty("GOOGLE_SHEET_ID")?,
            sheets_base_url: optional_url(
                "SHEETS_BASE_URL",
                "https://sheets.googleapis.com/v4",
            )?,
            sheets_access_token: required_non_empty("SHEETS_ACCESS_TOKEN")?,
            rules_path: std::env::var("RULES_PATH")
                .unwrap_or_else(|_| "config/classification_rules.json".to_string()),
            sheet_layout_path: std::env::var("SHEET_LAYOUT_PATH")
                .unwrap_or_else(|_| "config/sheet_layout.json".to_string()),
            max_concurrent_accounts: std::env::var("MAX_CONCURRENT_ACCOUNTS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_CONCURRENT_ACCOUNTS must be a number"))
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("MAX_CONCURRENT_ACCOUNTS must be at least 1");
                    }
                    Ok(n)
                })?,
            fetch_page_limit: std::env::var("FETCH_PAGE_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FETCH_PAGE_LIMIT must be a number"))?,
            fetch_max_attempts: std::env::var("FETCH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FETCH_MAX_ATTEMPTS must be a number"))?,
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FETCH_TIMEOUT_SECS must be a number"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Google Ads base URL: {}", config.google_ads_base_url);
        tracing::debug!("Meta base URL: {}", config.meta_base_url);
        tracing::debug!("Rules path: {}", config.rules_path);
        tracing::debug!(
            "Concurrency: {} accounts, {} pages/fetch, {} attempts",
            config.max_concurrent_accounts,
            config.fetch_page_limit,
            config.fetch_max_attempts
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required_non_empty(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional_url(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}
