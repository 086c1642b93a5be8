use crate::config::Config;
use crate::errors::AppError;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

/// One resolved spreadsheet write: an A1 cell reference and the value to put
/// there.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub cell_reference: String,
    pub value: Value,
}

/// Maps a (worksheet, metric, month) triple to an A1 cell reference.
///
/// Layout knowledge lives behind this trait so the pipeline never hardcodes
/// spreadsheet geometry.
pub trait CellResolver {
    fn resolve(&self, worksheet: &str, metric: &str, month: &str) -> Option<String>;
}

/// Resolver backed by two lookup tables: metric name to row, month label to
/// column letter. Matches the fixed-grid monthly report sheets.
#[derive(Debug, Clone, Default)]
pub struct StaticCellResolver {
    metric_rows: HashMap<String, u32>,
    month_columns: HashMap<String, String>,
}

impl StaticCellResolver {
    pub fn new(metric_rows: HashMap<String, u32>, month_columns: HashMap<String, String>) -> Self {
        Self {
            metric_rows,
            month_columns,
        }
    }

    /// Loads the layout from a JSON file with `metric_rows` and
    /// `month_columns` tables.
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        #[derive(serde::Deserialize)]
        struct LayoutFile {
            metric_rows: HashMap<String, u32>,
            month_columns: HashMap<String, String>,
        }

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read layout file {}: {}", path.display(), e))?;
        let file: LayoutFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid layout file {}: {}", path.display(), e))?;
        tracing::info!(
            "Sheet layout loaded: {} metric rows, {} month columns",
            file.metric_rows.len(),
            file.month_columns.len()
        );
        Ok(Self::new(file.metric_rows, file.month_columns))
    }
}

impl CellResolver for StaticCellResolver {
    fn resolve(&self, worksheet: &str, metric: &str, month: &str) -> Option<String> {
        let row = self.metric_rows.get(metric)?;
        let column = self.month_columns.get(month)?;
        Some(format!("'{}'!{}{}", worksheet, column, row))
    }
}

fn cell_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^'[^']+'![A-Z]{1,3}[1-9][0-9]*$").expect("valid cell reference pattern")
    })
}

/// Validates an A1 reference of the form `'Worksheet'!C12`.
pub fn is_valid_cell_reference(reference: &str) -> bool {
    cell_reference_pattern().is_match(reference)
}

/// Resolves the selected metrics into cell updates. Metrics the resolver
/// does not know (or that were not computed) are returned separately so the
/// caller can report them instead of silently dropping data.
pub fn plan_updates(
    resolver: &impl CellResolver,
    worksheet: &str,
    month: &str,
    selected_metrics: &[String],
    values: &BTreeMap<String, Value>,
) -> (Vec<CellUpdate>, Vec<String>) {
    let mut updates = Vec::new();
    let mut unresolved = Vec::new();

    for metric in selected_metrics {
        let value = match values.get(metric) {
            Some(v) => v.clone(),
            None => {
                unresolved.push(metric.clone());
                continue;
            }
        };
        match resolver.resolve(worksheet, metric, month) {
            Some(reference) if is_valid_cell_reference(&reference) => updates.push(CellUpdate {
                cell_reference: reference,
                value,
            }),
            _ => unresolved.push(metric.clone()),
        }
    }

    (updates, unresolved)
}

/// Sink for resolved cell updates.
pub trait SheetWriter {
    fn write_updates(
        &self,
        updates: &[CellUpdate],
    ) -> impl std::future::Future<Output = Result<usize, AppError>> + Send;
}

/// Client for the Google Sheets values endpoint.
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    sheet_id: String,
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.sheets_base_url.clone(),
            sheet_id: config.sheet_id.clone(),
            access_token: config.sheets_access_token.clone(),
        })
    }
}

impl SheetWriter for GoogleSheetsClient {
    /// Pushes all updates in one `values:batchUpdate` call with RAW input so
    /// the sheet shows exactly the computed numbers.
    async fn write_updates(&self, updates: &[CellUpdate]) -> Result<usize, AppError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let data: Vec<Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "range": u.cell_reference,
                    "values": [[u.value]]
                })
            })
            .collect();
        let body = json!({
            "valueInputOption": "RAW",
            "data": data
        });

        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.base_url, self.sheet_id
        );
        tracing::info!("Writing {} cell(s) to sheet {}", updates.len(), self.sheet_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Sheets batchUpdate returned {}: {}", status, text);
            return Err(AppError::FatalApi(format!("Sheets {}: {}", status, text)));
        }

        Ok(updates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticCellResolver {
        let mut rows = HashMap::new();
        rows.insert("Clics Search".to_string(), 5);
        rows.insert("Cout Google ADS".to_string(), 12);
        let mut columns = HashMap::new();
        columns.insert("Janvier".to_string(), "C".to_string());
        StaticCellResolver::new(rows, columns)
    }

    #[test]
    fn resolves_known_triples() {
        let r = resolver();
        assert_eq!(
            r.resolve("Suivi 2026", "Clics Search", "Janvier"),
            Some("'Suivi 2026'!C5".to_string())
        );
        assert_eq!(r.resolve("Suivi 2026", "Clics Search", "Mars"), None);
    }

    #[test]
    fn cell_reference_validation() {
        assert!(is_valid_cell_reference("'Suivi 2026'!C5"));
        assert!(is_valid_cell_reference("'Feuille 1'!AA120"));
        assert!(!is_valid_cell_reference("Suivi!C5"));
        assert!(!is_valid_cell_reference("'Suivi'!C0"));
        assert!(!is_valid_cell_reference("'Suivi'!5C"));
    }

    #[test]
    fn plan_separates_unresolved_metrics() {
        let mut values = BTreeMap::new();
        values.insert("Clics Search".to_string(), Value::from(42u64));
        values.insert("Cout Google ADS".to_string(), Value::from(10.5));

        let selected = vec![
            "Clics Search".to_string(),
            "Cout Google ADS".to_string(),
            "CPC Meta".to_string(),
        ];
        let (updates, unresolved) =
            plan_updates(&resolver(), "Suivi 2026", "Janvier", &selected, &values);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].cell_reference, "'Suivi 2026'!C5");
        assert_eq!(unresolved, vec!["CPC Meta".to_string()]);
    }
}
