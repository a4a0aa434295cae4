//! Sample dataset loading.
//!
//! Both loaders return errors rather than defaults; the analysis functions
//! decide what to fall back to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use popup_genius_core::config::ToolsConfig;
use popup_genius_core::error::{PopupGeniusError, Result};

/// Where the tools read their sample data from.
#[derive(Debug, Clone)]
pub struct DataSources {
    pub popup_data_path: PathBuf,
    pub transaction_data_path: PathBuf,
}

impl DataSources {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            popup_data_path: PathBuf::from(&config.popup_data_path),
            transaction_data_path: PathBuf::from(&config.transaction_data_path),
        }
    }
}

impl Default for DataSources {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// Historical popup metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupMetrics {
    pub optin_rate_pct: f64,
    pub popup_sales: f64,
    #[serde(default)]
    pub popup_conversion_rate: Option<f64>,
    pub list_growth: u64,
}

impl PopupMetrics {
    /// Built-in figures used when no dataset is available.
    pub fn fallback() -> Self {
        Self {
            optin_rate_pct: 10.4,
            popup_sales: 215_843.63,
            popup_conversion_rate: Some(17.22),
            list_growth: 2733,
        }
    }
}

#[derive(Deserialize)]
struct PopupDataFile {
    response: PopupMetrics,
}

/// Load `{"response": {...}}` popup metrics from a JSON file.
pub fn load_popup_metrics(path: &Path) -> Result<PopupMetrics> {
    let raw = std::fs::read_to_string(path)?;
    let file: PopupDataFile = serde_json::from_str(&raw)?;
    if file.response.optin_rate_pct <= 0.0 {
        return Err(PopupGeniusError::Tool(format!(
            "optin_rate_pct must be positive in {}",
            path.display()
        )));
    }
    Ok(file.response)
}

/// One product row from the 30-day transaction export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductSales {
    pub product_name: String,
    pub price: f64,
    pub units_sold_30d: f64,
    pub gross_sales_30d: f64,
}

/// Load product rows from a CSV export. Extra columns are ignored; column
/// order is taken from the header.
pub fn load_product_sales(path: &Path) -> Result<Vec<ProductSales>> {
    let raw = std::fs::read_to_string(path)?;
    parse_product_sales(&raw)
}

pub fn parse_product_sales(raw: &str) -> Result<Vec<ProductSales>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<ProductSales>, _>>()
        .map_err(|e| PopupGeniusError::Tool(format!("bad transaction data: {e}")))?;

    if rows.is_empty() {
        return Err(PopupGeniusError::Tool("transaction data has no rows".into()));
    }
    Ok(rows)
}
