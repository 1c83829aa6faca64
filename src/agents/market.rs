//! Market data agent backed by the Alpha Vantage REST API
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! A quote is mandatory; the company overview only enriches it.

use crate::agents::MarketDataAgent;
use crate::error::OrchestrationError;
use crate::models::MarketData;
use crate::retry::unavailable;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// GLOBAL_QUOTE keys → field names. `true` marks numeric fields.
const QUOTE_FIELDS: &[(&str, &str, bool)] = &[
    ("01. symbol", "symbol", false),
    ("02. open", "open", true),
    ("03. high", "high", true),
    ("04. low", "low", true),
    ("05. price", "price", true),
    ("06. volume", "volume", true),
    ("07. latest trading day", "latest_trading_day", false),
    ("08. previous close", "previous_close", true),
    ("09. change", "change", true),
    ("10. change percent", "change_percent", true),
];

const OVERVIEW_FIELDS: &[(&str, &str, bool)] = &[
    ("Name", "name", false),
    ("Sector", "sector", false),
    ("PERatio", "pe_ratio", true),
    ("PEGRatio", "peg_ratio", true),
    ("EPS", "eps", true),
    ("MarketCapitalization", "market_cap", true),
    ("DividendYield", "dividend_yield", true),
    ("BookValue", "book_value", true),
    ("ProfitMargin", "profit_margin", true),
    ("52WeekHigh", "week52_high", true),
    ("52WeekLow", "week52_low", true),
];

pub struct AlphaVantageAgent {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageAgent {
    pub fn new(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| unavailable("Alpha Vantage", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OrchestrationError::NotFound(format!(
                "Alpha Vantage has no {} for {}",
                function, symbol
            )));
        }
        if !status.is_success() {
            return Err(unavailable(
                "Alpha Vantage",
                format!("{} returned {}", function, status),
            ));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| unavailable("Alpha Vantage", format!("invalid JSON: {}", e)))?;

        debug!(function, symbol, "Alpha Vantage response received");

        check_envelope(&body, symbol)?;
        Ok(body)
    }
}

#[async_trait]
impl MarketDataAgent for AlphaVantageAgent {
    async fn fetch_market_data(&self, instrument_id: &str) -> Result<MarketData> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(
                "ALPHA_VANTAGE_API_KEY is not configured".to_string(),
            ));
        }

        let symbol = instrument_id.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(OrchestrationError::InputError(
                "empty instrument id".to_string(),
            ));
        }

        let quote = self.query("GLOBAL_QUOTE", &symbol).await?;
        let mut fields = parse_global_quote(&quote, &symbol)?;

        match self.query("OVERVIEW", &symbol).await {
            Ok(overview) => fields.extend(parse_overview(&overview)),
            Err(e) => warn!(symbol = %symbol, error = %e, "Company overview unavailable, continuing with quote only"),
        }

        info!(symbol = %symbol, field_count = fields.len(), "Market data fetched");

        Ok(MarketData {
            instrument_id: symbol,
            fields,
            timestamp: Utc::now(),
        })
    }
}

/// Map Alpha Vantage's in-band error envelopes onto error kinds
fn check_envelope(body: &Value, symbol: &str) -> Result<()> {
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        return Err(OrchestrationError::NotFound(format!(
            "unrecognized instrument {}: {}",
            symbol, message
        )));
    }

    // Rate limiting arrives as a 200 with a "Note" or "Information" message
    for key in ["Note", "Information"] {
        if let Some(message) = body.get(key).and_then(Value::as_str) {
            return Err(unavailable("Alpha Vantage", message));
        }
    }

    Ok(())
}

fn parse_global_quote(body: &Value, symbol: &str) -> Result<BTreeMap<String, Value>> {
    let quote = body
        .get("Global Quote")
        .and_then(Value::as_object)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| OrchestrationError::NotFound(format!("no quote for {}", symbol)))?;

    let fields = extract_fields(quote, QUOTE_FIELDS);

    if !fields.contains_key("price") {
        return Err(OrchestrationError::NotFound(format!(
            "quote for {} has no price",
            symbol
        )));
    }

    Ok(fields)
}

fn parse_overview(body: &Value) -> BTreeMap<String, Value> {
    match body.as_object() {
        Some(overview) if overview.contains_key("Symbol") => extract_fields(overview, OVERVIEW_FIELDS),
        _ => BTreeMap::new(),
    }
}

fn extract_fields(source: &Map<String, Value>, mapping: &[(&str, &str, bool)]) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();

    for (key, name, numeric) in mapping {
        let Some(raw) = source.get(*key).and_then(Value::as_str) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() || raw == "None" || raw == "-" {
            continue;
        }

        if *numeric {
            if let Some(number) = parse_number(raw) {
                fields.insert(name.to_string(), json!(number));
            }
        } else {
            fields.insert(name.to_string(), json!(raw));
        }
    }

    fields
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim_end_matches('%')
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote_fixture() -> Value {
        json!({
            "Global Quote": {
                "01. symbol": "AAPL",
                "02. open": "187.1500",
                "03. high": "190.3200",
                "04. low": "186.8000",
                "05. price": "189.8400",
                "06. volume": "52164536",
                "07. latest trading day": "2024-05-10",
                "08. previous close": "188.6100",
                "09. change": "1.2300",
                "10. change percent": "0.6521%"
            }
        })
    }

    #[test]
    fn test_parse_global_quote() {
        let fields = parse_global_quote(&quote_fixture(), "AAPL").unwrap();
        assert_eq!(fields["price"], json!(189.84));
        assert_eq!(fields["change_percent"], json!(0.6521));
        assert_eq!(fields["latest_trading_day"], json!("2024-05-10"));
        assert_eq!(fields["symbol"], json!("AAPL"));
    }

    #[test]
    fn test_empty_quote_is_not_found() {
        let body = json!({ "Global Quote": {} });
        let err = parse_global_quote(&body, "ZZZZ").unwrap_err();
        assert!(matches!(err, OrchestrationError::NotFound(_)));
    }

    #[test]
    fn test_parse_overview_skips_placeholders() {
        let body = json!({
            "Symbol": "AAPL",
            "Name": "Apple Inc",
            "PERatio": "29.45",
            "PEGRatio": "None",
            "MarketCapitalization": "2,912,000,000,000",
            "DividendYield": "-"
        });
        let fields = parse_overview(&body);
        assert_eq!(fields["pe_ratio"], json!(29.45));
        assert_eq!(fields["market_cap"], json!(2_912_000_000_000.0));
        assert_eq!(fields["name"], json!("Apple Inc"));
        assert!(!fields.contains_key("peg_ratio"));
        assert!(!fields.contains_key("dividend_yield"));

        assert!(parse_overview(&json!({})).is_empty());
    }

    #[test]
    fn test_envelope_errors() {
        let missing = json!({ "Error Message": "Invalid API call." });
        assert!(matches!(
            check_envelope(&missing, "ZZZZ"),
            Err(OrchestrationError::NotFound(_))
        ));

        let throttled = json!({ "Note": "API call frequency exceeded" });
        let err = check_envelope(&throttled, "AAPL").unwrap_err();
        assert!(err.is_retryable());

        assert!(check_envelope(&quote_fixture(), "AAPL").is_ok());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let agent = AlphaVantageAgent::new(String::new(), DEFAULT_ALPHA_VANTAGE_URL.into()).unwrap();
        let err = agent.fetch_market_data("AAPL").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));
        assert!(!err.is_retryable());
    }
}
