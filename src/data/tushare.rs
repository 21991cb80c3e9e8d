//! Tushare Pro adapter (licensed terminal feed).
//!
//! Requires an API token. The HTTP interface is a single POST endpoint
//! taking `{api_name, token, params, fields}` and answering with a
//! column-name/row-array table.
//!
//! Tushare serves volume in hands (lots of 100 shares) and amounts in
//! thousands of yuan; both are normalized to shares/yuan here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::provider::{ProviderError, QuoteProvider};
use super::{market_for_symbol, Candle, Market, Period, Snapshot};

/// Tushare Pro endpoint
const API_URL: &str = "https://api.tushare.pro";

/// Tushare auth error code
const CODE_AUTH: i64 = 2002;

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Convert a six-digit code to tushare ts_code format ("600519.SH").
fn to_ts_code(symbol: &str) -> Option<String> {
    let suffix = match market_for_symbol(symbol)? {
        Market::ShanghaiMain | Market::Star => "SH",
        Market::ShenzhenMain | Market::ChiNext => "SZ",
    };
    Some(format!("{}.{}", symbol, suffix))
}

/// Tushare api_name for a candle periodicity.
fn period_api(period: Period) -> &'static str {
    match period {
        Period::Daily => "daily",
        Period::Weekly => "weekly",
        Period::Monthly => "monthly",
    }
}

/// Parse a tushare trade_date ("20240102") to a UTC timestamp at market
/// close (15:00 CST).
fn parse_trade_date(s: &str) -> Result<DateTime<Utc>, ProviderError> {
    let date = NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| ProviderError::Malformed(format!("bad trade_date '{}': {}", s, e)))?;
    let close = date
        .and_hms_opt(15, 0, 0)
        .ok_or_else(|| ProviderError::Malformed(format!("bad trade_date '{}'", s)))?;
    Ok(close.and_utc() - chrono::Duration::hours(8))
}

// ============================================================================
// Tushare Provider
// ============================================================================

/// Tushare Pro quote provider.
pub struct TushareProvider {
    client: reqwest::Client,
    token: String,
}

impl TushareProvider {
    pub fn new(token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            token: token.into(),
        }
    }

    /// Issue one tushare API call and index the response table by column name.
    async fn call(
        &self,
        api_name: &str,
        params: Value,
        fields: &str,
    ) -> Result<Vec<HashMap<String, Value>>, ProviderError> {
        let payload = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });

        debug!(api_name, "calling tushare");

        let response = self.client.post(API_URL).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: TushareResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.code != 0 {
            let msg = body.msg.unwrap_or_default();
            return if body.code == CODE_AUTH {
                Err(ProviderError::Auth(msg))
            } else {
                Err(ProviderError::DataNotAvailable(format!(
                    "tushare code {}: {}",
                    body.code, msg
                )))
            };
        }

        let Some(data) = body.data else {
            return Ok(Vec::new());
        };

        let rows = data
            .items
            .into_iter()
            .map(|item| data.fields.iter().cloned().zip(item).collect())
            .collect();
        Ok(rows)
    }

    /// Fetch the most recent bars for a symbol, newest first.
    async fn recent_bars(
        &self,
        symbol: &str,
        period: Period,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<HashMap<String, Value>>, ProviderError> {
        let ts_code = to_ts_code(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid symbol: {}", symbol)))?;

        let mut params = json!({ "ts_code": ts_code });
        if let Some(d) = start {
            params["start_date"] = json!(d.format("%Y%m%d").to_string());
        }
        if let Some(d) = end {
            params["end_date"] = json!(d.format("%Y%m%d").to_string());
        }

        self.call(
            period_api(period),
            params,
            "trade_date,open,high,low,close,vol,amount,pct_chg",
        )
        .await
    }
}

fn row_f64(row: &HashMap<String, Value>, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn row_str<'a>(row: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    row.get(key)?.as_str()
}

// ============================================================================
// QuoteProvider Implementation
// ============================================================================

#[async_trait]
impl QuoteProvider for TushareProvider {
    fn name(&self) -> &'static str {
        "tushare"
    }

    /// Tushare has no market-wide real-time list; the chain falls through to
    /// the next provider for this operation.
    async fn market_snapshot(&self, market: Market) -> Result<Vec<Snapshot>, ProviderError> {
        Err(ProviderError::DataNotAvailable(format!(
            "tushare has no realtime market list for {}",
            market
        )))
    }

    async fn candles(
        &self,
        symbol: &str,
        period: Period,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, ProviderError> {
        let rows = self.recent_bars(symbol, period, start, end).await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(trade_date) = row_str(row, "trade_date") else {
                continue;
            };
            let (Some(open), Some(high), Some(low), Some(close)) = (
                row_f64(row, "open"),
                row_f64(row, "high"),
                row_f64(row, "low"),
                row_f64(row, "close"),
            ) else {
                continue;
            };
            let vol_hands = row_f64(row, "vol").unwrap_or(0.0).max(0.0);

            candles.push(Candle {
                timestamp: parse_trade_date(trade_date)?,
                open,
                high,
                low,
                close,
                volume: (vol_hands * 100.0) as u64,
            });
        }

        Ok(candles)
    }

    async fn single_quote(&self, symbol: &str) -> Result<Option<Snapshot>, ProviderError> {
        // Latest daily bar stands in for a live quote; tushare is the
        // mid-chain fallback, not the primary realtime source.
        let rows = self.recent_bars(symbol, Period::Daily, None, None).await?;
        let Some(latest) = rows.first() else {
            return Ok(None);
        };

        let vol_hands = row_f64(latest, "vol").unwrap_or(0.0).max(0.0);
        // amount is in thousands of yuan
        let amount_thousands = row_f64(latest, "amount").unwrap_or(0.0).max(0.0);

        Ok(Some(Snapshot {
            symbol: symbol.to_string(),
            display_name: String::new(),
            last_price: row_f64(latest, "close").unwrap_or(0.0).max(0.0),
            change_percent: row_f64(latest, "pct_chg").unwrap_or(0.0),
            volume: (vol_hands * 100.0) as u64,
            turnover: amount_thousands * 1000.0,
        }))
    }
}

// ============================================================================
// Tushare API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    msg: Option<String>,
    data: Option<TushareData>,
}

#[derive(Debug, Deserialize)]
struct TushareData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

// ============================================================================
// Tests
// ============================================================================
