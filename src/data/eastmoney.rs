//! Eastmoney adapter for A-share quotes and K-lines.
//!
//! Free quote service, no API key required. First entry in the default
//! provider chain.
//!
//! # Data sources
//! - Market list: push2.eastmoney.com `clist` API
//! - K-line history: push2his.eastmoney.com
//! - Single quote: push2.eastmoney.com `stock/get` API

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{ProviderError, QuoteProvider};
use super::{market_for_symbol, Candle, Market, Period, Snapshot};

// ============================================================================
// Constants
// ============================================================================

/// Market-wide quote list API
const LIST_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";

/// Historical K-line API
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

/// Single real-time quote API
const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";

/// Rows per market list page
const LIST_PAGE_SIZE: usize = 1000;

// ============================================================================
// Symbol / Parameter Mapping
// ============================================================================

/// Convert a six-digit code to eastmoney secid format.
///
/// Shanghai-listed codes (main board and STAR) use market "1", Shenzhen
/// (main board and ChiNext) use "0": "600519" -> "1.600519".
fn to_secid(symbol: &str) -> Option<String> {
    let market = match market_for_symbol(symbol)? {
        Market::ShanghaiMain | Market::Star => "1",
        Market::ShenzhenMain | Market::ChiNext => "0",
    };
    Some(format!("{}.{}", market, symbol))
}

/// Eastmoney `fs` filter expression for one market segment.
fn market_filter(market: Market) -> &'static str {
    match market {
        Market::ShanghaiMain => "m:1+t:2",
        Market::ShenzhenMain => "m:0+t:6",
        Market::ChiNext => "m:0+t:80",
        Market::Star => "m:1+t:23",
    }
}

/// Convert a period to the eastmoney klt parameter.
fn period_to_klt(period: Period) -> i32 {
    match period {
        Period::Daily => 101,
        Period::Weekly => 102,
        Period::Monthly => 103,
    }
}

/// Parse an eastmoney trading-day string ("2024-01-02") to a UTC timestamp
/// at market close (15:00 CST).
fn parse_trading_day(s: &str) -> Result<DateTime<Utc>, ProviderError> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| ProviderError::Malformed(format!("bad kline date '{}': {}", s, e)))?;
    let close = date
        .and_hms_opt(15, 0, 0)
        .ok_or_else(|| ProviderError::Malformed(format!("bad kline date '{}'", s)))?;
    // China is UTC+8
    Ok(close.and_utc() - chrono::Duration::hours(8))
}

/// Numeric field that eastmoney serves as a number, or as "-" while a stock
/// is suspended.
fn field_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Eastmoney Provider
// ============================================================================

/// Eastmoney quote provider.
pub struct EastmoneyProvider {
    client: reqwest::Client,
}

impl EastmoneyProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    /// Map one clist row to a canonical snapshot.
    ///
    /// Eastmoney reports volume in hands (lots of 100 shares) and turnover
    /// in yuan; the hand conversion happens here, nowhere downstream.
    fn parse_list_row(row: &ListRow) -> Option<Snapshot> {
        let last_price = field_f64(&row.price).unwrap_or(0.0).max(0.0);
        let change_percent = field_f64(&row.change_percent).unwrap_or(0.0);
        let volume_hands = field_f64(&row.volume).unwrap_or(0.0).max(0.0);
        let turnover = field_f64(&row.turnover).unwrap_or(0.0).max(0.0);

        Some(Snapshot {
            symbol: row.code.clone()?,
            display_name: row.name.clone().unwrap_or_default(),
            last_price,
            change_percent,
            volume: (volume_hands * 100.0) as u64,
            turnover,
        })
    }
}

impl Default for EastmoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// QuoteProvider Implementation
// ============================================================================

#[async_trait]
impl QuoteProvider for EastmoneyProvider {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn market_snapshot(&self, market: Market) -> Result<Vec<Snapshot>, ProviderError> {
        let url = format!(
            "{}?pn=1&pz={}&po=1&np=1&fltt=2&fid=f3&fs={}&fields=f2,f3,f5,f6,f12,f14",
            LIST_URL,
            LIST_PAGE_SIZE,
            market_filter(market),
        );

        debug!(market = %market, "fetching market list from eastmoney");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let rows = body.data.map(|d| d.diff).unwrap_or_default();
        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::parse_list_row(row) {
                Some(snapshot) => snapshots.push(snapshot),
                None => warn!(market = %market, "list row without code, skipping"),
            }
        }
        Ok(snapshots)
    }

    async fn candles(
        &self,
        symbol: &str,
        period: Period,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, ProviderError> {
        let secid = to_secid(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid symbol: {}", symbol)))?;

        let beg = start
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "0".to_string());
        let end = end
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "20500101".to_string());

        // fqt=1: forward-adjusted prices
        let url = format!(
            "{}?secid={}&klt={}&fqt=1&beg={}&end={}&fields1=f1,f2,f3&fields2=f51,f52,f53,f54,f55,f56",
            KLINE_URL,
            secid,
            period_to_klt(period),
            beg,
            end,
        );

        debug!(symbol, period = %period, "fetching kline from eastmoney");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: KlineResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let klines = body.data.and_then(|d| d.klines).unwrap_or_default();
        let mut candles = Vec::with_capacity(klines.len());
        for line in &klines {
            // Format: "2024-01-02,open,close,high,low,volume"
            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 6 {
                warn!(line = line.as_str(), "short kline row, skipping");
                continue;
            }

            let timestamp = parse_trading_day(parts[0])?;
            let open: f64 = parts[1]
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad open: {}", parts[1])))?;
            let close: f64 = parts[2]
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad close: {}", parts[2])))?;
            let high: f64 = parts[3]
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad high: {}", parts[3])))?;
            let low: f64 = parts[4]
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad low: {}", parts[4])))?;
            let volume_hands: f64 = parts[5]
                .parse()
                .map_err(|_| ProviderError::Malformed(format!("bad volume: {}", parts[5])))?;

            candles.push(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume: (volume_hands.max(0.0) * 100.0) as u64,
            });
        }

        Ok(candles)
    }

    async fn single_quote(&self, symbol: &str) -> Result<Option<Snapshot>, ProviderError> {
        let secid = to_secid(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid symbol: {}", symbol)))?;

        let url = format!(
            "{}?secid={}&fltt=2&fields=f43,f47,f48,f57,f58,f170",
            QUOTE_URL, secid,
        );

        debug!(symbol, "fetching single quote from eastmoney");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let Some(data) = body.data else {
            return Ok(None);
        };

        let volume_hands = field_f64(&data.volume).unwrap_or(0.0).max(0.0);
        Ok(Some(Snapshot {
            symbol: data.code.unwrap_or_else(|| symbol.to_string()),
            display_name: data.name.unwrap_or_default(),
            last_price: field_f64(&data.price).unwrap_or(0.0).max(0.0),
            change_percent: field_f64(&data.change_percent).unwrap_or(0.0),
            volume: (volume_hands * 100.0) as u64,
            turnover: field_f64(&data.turnover).unwrap_or(0.0).max(0.0),
        }))
    }
}

// ============================================================================
// Eastmoney API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    diff: Vec<ListRow>,
}

#[derive(Debug, Deserialize)]
struct ListRow {
    /// f12: stock code
    #[serde(rename = "f12")]
    code: Option<String>,
    /// f14: display name
    #[serde(rename = "f14")]
    name: Option<String>,
    /// f2: last price
    #[serde(rename = "f2", default)]
    price: Value,
    /// f3: change percent
    #[serde(rename = "f3", default)]
    change_percent: Value,
    /// f5: volume in hands
    #[serde(rename = "f5", default)]
    volume: Value,
    /// f6: turnover in yuan
    #[serde(rename = "f6", default)]
    turnover: Value,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    /// f57: stock code
    #[serde(rename = "f57")]
    code: Option<String>,
    /// f58: display name
    #[serde(rename = "f58")]
    name: Option<String>,
    /// f43: last price
    #[serde(rename = "f43", default)]
    price: Value,
    /// f170: change percent
    #[serde(rename = "f170", default)]
    change_percent: Value,
    /// f47: volume in hands
    #[serde(rename = "f47", default)]
    volume: Value,
    /// f48: turnover in yuan
    #[serde(rename = "f48", default)]
    turnover: Value,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_to_secid() {
        assert_eq!(to_secid("600519"), Some("1.600519".to_string()));
        assert_eq!(to_secid("688981"), Some("1.688981".to_string()));
        assert_eq!(to_secid("000001"), Some("0.000001".to_string()));
        assert_eq!(to_secid("300750"), Some("0.300750".to_string()));
        assert_eq!(to_secid("INVALID"), None);
    }

    #[test]
    fn test_period_to_klt() {
        assert_eq!(period_to_klt(Period::Daily), 101);
        assert_eq!(period_to_klt(Period::Weekly), 102);
        assert_eq!(period_to_klt(Period::Monthly), 103);
    }

    #[test]
    fn test_parse_trading_day() {
        let dt = parse_trading_day("2024-01-02").unwrap();
        // 15:00 CST = 07:00 UTC
        assert_eq!(dt.hour(), 7);
        assert!(parse_trading_day("not-a-date").is_err());
    }

    #[test]
    fn test_field_f64_accepts_suspended_marker() {
        assert_eq!(field_f64(&serde_json::json!(12.5)), Some(12.5));
        assert_eq!(field_f64(&serde_json::json!("12.5")), Some(12.5));
        assert_eq!(field_f64(&serde_json::json!("-")), None);
        assert_eq!(field_f64(&Value::Null), None);
    }

    #[test]
    fn test_parse_list_row_converts_hands() {
        let row: ListRow = serde_json::from_value(serde_json::json!({
            "f12": "600519",
            "f14": "贵州茅台",
            "f2": 1700.0,
            "f3": 1.25,
            "f5": 25_000,
            "f6": 4_250_000_000.0,
        }))
        .unwrap();

        let snapshot = EastmoneyProvider::parse_list_row(&row).unwrap();
        assert_eq!(snapshot.symbol, "600519");
        // 25,000 hands = 2,500,000 shares
        assert_eq!(snapshot.volume, 2_500_000);
        assert!((snapshot.last_price - 1700.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_list_row_suspended_stock() {
        let row: ListRow = serde_json::from_value(serde_json::json!({
            "f12": "600001",
            "f14": "suspended",
            "f2": "-",
            "f3": "-",
            "f5": "-",
            "f6": "-",
        }))
        .unwrap();

        let snapshot = EastmoneyProvider::parse_list_row(&row).unwrap();
        // suspended rows normalize to the "unknown" price of 0.0
        assert_eq!(snapshot.last_price, 0.0);
        assert_eq!(snapshot.volume, 0);
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_daily_candles_live() {
        let provider = EastmoneyProvider::new();
        let candles = provider
            .candles("000001", Period::Daily, None, None)
            .await
            .unwrap();
        assert!(!candles.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_market_snapshot_live() {
        let provider = EastmoneyProvider::new();
        let rows = provider.market_snapshot(Market::ShanghaiMain).await.unwrap();
        assert!(!rows.is_empty());
    }
}
