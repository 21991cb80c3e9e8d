//! Tencent quote adapter (community API, last entry in the default chain).
//!
//! Realtime quotes come from qt.gtimg.cn as `~`-separated text, K-lines from
//! the ifzq.gtimg.cn JSON API. No key required. Tencent cannot enumerate a
//! whole market segment, so `market_snapshot` always falls through.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{ProviderError, QuoteProvider};
use super::{market_for_symbol, Candle, Market, Period, Snapshot};

/// Realtime quote endpoint (plain text response)
const QUOTE_URL: &str = "https://qt.gtimg.cn/q=";

/// K-line endpoint (JSON response)
const KLINE_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";

/// Bars requested when no explicit range is given
const DEFAULT_KLINE_COUNT: usize = 320;

// ============================================================================
// Symbol / Parameter Mapping
// ============================================================================

/// Convert a six-digit code to tencent format ("sh600519" / "sz000001").
fn to_tencent_code(symbol: &str) -> Option<String> {
    let prefix = match market_for_symbol(symbol)? {
        Market::ShanghaiMain | Market::Star => "sh",
        Market::ShenzhenMain | Market::ChiNext => "sz",
    };
    Some(format!("{}{}", prefix, symbol))
}

/// Tencent period keyword.
fn period_keyword(period: Period) -> &'static str {
    match period {
        Period::Daily => "day",
        Period::Weekly => "week",
        Period::Monthly => "month",
    }
}

/// Parse a tencent bar date ("2024-01-02") to a UTC timestamp at market
/// close (15:00 CST).
fn parse_bar_date(s: &str) -> Result<DateTime<Utc>, ProviderError> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| ProviderError::Malformed(format!("bad bar date '{}': {}", s, e)))?;
    let close = date
        .and_hms_opt(15, 0, 0)
        .ok_or_else(|| ProviderError::Malformed(format!("bad bar date '{}'", s)))?;
    Ok(close.and_utc() - chrono::Duration::hours(8))
}

/// Parse one realtime quote line.
///
/// Shape: `v_sh600519="1~贵州茅台~600519~1700.00~...";` with `~`-separated
/// fields. Field 1 is the name, 3 the price, 32 the change percent, 36 the
/// volume in hands, 37 the turnover in units of 10,000 yuan.
fn parse_quote_line(symbol: &str, line: &str) -> Option<Snapshot> {
    let quoted = line.split('"').nth(1)?;
    let fields: Vec<&str> = quoted.split('~').collect();
    if fields.len() < 38 {
        return None;
    }

    let last_price: f64 = fields[3].parse().unwrap_or(0.0);
    let change_percent: f64 = fields[32].parse().unwrap_or(0.0);
    let volume_hands: f64 = fields[36].parse().unwrap_or(0.0);
    let turnover_wan: f64 = fields[37].parse().unwrap_or(0.0);

    Some(Snapshot {
        symbol: symbol.to_string(),
        display_name: fields[1].to_string(),
        last_price: last_price.max(0.0),
        change_percent,
        volume: (volume_hands.max(0.0) * 100.0) as u64,
        turnover: turnover_wan.max(0.0) * 10_000.0,
    })
}

// ============================================================================
// Tencent Provider
// ============================================================================

/// Tencent quote provider.
pub struct TencentProvider {
    client: reqwest::Client,
}

impl TencentProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }
}

impl Default for TencentProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// QuoteProvider Implementation
// ============================================================================

#[async_trait]
impl QuoteProvider for TencentProvider {
    fn name(&self) -> &'static str {
        "tencent"
    }

    async fn market_snapshot(&self, market: Market) -> Result<Vec<Snapshot>, ProviderError> {
        Err(ProviderError::DataNotAvailable(format!(
            "tencent has no market list for {}",
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
        let code = to_tencent_code(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid symbol: {}", symbol)))?;
        let keyword = period_keyword(period);

        let end_str = end.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let url = format!(
            "{}?param={},{},{},{},{},qfq",
            KLINE_URL,
            code,
            keyword,
            start
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            end_str,
            DEFAULT_KLINE_COUNT,
        );

        debug!(symbol, period = %period, "fetching kline from tencent");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        // Adjusted bars live under "qfq_day"/"qfq_week"/..., unadjusted
        // fall back to the plain keyword.
        let per_symbol = body
            .get("data")
            .and_then(|d| d.get(&code))
            .ok_or_else(|| ProviderError::Malformed("missing symbol data".into()))?;
        let bars = per_symbol
            .get(format!("qfq_{}", keyword))
            .or_else(|| per_symbol.get(keyword))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut candles = Vec::with_capacity(bars.len());
        for bar in &bars {
            // [date, open, close, high, low, volume_hands, ...]
            let Some(fields) = bar.as_array() else {
                continue;
            };
            if fields.len() < 6 {
                warn!(symbol, "short tencent bar, skipping");
                continue;
            }
            let Some(date) = fields[0].as_str() else {
                continue;
            };
            let nums: Vec<f64> = fields[1..6]
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .collect();
            if nums.len() < 5 {
                warn!(symbol, "non-numeric tencent bar, skipping");
                continue;
            }

            candles.push(Candle {
                timestamp: parse_bar_date(date)?,
                open: nums[0],
                close: nums[1],
                high: nums[2],
                low: nums[3],
                volume: (nums[4].max(0.0) * 100.0) as u64,
            });
        }

        Ok(candles)
    }

    async fn single_quote(&self, symbol: &str) -> Result<Option<Snapshot>, ProviderError> {
        let code = to_tencent_code(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid symbol: {}", symbol)))?;
        let url = format!("{}{}", QUOTE_URL, code);

        debug!(symbol, "fetching quote from tencent");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        // An unknown symbol answers with v_pv_none
        if text.contains("v_pv_none") {
            return Ok(None);
        }

        Ok(parse_quote_line(symbol, &text))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_tencent_code() {
        assert_eq!(to_tencent_code("600519"), Some("sh600519".to_string()));
        assert_eq!(to_tencent_code("688981"), Some("sh688981".to_string()));
        assert_eq!(to_tencent_code("000001"), Some("sz000001".to_string()));
        assert_eq!(to_tencent_code("300750"), Some("sz300750".to_string()));
        assert_eq!(to_tencent_code("xx"), None);
    }

    #[test]
    fn test_parse_quote_line() {
        // 38 fields with the ones we read populated
        let mut fields = vec!["0"; 40];
        fields[1] = "贵州茅台";
        fields[2] = "600519";
        fields[3] = "1700.50";
        fields[32] = "1.25";
        fields[36] = "25000";
        fields[37] = "425000";
        let line = format!("v_sh600519=\"{}\";", fields.join("~"));

        let snapshot = parse_quote_line("600519", &line).unwrap();
        assert_eq!(snapshot.display_name, "贵州茅台");
        assert!((snapshot.last_price - 1700.50).abs() < f64::EPSILON);
        assert!((snapshot.change_percent - 1.25).abs() < f64::EPSILON);
        // 25,000 hands = 2,500,000 shares
        assert_eq!(snapshot.volume, 2_500_000);
        // 425,000 万元 = 4.25e9 yuan
        assert!((snapshot.turnover - 4_250_000_000.0).abs() < 1.0);
    }

    #[test]
    fn test_parse_quote_line_too_short() {
        assert!(parse_quote_line("600519", "v_sh600519=\"1~a~b\";").is_none());
        assert!(parse_quote_line("600519", "garbage").is_none());
    }

    #[test]
    fn test_market_snapshot_not_supported() {
        let provider = TencentProvider::new();
        let result = tokio_test::block_on(provider.market_snapshot(Market::ShanghaiMain));
        assert!(matches!(result, Err(ProviderError::DataNotAvailable(_))));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_quote_live() {
        let provider = TencentProvider::new();
        let quote = provider.single_quote("000001").await.unwrap();
        assert!(quote.is_some());
    }
}
