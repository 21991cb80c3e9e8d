//! Market screening pipeline.
//!
//! Walks the configured markets, pulls per-symbol candles through the
//! gateway, computes indicators and applies the acceptance rules. Symbol
//! level failures (empty candles, unknown price) skip the symbol and keep
//! the cycle going; only genuinely unexpected faults bubble up to the job
//! orchestrator.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::{market_for_symbol, Market, MarketDataGateway, Period, Snapshot};
use crate::indicators::{IndicatorEngine, IndicatorRow};
use crate::job::CancelToken;

use super::{Fundamentals, FundamentalsSource, ScreeningResult, SignalSet};

// ============================================================================
// Configuration
// ============================================================================

/// Which acceptance rule gates a market-wide screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSet {
    /// Technical signals only
    #[default]
    Technical,
    /// Fundamental quality rule only
    Fundamental,
    /// Both rules must accept
    Both,
}

impl RuleSet {
    fn accepts(&self, signals: &SignalSet, fundamentals: Option<&Fundamentals>) -> bool {
        let fundamental_pass = fundamentals.map(Fundamentals::passes).unwrap_or(false);
        match self {
            Self::Technical => signals.technical_pass(),
            Self::Fundamental => fundamental_pass,
            Self::Both => signals.technical_pass() && fundamental_pass,
        }
    }

    fn needs_fundamentals(&self) -> bool {
        matches!(self, Self::Fundamental | Self::Both)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Markets to scan, in order
    #[serde(default = "default_markets")]
    pub markets: Vec<Market>,

    /// Cap on symbols evaluated per market, bounding worst-case cycle time
    #[serde(default = "default_max_symbols")]
    pub max_symbols_per_market: usize,

    /// Calendar days of daily candles fetched per symbol; enough history to
    /// warm up the 60-row SMA and 26-row EMA windows
    #[serde(default = "default_lookback_days")]
    pub candle_lookback_days: i64,

    /// Acceptance rule for market-wide screens
    #[serde(default)]
    pub rule_set: RuleSet,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            max_symbols_per_market: default_max_symbols(),
            candle_lookback_days: default_lookback_days(),
            rule_set: RuleSet::default(),
        }
    }
}

fn default_markets() -> Vec<Market> {
    Market::all().to_vec()
}

fn default_max_symbols() -> usize {
    50
}

fn default_lookback_days() -> i64 {
    180
}

// ============================================================================
// Pipeline
// ============================================================================

/// Outcome of a cancellable screening pass.
#[derive(Debug, Clone)]
pub enum ScreenOutcome {
    /// The pass ran to completion
    Completed(Vec<ScreeningResult>),
    /// The cancellation flag was observed at a checkpoint; no partial
    /// results are carried out
    Cancelled,
}

/// Screening pipeline over one gateway and one fundamentals source.
pub struct ScreeningPipeline {
    gateway: Arc<MarketDataGateway>,
    fundamentals: Arc<dyn FundamentalsSource>,
    config: PipelineConfig,
}

impl ScreeningPipeline {
    pub fn new(
        gateway: Arc<MarketDataGateway>,
        fundamentals: Arc<dyn FundamentalsSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            fundamentals,
            config,
        }
    }

    /// Markets scanned per cycle, in order.
    pub fn markets(&self) -> &[Market] {
        &self.config.markets
    }

    /// Evaluate the signal map for one symbol. Pure function of its inputs.
    pub fn screen_symbol(
        snapshot: &Snapshot,
        latest: &IndicatorRow,
        fundamentals: Option<Fundamentals>,
    ) -> ScreeningResult {
        ScreeningResult {
            symbol: snapshot.symbol.clone(),
            display_name: snapshot.display_name.clone(),
            last_price: snapshot.last_price,
            change_percent: snapshot.change_percent,
            signals: SignalSet::evaluate(latest),
            fundamentals,
        }
    }

    /// Screen one market segment, observing the cancellation flag before
    /// each symbol.
    pub async fn screen_market(
        &self,
        market: Market,
        cancel: &CancelToken,
    ) -> Result<ScreenOutcome> {
        let snapshots = self.gateway.fetch_market_snapshot(market).await;
        info!(market = %market, symbols = snapshots.len(), "screening market");

        let mut results = Vec::new();
        let mut evaluated = 0usize;
        for snapshot in &snapshots {
            if cancel.is_cancelled() {
                info!(market = %market, "cancellation observed, aborting market screen");
                return Ok(ScreenOutcome::Cancelled);
            }
            if evaluated >= self.config.max_symbols_per_market {
                break;
            }
            // cheap skips don't count against the cap
            if snapshot.last_price <= 0.0 || market_for_symbol(&snapshot.symbol).is_none() {
                continue;
            }

            evaluated += 1;
            if let Some(result) = self.evaluate_snapshot(snapshot).await {
                if self
                    .config
                    .rule_set
                    .accepts(&result.signals, result.fundamentals.as_ref())
                {
                    debug!(symbol = result.symbol.as_str(), "symbol accepted");
                    results.push(result);
                }
            }
        }

        info!(market = %market, evaluated, accepted = results.len(), "market screened");
        Ok(ScreenOutcome::Completed(results))
    }

    /// Screen every configured market in order, observing the cancellation
    /// flag before each market.
    pub async fn screen_all_markets(&self, cancel: &CancelToken) -> Result<ScreenOutcome> {
        let mut all = Vec::new();
        for &market in &self.config.markets {
            if cancel.is_cancelled() {
                return Ok(ScreenOutcome::Cancelled);
            }
            match self.screen_market(market, cancel).await? {
                ScreenOutcome::Completed(results) => all.extend(results),
                ScreenOutcome::Cancelled => return Ok(ScreenOutcome::Cancelled),
            }
        }
        Ok(ScreenOutcome::Completed(all))
    }

    /// On-demand single-symbol path, bypassing the per-market cap and the
    /// acceptance filter: the full signal map comes back regardless of
    /// accept/reject. `None` when no provider knows the symbol or its price
    /// is unknown.
    pub async fn screen_one_symbol(&self, symbol: &str) -> Option<ScreeningResult> {
        let snapshot = self.gateway.fetch_single_quote(symbol).await?;
        if snapshot.last_price <= 0.0 {
            debug!(symbol, "quote has unknown price, skipping");
            return None;
        }

        let series = self
            .gateway
            .fetch_candles(symbol, Period::Daily, self.lookback_start(), None)
            .await;
        if series.is_empty() {
            debug!(symbol, "no candles available");
            return None;
        }

        let frame = IndicatorEngine::compute(&series);
        let latest = frame.latest()?;
        // the detail view always shows fundamentals
        let fundamentals = self.fundamentals.fundamentals(symbol);
        Some(Self::screen_symbol(&snapshot, latest, fundamentals))
    }

    async fn evaluate_snapshot(&self, snapshot: &Snapshot) -> Option<ScreeningResult> {
        let series = self
            .gateway
            .fetch_candles(&snapshot.symbol, Period::Daily, self.lookback_start(), None)
            .await;
        if series.is_empty() {
            debug!(symbol = snapshot.symbol.as_str(), "no candles, symbol skipped");
            return None;
        }

        let frame = IndicatorEngine::compute(&series);
        let latest = frame.latest()?;
        let fundamentals = if self.config.rule_set.needs_fundamentals() {
            self.fundamentals.fundamentals(&snapshot.symbol)
        } else {
            None
        };
        Some(Self::screen_symbol(snapshot, latest, fundamentals))
    }

    fn lookback_start(&self) -> Option<chrono::NaiveDate> {
        Some(Utc::now().date_naive() - chrono::Duration::days(self.config.candle_lookback_days))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorRow;
    use chrono::Utc;

    fn snapshot() -> Snapshot {
        Snapshot {
            symbol: "600519".to_string(),
            display_name: "贵州茅台".to_string(),
            last_price: 1700.0,
            change_percent: 1.2,
            volume: 2_500_000,
            turnover: 4_250_000_000.0,
        }
    }

    fn bullish_row() -> IndicatorRow {
        IndicatorRow {
            timestamp: Utc::now(),
            close: 12.0,
            volume: 2_000_000,
            sma5: Some(11.8),
            sma10: Some(11.5),
            sma20: Some(11.0),
            sma60: Some(10.0),
            volume_sma5: Some(1_000_000.0),
            volume_sma10: Some(900_000.0),
            macd: Some(0.5),
            macd_signal: Some(0.3),
            macd_hist: Some(0.2),
            rsi14: Some(55.0),
            boll_mid: Some(11.0),
            boll_upper: Some(11.9),
            boll_lower: Some(10.1),
            kdj_k: Some(60.0),
            kdj_d: Some(50.0),
            wr14: Some(-85.0),
            wr21: Some(-82.0),
        }
    }

    fn passing_fundamentals() -> Fundamentals {
        Fundamentals {
            roe: 18.0,
            gross_margin: 45.0,
            debt_ratio: 30.0,
            operating_cash_flow: 5.0,
            revenue_growth: 12.0,
            profit_growth: 15.0,
        }
    }

    #[test]
    fn test_screen_symbol_is_deterministic() {
        let snap = snapshot();
        let row = bullish_row();
        let a = ScreeningPipeline::screen_symbol(&snap, &row, None);
        let b = ScreeningPipeline::screen_symbol(&snap, &row, None);
        assert_eq!(a.signals, b.signals);
        assert_eq!(a.symbol, b.symbol);
        assert_eq!(a.last_price, b.last_price);
    }

    #[test]
    fn test_screen_symbol_carries_snapshot_fields() {
        let result = ScreeningPipeline::screen_symbol(&snapshot(), &bullish_row(), None);
        assert_eq!(result.symbol, "600519");
        assert_eq!(result.display_name, "贵州茅台");
        assert!((result.last_price - 1700.0).abs() < f64::EPSILON);
        assert!(result.fundamentals.is_none());
    }

    #[test]
    fn test_rule_set_technical() {
        let signals = SignalSet::evaluate(&bullish_row());
        assert!(RuleSet::Technical.accepts(&signals, None));
        assert!(!RuleSet::Fundamental.accepts(&signals, None));
        assert!(!RuleSet::Both.accepts(&signals, None));
    }

    #[test]
    fn test_rule_set_fundamental_and_both() {
        let signals = SignalSet::evaluate(&bullish_row());
        let fundamentals = passing_fundamentals();
        assert!(RuleSet::Fundamental.accepts(&signals, Some(&fundamentals)));
        assert!(RuleSet::Both.accepts(&signals, Some(&fundamentals)));

        // missing fundamentals can never pass a fundamental rule
        assert!(!RuleSet::Fundamental.accepts(&SignalSet::default(), None));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.markets.len(), 4);
        assert_eq!(config.markets[0], Market::ShanghaiMain);
        assert_eq!(config.max_symbols_per_market, 50);
        assert_eq!(config.rule_set, RuleSet::Technical);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_symbols_per_market, 50);

        let config: PipelineConfig =
            serde_json::from_str(r#"{"markets": ["sh"], "rule_set": "both"}"#).unwrap();
        assert_eq!(config.markets, vec![Market::ShanghaiMain]);
        assert_eq!(config.rule_set, RuleSet::Both);
    }
}
