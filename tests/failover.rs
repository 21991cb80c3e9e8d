//! Integration tests for the provider failover chain.
//!
//! Verifies that the gateway tries providers strictly in configured order,
//! that the first non-empty result wins verbatim, and that every failure
//! mode collapses to an empty result instead of an error.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use ashare_screener::data::{
    Candle, Market, MarketDataGateway, Period, ProviderError, QuoteProvider, Snapshot,
};

// ============================================================================
// Mock Providers
// ============================================================================

/// What a mock provider answers with.
enum Behavior {
    /// Return this many snapshot rows / candles
    Rows(usize),
    /// Answer successfully with zero rows
    Empty,
    /// Fail with a network error
    Fail,
    /// Return candles that all violate the OHLC invariant
    Corrupt,
}

struct MockProvider {
    name: &'static str,
    behavior: Behavior,
    calls: AtomicU32,
}

impl MockProvider {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn make_snapshot(&self, index: usize) -> Snapshot {
        Snapshot {
            symbol: format!("6005{:02}", index),
            display_name: format!("{} stock {}", self.name, index),
            last_price: 10.0 + index as f64,
            change_percent: 0.5,
            volume: 1_000_000,
            turnover: 10_000_000.0,
        }
    }

    fn make_candle(&self, day: u32, corrupt: bool) -> Candle {
        let close = if corrupt { 99.0 } else { 10.5 };
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 7, 0, 0).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close, // corrupt: close far above high
            volume: 1_000,
        }
    }
}

#[async_trait]
impl QuoteProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn market_snapshot(&self, _market: Market) -> Result<Vec<Snapshot>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.behavior {
            Behavior::Rows(n) => Ok((0..n).map(|i| self.make_snapshot(i)).collect()),
            Behavior::Empty => Ok(Vec::new()),
            Behavior::Fail => Err(ProviderError::Network("mock network failure".into())),
            Behavior::Corrupt => Ok(Vec::new()),
        }
    }

    async fn candles(
        &self,
        _symbol: &str,
        _period: Period,
        _start: Option<NaiveDate>,
        _end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.behavior {
            Behavior::Rows(n) => Ok((0..n).map(|i| self.make_candle(i as u32 + 1, false)).collect()),
            Behavior::Empty => Ok(Vec::new()),
            Behavior::Fail => Err(ProviderError::Network("mock network failure".into())),
            Behavior::Corrupt => Ok((1..=5).map(|d| self.make_candle(d, true)).collect()),
        }
    }

    async fn single_quote(&self, _symbol: &str) -> Result<Option<Snapshot>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.behavior {
            Behavior::Rows(_) => Ok(Some(self.make_snapshot(0))),
            Behavior::Empty | Behavior::Corrupt => Ok(None),
            Behavior::Fail => Err(ProviderError::Network("mock network failure".into())),
        }
    }
}

// ============================================================================
// Snapshot Failover
// ============================================================================

#[tokio::test]
async fn test_empty_primary_falls_through_to_backup_rows() {
    let empty = MockProvider::new("empty", Behavior::Empty);
    let backup = MockProvider::new("backup", Behavior::Rows(10));
    let gateway = MarketDataGateway::new(vec![empty.clone(), backup.clone()]);

    let rows = gateway.fetch_market_snapshot(Market::ShanghaiMain).await;

    // backup's 10 rows come back exactly, untouched by the empty primary
    assert_eq!(rows.len(), 10);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.symbol, format!("6005{:02}", i));
        assert_eq!(row.display_name, format!("backup stock {}", i));
    }
    assert_eq!(empty.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn test_first_success_short_circuits_chain() {
    let primary = MockProvider::new("primary", Behavior::Rows(3));
    let backup = MockProvider::new("backup", Behavior::Rows(10));
    let gateway = MarketDataGateway::new(vec![primary.clone(), backup.clone()]);

    let rows = gateway.fetch_market_snapshot(Market::ShenzhenMain).await;

    assert_eq!(rows.len(), 3);
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 0);
}

#[tokio::test]
async fn test_network_failure_falls_through() {
    let failing = MockProvider::new("failing", Behavior::Fail);
    let backup = MockProvider::new("backup", Behavior::Rows(2));
    let gateway = MarketDataGateway::new(vec![failing.clone(), backup.clone()]);

    let rows = gateway.fetch_market_snapshot(Market::ChiNext).await;

    assert_eq!(rows.len(), 2);
    assert!(failing.call_count() > 0);
}

#[tokio::test]
async fn test_all_providers_fail_yields_empty_not_error() {
    let failing1 = MockProvider::new("failing1", Behavior::Fail);
    let failing2 = MockProvider::new("failing2", Behavior::Fail);
    let gateway = MarketDataGateway::new(vec![failing1.clone(), failing2.clone()]);

    let rows = gateway.fetch_market_snapshot(Market::Star).await;

    assert!(rows.is_empty());
    assert_eq!(failing1.call_count(), 1);
    assert_eq!(failing2.call_count(), 1);
}

// ============================================================================
// Candle Failover
// ============================================================================

#[tokio::test]
async fn test_corrupt_candles_count_as_nothing() {
    // every row from the primary violates the OHLC invariant and is
    // discarded at ingestion, so the chain continues
    let corrupt = MockProvider::new("corrupt", Behavior::Corrupt);
    let backup = MockProvider::new("backup", Behavior::Rows(5));
    let gateway = MarketDataGateway::new(vec![corrupt.clone(), backup.clone()]);

    let series = gateway
        .fetch_candles("600519", Period::Daily, None, None)
        .await;

    assert_eq!(series.len(), 5);
    assert!(series.candles().iter().all(|c| c.is_well_formed()));
    assert_eq!(corrupt.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn test_candles_all_fail_yields_empty_series() {
    let failing = MockProvider::new("failing", Behavior::Fail);
    let gateway = MarketDataGateway::new(vec![failing]);

    let series = gateway
        .fetch_candles("000001", Period::Daily, None, None)
        .await;

    assert!(series.is_empty());
    assert_eq!(series.symbol(), "000001");
    assert_eq!(series.period(), Period::Daily);
}

// ============================================================================
// Single Quote Failover
// ============================================================================

#[tokio::test]
async fn test_unknown_symbol_falls_through_to_next_provider() {
    // Ok(None) means "answered, no such symbol": the chain keeps going
    let unknowing = MockProvider::new("unknowing", Behavior::Empty);
    let knowing = MockProvider::new("knowing", Behavior::Rows(1));
    let gateway = MarketDataGateway::new(vec![unknowing.clone(), knowing.clone()]);

    let quote = gateway.fetch_single_quote("600519").await;

    assert!(quote.is_some());
    assert_eq!(unknowing.call_count(), 1);
    assert_eq!(knowing.call_count(), 1);
}

#[tokio::test]
async fn test_single_quote_all_fail_yields_none() {
    let failing = MockProvider::new("failing", Behavior::Fail);
    let gateway = MarketDataGateway::new(vec![failing]);

    assert!(gateway.fetch_single_quote("600519").await.is_none());
}
