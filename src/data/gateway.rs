//! Market data gateway with ordered provider failover.
//!
//! Providers are tried strictly in configured order; the first one returning
//! at least one normalized row wins and its rows are returned verbatim (no
//! merging across providers within one call). Transport errors, malformed
//! payloads and empty results all collapse to "this provider produced
//! nothing" — the distinction is logged, never raised. When the whole chain
//! produces nothing the caller gets an empty sequence (or `None` for a
//! single quote), never an error.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

use super::provider::{ProviderError, QuoteProvider};
use super::{Candle, CandleSeries, Market, Period, Snapshot};

/// Gateway over an ordered chain of quote providers.
pub struct MarketDataGateway {
    chain: Vec<Arc<dyn QuoteProvider>>,
}

impl MarketDataGateway {
    /// Create a gateway with the given provider chain, tried in order.
    pub fn new(chain: Vec<Arc<dyn QuoteProvider>>) -> Self {
        Self { chain }
    }

    /// Names of the configured providers, in chain order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|p| p.name()).collect()
    }

    /// Fetch a snapshot of every listed symbol in one market segment.
    ///
    /// Empty when all providers fail.
    pub async fn fetch_market_snapshot(&self, market: Market) -> Vec<Snapshot> {
        for provider in &self.chain {
            match provider.market_snapshot(market).await {
                Ok(rows) if !rows.is_empty() => {
                    debug!(
                        provider = provider.name(),
                        market = %market,
                        rows = rows.len(),
                        "market snapshot fetched"
                    );
                    return rows;
                }
                Ok(_) => {
                    debug!(
                        provider = provider.name(),
                        market = %market,
                        "provider returned no snapshot rows, trying next"
                    );
                }
                Err(e) => {
                    Self::log_provider_failure(provider.name(), &e);
                }
            }
        }

        warn!(market = %market, "all providers failed for market snapshot");
        Vec::new()
    }

    /// Fetch a candle series for one symbol.
    ///
    /// Corrupt OHLC rows are discarded during series construction; a provider
    /// whose rows are all discarded counts as having produced nothing and the
    /// chain continues. Empty series when all providers fail.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        period: Period,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> CandleSeries {
        for provider in &self.chain {
            match provider.candles(symbol, period, start, end).await {
                Ok(rows) => {
                    let series = CandleSeries::from_candles(symbol, period, rows);
                    if !series.is_empty() {
                        debug!(
                            provider = provider.name(),
                            symbol,
                            period = %period,
                            rows = series.len(),
                            "candles fetched"
                        );
                        return series;
                    }
                    debug!(
                        provider = provider.name(),
                        symbol, "provider returned no usable candles, trying next"
                    );
                }
                Err(e) => {
                    Self::log_provider_failure(provider.name(), &e);
                }
            }
        }

        warn!(symbol, period = %period, "all providers failed for candles");
        CandleSeries::empty(symbol, period)
    }

    /// Fetch a single quote for one symbol. `None` when all providers fail
    /// or none knows the symbol.
    pub async fn fetch_single_quote(&self, symbol: &str) -> Option<Snapshot> {
        for provider in &self.chain {
            match provider.single_quote(symbol).await {
                Ok(Some(snapshot)) => {
                    debug!(provider = provider.name(), symbol, "single quote fetched");
                    return Some(snapshot);
                }
                Ok(None) => {
                    debug!(
                        provider = provider.name(),
                        symbol, "provider has no quote for symbol, trying next"
                    );
                }
                Err(e) => {
                    Self::log_provider_failure(provider.name(), &e);
                }
            }
        }

        warn!(symbol, "all providers failed for single quote");
        None
    }

    fn log_provider_failure(name: &'static str, err: &ProviderError) {
        match err {
            ProviderError::Network(_) => {
                warn!(provider = name, error = %err, "provider network failure, trying next")
            }
            ProviderError::Auth(_) => {
                warn!(provider = name, error = %err, "provider auth failure, trying next")
            }
            _ => debug!(provider = name, error = %err, "provider failure, trying next"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct StaticProvider {
        name: &'static str,
        snapshots: Vec<Snapshot>,
        fail: bool,
    }

    impl StaticProvider {
        fn ok(name: &'static str, snapshots: Vec<Snapshot>) -> Self {
            Self {
                name,
                snapshots,
                fail: false,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                snapshots: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn market_snapshot(&self, _market: Market) -> Result<Vec<Snapshot>, ProviderError> {
            if self.fail {
                Err(ProviderError::Network("mock failure".into()))
            } else {
                Ok(self.snapshots.clone())
            }
        }

        async fn candles(
            &self,
            _symbol: &str,
            _period: Period,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
        ) -> Result<Vec<Candle>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Network("mock failure".into()));
            }
            Ok(vec![Candle {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                open: 10.0,
                high: 11.0,
                low: 9.5,
                close: 10.5,
                volume: 1_000,
            }])
        }

        async fn single_quote(&self, _symbol: &str) -> Result<Option<Snapshot>, ProviderError> {
            if self.fail {
                Err(ProviderError::Network("mock failure".into()))
            } else {
                Ok(self.snapshots.first().cloned())
            }
        }
    }

    fn snapshot(symbol: &str) -> Snapshot {
        Snapshot {
            symbol: symbol.to_string(),
            display_name: format!("stock {}", symbol),
            last_price: 12.34,
            change_percent: 1.5,
            volume: 100_000,
            turnover: 1_234_000.0,
        }
    }

    #[tokio::test]
    async fn test_empty_chain_yields_empty() {
        let gateway = MarketDataGateway::new(Vec::new());
        assert!(gateway
            .fetch_market_snapshot(Market::ShanghaiMain)
            .await
            .is_empty());
        assert!(gateway
            .fetch_candles("600519", Period::Daily, None, None)
            .await
            .is_empty());
        assert!(gateway.fetch_single_quote("600519").await.is_none());
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let gateway = MarketDataGateway::new(vec![
            Arc::new(StaticProvider::ok("first", vec![snapshot("600519")])),
            Arc::new(StaticProvider::ok("second", vec![snapshot("000001")])),
        ]);

        let rows = gateway.fetch_market_snapshot(Market::ShanghaiMain).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "600519");
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_next() {
        let gateway = MarketDataGateway::new(vec![
            Arc::new(StaticProvider::failing("broken")),
            Arc::new(StaticProvider::ok("backup", vec![snapshot("000001")])),
        ]);

        let rows = gateway.fetch_market_snapshot(Market::ShenzhenMain).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "000001");

        let quote = gateway.fetch_single_quote("000001").await;
        assert_eq!(quote.map(|s| s.symbol), Some("000001".to_string()));
    }

    #[tokio::test]
    async fn test_empty_result_counts_as_failure() {
        let gateway = MarketDataGateway::new(vec![
            Arc::new(StaticProvider::ok("empty", Vec::new())),
            Arc::new(StaticProvider::ok("backup", vec![snapshot("300750")])),
        ]);

        let rows = gateway.fetch_market_snapshot(Market::ChiNext).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "300750");
    }
}
