//! Quote provider abstraction for multi-source market data.
//!
//! Defines the `QuoteProvider` trait that all data sources implement,
//! enabling the gateway's ordered failover chain.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::{Candle, Market, Period, Snapshot};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to quote providers.
///
/// The gateway never surfaces these to callers; the distinction between
/// variants exists for logging only.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid token, expired)
    Auth(String),
    /// Response received but could not be parsed into canonical rows
    Malformed(String),
    /// Data not available for the requested symbol/market/period
    DataNotAvailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// Quote Provider Trait
// ============================================================================

/// Trait for market data providers.
///
/// All data sources (eastmoney, tushare, tencent) implement this trait to
/// provide a unified interface for the gateway's failover chain. Adapters own
/// all vendor field-name and unit normalization: anything a provider returns
/// is already in canonical shape.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Provider name (e.g., "eastmoney")
    fn name(&self) -> &'static str;

    /// Fetch a full snapshot of one market segment.
    async fn market_snapshot(&self, market: Market) -> Result<Vec<Snapshot>, ProviderError>;

    /// Fetch candles for a symbol.
    ///
    /// # Arguments
    /// * `symbol` - Six-digit stock code (e.g., "600519")
    /// * `period` - Candle periodicity
    /// * `start` / `end` - Optional date range filter
    async fn candles(
        &self,
        symbol: &str,
        period: Period,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Fetch a single quote for one symbol.
    ///
    /// `Ok(None)` means the provider answered but has no row for the symbol.
    async fn single_quote(&self, symbol: &str) -> Result<Option<Snapshot>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
