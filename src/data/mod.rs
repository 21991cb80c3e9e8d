//! Market data layer: canonical quote/candle types and the provider chain.
//!
//! All vendor-specific field names and units are normalized inside the
//! individual provider adapters; everything downstream of this module only
//! ever sees the canonical `Snapshot` / `Candle` shapes.

pub mod eastmoney;
pub mod gateway;
pub mod provider;
pub mod tencent;
pub mod tushare;

pub use eastmoney::EastmoneyProvider;
pub use gateway::MarketDataGateway;
pub use provider::{ProviderError, QuoteProvider};
pub use tencent::TencentProvider;
pub use tushare::TushareProvider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Markets
// ============================================================================

/// Exchange segments covered by the screener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Shanghai main board (6xxxxx)
    #[serde(rename = "sh")]
    ShanghaiMain,
    /// Shenzhen main board (0xxxxx / 3xxxxx)
    #[serde(rename = "sz")]
    ShenzhenMain,
    /// ChiNext growth board (300xxx)
    #[serde(rename = "cyb")]
    ChiNext,
    /// STAR innovation board (688xxx)
    #[serde(rename = "kcb")]
    Star,
}

impl Market {
    /// Short market code used in configuration and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ShanghaiMain => "sh",
            Self::ShenzhenMain => "sz",
            Self::ChiNext => "cyb",
            Self::Star => "kcb",
        }
    }

    /// Human-readable market name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ShanghaiMain => "Shanghai main board",
            Self::ShenzhenMain => "Shenzhen main board",
            Self::ChiNext => "ChiNext",
            Self::Star => "STAR",
        }
    }

    /// All markets in the fixed scan order.
    pub fn all() -> [Market; 4] {
        [
            Self::ShanghaiMain,
            Self::ShenzhenMain,
            Self::ChiNext,
            Self::Star,
        ]
    }

    /// Parse a market code ("sh", "sz", "cyb", "kcb").
    pub fn from_code(code: &str) -> Option<Market> {
        match code {
            "sh" => Some(Self::ShanghaiMain),
            "sz" => Some(Self::ShenzhenMain),
            "cyb" => Some(Self::ChiNext),
            "kcb" => Some(Self::Star),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Classify a symbol into its market by code prefix.
///
/// The specific prefixes (688, 300) must be checked before the generic
/// single-digit ones (6, 3/0), otherwise STAR and ChiNext codes would be
/// misclassified as main-board listings.
pub fn market_for_symbol(symbol: &str) -> Option<Market> {
    if !is_valid_symbol_shape(symbol) {
        return None;
    }
    if symbol.starts_with("688") {
        Some(Market::Star)
    } else if symbol.starts_with("300") {
        Some(Market::ChiNext)
    } else if symbol.starts_with('6') {
        Some(Market::ShanghaiMain)
    } else if symbol.starts_with('0') || symbol.starts_with('3') {
        Some(Market::ShenzhenMain)
    } else {
        None
    }
}

/// A symbol is well-formed when it is exactly six ASCII digits.
pub fn is_valid_symbol_shape(symbol: &str) -> bool {
    symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_digit())
}

/// A symbol is valid when it is well-formed and maps to a known market.
pub fn is_valid_symbol(symbol: &str) -> bool {
    market_for_symbol(symbol).is_some()
}

// ============================================================================
// Periodicity
// ============================================================================

/// Candle periodicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// One point-in-time quote row for a symbol.
///
/// Produced fresh on every gateway call and never mutated afterwards; the
/// next fetch supersedes it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Six-digit stock code
    pub symbol: String,
    /// Listed company display name
    pub display_name: String,
    /// Last traded price; 0.0 means "unknown"
    pub last_price: f64,
    /// Signed percentage change for the session
    pub change_percent: f64,
    /// Traded volume in shares
    pub volume: u64,
    /// Traded turnover in yuan
    pub turnover: f64,
}

// ============================================================================
// Candle / CandleSeries
// ============================================================================

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume in shares
    pub volume: u64,
}

impl Candle {
    /// OHLC sanity check: all prices positive and `low <= open,close <= high`.
    pub fn is_well_formed(&self) -> bool {
        self.low > 0.0
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }
}

/// An ordered, timestamp-unique sequence of candles for one symbol and one
/// periodicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    symbol: String,
    period: Period,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series from raw adapter rows.
    ///
    /// Rows with corrupt OHLC are discarded, not corrected. Rows are sorted
    /// by timestamp and any row that repeats a timestamp is dropped, which
    /// enforces both ordering and uniqueness.
    pub fn from_candles(
        symbol: impl Into<String>,
        period: Period,
        candles: impl IntoIterator<Item = Candle>,
    ) -> Self {
        let mut rows: Vec<Candle> = candles
            .into_iter()
            .filter(Candle::is_well_formed)
            .collect();
        rows.sort_by_key(|c| c.timestamp);
        rows.dedup_by_key(|c| c.timestamp);

        Self {
            symbol: symbol.into(),
            period,
            candles: rows,
        }
    }

    /// Empty series for a symbol (all providers failed).
    pub fn empty(symbol: impl Into<String>, period: Period) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            candles: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

// ============================================================================
// Tests
// ============================================================================
