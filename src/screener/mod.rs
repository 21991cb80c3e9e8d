//! Screening layer: boolean signals, fundamental checks and the per-market
//! pipeline.

pub mod fundamentals;
pub mod pipeline;
pub mod signals;

pub use fundamentals::{Fundamentals, FundamentalsSource, SyntheticFundamentals};
pub use pipeline::{PipelineConfig, RuleSet, ScreenOutcome, ScreeningPipeline};
pub use signals::SignalSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Screening Result
// ============================================================================

/// One accepted (or, for the single-symbol path, evaluated) stock.
///
/// Created once per completed screening pass and never mutated; the next
/// pass replaces the whole result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub symbol: String,
    pub display_name: String,
    pub last_price: f64,
    pub change_percent: f64,
    pub signals: SignalSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fundamentals: Option<Fundamentals>,
}

// ============================================================================
// Trade Levels
// ============================================================================

/// Suggested entry and exit prices derived from the last traded price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub buy: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl TradeLevels {
    /// Derive levels from a price: +5% take-profit, -5% stop-loss, all
    /// rounded to fen. `None` when the price is unknown (non-positive).
    pub fn from_price(price: f64) -> Option<Self> {
        if price <= 0.0 {
            return None;
        }
        Some(Self {
            buy: round2(price),
            take_profit: round2(price * 1.05),
            stop_loss: round2(price * 0.95),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_levels() {
        let levels = TradeLevels::from_price(10.0).unwrap();
        assert_eq!(levels.buy, 10.0);
        assert_eq!(levels.take_profit, 10.5);
        assert_eq!(levels.stop_loss, 9.5);
    }

    #[test]
    fn test_trade_levels_round_to_fen() {
        let levels = TradeLevels::from_price(33.33).unwrap();
        assert_eq!(levels.buy, 33.33);
        // 33.33 * 1.05 = 34.9965 -> 35.00
        assert_eq!(levels.take_profit, 35.0);
        // 33.33 * 0.95 = 31.6635 -> 31.66
        assert_eq!(levels.stop_loss, 31.66);
    }

    #[test]
    fn test_trade_levels_unknown_price() {
        assert!(TradeLevels::from_price(0.0).is_none());
        assert!(TradeLevels::from_price(-1.0).is_none());
    }
}
