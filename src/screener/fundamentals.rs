//! Fundamental metrics and the quality acceptance rule.
//!
//! No real fundamental feed is wired in yet; `SyntheticFundamentals` is a
//! deterministic, seeded placeholder behind the `FundamentalsSource` trait
//! so a real integration can drop in without touching the pipeline.

use serde::{Deserialize, Serialize};

/// Fundamental metrics for one symbol, all in percent except cash flow
/// (亿元) where noted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Return on equity, percent
    pub roe: f64,
    /// Gross margin, percent
    pub gross_margin: f64,
    /// Debt-to-asset ratio, percent
    pub debt_ratio: f64,
    /// Operating cash flow, signed
    pub operating_cash_flow: f64,
    /// Year-over-year revenue growth, percent
    pub revenue_growth: f64,
    /// Year-over-year net profit growth, percent
    pub profit_growth: f64,
}

impl Fundamentals {
    /// Quality acceptance: profitable, lightly levered, cash-generative and
    /// growing, with profit growing at least as fast as revenue.
    pub fn passes(&self) -> bool {
        self.roe >= 15.0
            && self.gross_margin >= 30.0
            && self.debt_ratio < 60.0
            && self.operating_cash_flow > 0.0
            && self.revenue_growth >= 10.0
            && self.profit_growth >= 10.0
            && self.profit_growth >= self.revenue_growth
    }
}

/// Source of fundamental metrics for a symbol.
pub trait FundamentalsSource: Send + Sync {
    /// `None` when no fundamentals are known for the symbol.
    fn fundamentals(&self, symbol: &str) -> Option<Fundamentals>;
}

// ============================================================================
// Synthetic Source
// ============================================================================

/// Deterministic synthetic fundamentals, seeded per symbol with FNV-1a.
///
/// The numeric ranges carry no business meaning; the generator only exists
/// so the fundamental rule set is exercisable end to end before a real data
/// integration lands.
pub struct SyntheticFundamentals;

impl SyntheticFundamentals {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntheticFundamentals {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(input: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in input.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl FundamentalsSource for SyntheticFundamentals {
    fn fundamentals(&self, symbol: &str) -> Option<Fundamentals> {
        let seed = fnv1a(symbol);
        Some(Fundamentals {
            roe: 8.0 + (seed % 12) as f64,
            gross_margin: 20.0 + ((seed >> 8) % 25) as f64,
            debt_ratio: 35.0 + ((seed >> 16) % 40) as f64,
            operating_cash_flow: ((seed >> 24) % 21) as f64 - 5.0,
            revenue_growth: ((seed >> 32) % 30) as f64 - 5.0,
            profit_growth: ((seed >> 40) % 35) as f64 - 8.0,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
