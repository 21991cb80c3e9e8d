//! Per-symbol boolean screening signals.
//!
//! Every signal requires all of the indicator values it references to be
//! defined; an undefined input makes the signal `false`, it never propagates
//! a third state into the rule logic.

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorRow;

/// Volume must exceed its 5-day average by this factor for `volume_bullish`.
const VOLUME_SURGE_FACTOR: f64 = 1.2;

/// Williams %R oversold threshold (negative scale).
const WR_OVERSOLD: f64 = -80.0;

/// Named boolean screening flags for one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    /// MACD above its signal line with a positive histogram
    pub macd_bullish: bool,
    /// Both Williams %R windows in oversold territory
    pub wr_bullish: bool,
    /// Strictly stacked moving averages: SMA5 > SMA10 > SMA20 > SMA60
    pub ma_bullish: bool,
    /// Volume surge above the 5-day average
    pub volume_bullish: bool,
    /// Close above the upper Bollinger band
    pub breakout_bullish: bool,
    /// %K above %D
    pub kdj_bullish: bool,
    /// RSI in the neutral band (30, 70)
    pub rsi_bullish: bool,
}

impl SignalSet {
    /// Evaluate all signals against the latest indicator row.
    pub fn evaluate(row: &IndicatorRow) -> Self {
        let macd_bullish = match (row.macd, row.macd_signal, row.macd_hist) {
            (Some(macd), Some(signal), Some(hist)) => macd > signal && hist > 0.0,
            _ => false,
        };

        let wr_bullish = match (row.wr14, row.wr21) {
            (Some(wr14), Some(wr21)) => wr14 < WR_OVERSOLD && wr21 < WR_OVERSOLD,
            _ => false,
        };

        let ma_bullish = match (row.sma5, row.sma10, row.sma20, row.sma60) {
            (Some(s5), Some(s10), Some(s20), Some(s60)) => s5 > s10 && s10 > s20 && s20 > s60,
            _ => false,
        };

        let volume_bullish = match row.volume_sma5 {
            Some(avg) => row.volume as f64 > avg * VOLUME_SURGE_FACTOR,
            None => false,
        };

        let breakout_bullish = match row.boll_upper {
            Some(upper) => row.close > upper,
            None => false,
        };

        let kdj_bullish = match (row.kdj_k, row.kdj_d) {
            (Some(k), Some(d)) => k > d,
            _ => false,
        };

        let rsi_bullish = match row.rsi14 {
            Some(rsi) => rsi > 30.0 && rsi < 70.0,
            None => false,
        };

        Self {
            macd_bullish,
            wr_bullish,
            ma_bullish,
            volume_bullish,
            breakout_bullish,
            kdj_bullish,
            rsi_bullish,
        }
    }

    /// Technical acceptance: MACD and Williams %R must both agree, plus at
    /// least one of the trend/volume/breakout confirmations.
    pub fn technical_pass(&self) -> bool {
        self.macd_bullish
            && self.wr_bullish
            && (self.ma_bullish || self.volume_bullish || self.breakout_bullish)
    }

    /// Names of the active flags, for log lines and advisory prompts.
    pub fn active(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.macd_bullish {
            names.push("macd_bullish");
        }
        if self.wr_bullish {
            names.push("wr_bullish");
        }
        if self.ma_bullish {
            names.push("ma_bullish");
        }
        if self.volume_bullish {
            names.push("volume_bullish");
        }
        if self.breakout_bullish {
            names.push("breakout_bullish");
        }
        if self.kdj_bullish {
            names.push("kdj_bullish");
        }
        if self.rsi_bullish {
            names.push("rsi_bullish");
        }
        names
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn defined_row() -> IndicatorRow {
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

    #[test]
    fn test_all_signals_fire_on_bullish_row() {
        let signals = SignalSet::evaluate(&defined_row());
        assert!(signals.macd_bullish);
        assert!(signals.wr_bullish);
        assert!(signals.ma_bullish);
        assert!(signals.volume_bullish);
        assert!(signals.breakout_bullish);
        assert!(signals.kdj_bullish);
        assert!(signals.rsi_bullish);
        assert!(signals.technical_pass());
    }

    #[test]
    fn test_undefined_inputs_make_signals_false() {
        let mut row = defined_row();
        row.macd = None;
        row.wr21 = None;
        row.sma60 = None;
        row.volume_sma5 = None;
        row.boll_upper = None;
        row.kdj_d = None;
        row.rsi14 = None;

        let signals = SignalSet::evaluate(&row);
        assert_eq!(signals, SignalSet::default());
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let row = defined_row();
        assert_eq!(SignalSet::evaluate(&row), SignalSet::evaluate(&row));
    }

    #[test]
    fn test_technical_rule_or_group() {
        // macd + wr + volume alone is enough
        let signals = SignalSet {
            macd_bullish: true,
            wr_bullish: true,
            ma_bullish: false,
            volume_bullish: true,
            breakout_bullish: false,
            ..Default::default()
        };
        assert!(signals.technical_pass());

        // missing macd rejects regardless of the rest
        let signals = SignalSet {
            macd_bullish: false,
            wr_bullish: true,
            ma_bullish: true,
            volume_bullish: true,
            breakout_bullish: true,
            kdj_bullish: true,
            rsi_bullish: true,
        };
        assert!(!signals.technical_pass());

        // macd + wr without any OR-group member rejects
        let signals = SignalSet {
            macd_bullish: true,
            wr_bullish: true,
            ..Default::default()
        };
        assert!(!signals.technical_pass());
    }

    #[test]
    fn test_wr_thresholds_use_negative_scale() {
        let mut row = defined_row();
        row.wr14 = Some(-79.9);
        let signals = SignalSet::evaluate(&row);
        assert!(!signals.wr_bullish);
    }

    #[test]
    fn test_rsi_neutral_band_is_exclusive() {
        let mut row = defined_row();
        row.rsi14 = Some(30.0);
        assert!(!SignalSet::evaluate(&row).rsi_bullish);
        row.rsi14 = Some(70.0);
        assert!(!SignalSet::evaluate(&row).rsi_bullish);
        row.rsi14 = Some(30.1);
        assert!(SignalSet::evaluate(&row).rsi_bullish);
    }

    #[test]
    fn test_active_names() {
        let signals = SignalSet {
            macd_bullish: true,
            kdj_bullish: true,
            ..Default::default()
        };
        assert_eq!(signals.active(), vec!["macd_bullish", "kdj_bullish"]);
    }
}
