//! Technical indicator engine.
//!
//! `IndicatorEngine::compute` is a pure function from a candle series to an
//! indicator frame. Every derived column at row `i` depends only on rows
//! `<= i`; rows whose window exceeds the available history hold `None`,
//! never a fabricated number, and no row is ever dropped for lack of
//! history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{CandleSeries, Period};

// ============================================================================
// Window Constants
// ============================================================================

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const RSI_WINDOW: usize = 14;
const BOLL_WINDOW: usize = 20;
const BOLL_WIDTH: f64 = 2.0;
const KDJ_WINDOW: usize = 9;
/// KDJ %K/%D smoothing weight (3-period span)
const KDJ_ALPHA: f64 = 1.0 / 3.0;
const WR_SHORT: usize = 14;
const WR_LONG: usize = 21;

// ============================================================================
// Frame Types
// ============================================================================

/// One candle row with its derived indicator columns.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorRow {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: u64,

    pub sma5: Option<f64>,
    pub sma10: Option<f64>,
    pub sma20: Option<f64>,
    pub sma60: Option<f64>,
    pub volume_sma5: Option<f64>,
    pub volume_sma10: Option<f64>,

    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,

    pub rsi14: Option<f64>,

    pub boll_mid: Option<f64>,
    pub boll_upper: Option<f64>,
    pub boll_lower: Option<f64>,

    pub kdj_k: Option<f64>,
    pub kdj_d: Option<f64>,

    /// Williams %R on the conventional negative scale [-100, 0]
    pub wr14: Option<f64>,
    pub wr21: Option<f64>,
}

/// A candle series augmented with derived indicator columns.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorFrame {
    symbol: String,
    period: Period,
    rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The most recent row, the one screening rules evaluate.
    pub fn latest(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless indicator computer.
pub struct IndicatorEngine;

impl IndicatorEngine {
    /// Compute all indicator columns over a candle series.
    pub fn compute(series: &CandleSeries) -> IndicatorFrame {
        let candles = series.candles();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume as f64).collect();

        let sma5 = sma(&closes, 5);
        let sma10 = sma(&closes, 10);
        let sma20 = sma(&closes, 20);
        let sma60 = sma(&closes, 60);
        let volume_sma5 = sma(&volumes, 5);
        let volume_sma10 = sma(&volumes, 10);

        let (macd, macd_signal, macd_hist) = macd(&closes);
        let rsi14 = rsi(&closes, RSI_WINDOW);
        let (boll_mid, boll_upper, boll_lower) = bollinger(&closes, BOLL_WINDOW, BOLL_WIDTH);
        let (kdj_k, kdj_d) = kdj(&closes, &highs, &lows, KDJ_WINDOW);
        let wr14 = williams_r(&closes, &highs, &lows, WR_SHORT);
        let wr21 = williams_r(&closes, &highs, &lows, WR_LONG);

        let rows = candles
            .iter()
            .enumerate()
            .map(|(i, c)| IndicatorRow {
                timestamp: c.timestamp,
                close: c.close,
                volume: c.volume,
                sma5: sma5[i],
                sma10: sma10[i],
                sma20: sma20[i],
                sma60: sma60[i],
                volume_sma5: volume_sma5[i],
                volume_sma10: volume_sma10[i],
                macd: macd[i],
                macd_signal: macd_signal[i],
                macd_hist: macd_hist[i],
                rsi14: rsi14[i],
                boll_mid: boll_mid[i],
                boll_upper: boll_upper[i],
                boll_lower: boll_lower[i],
                kdj_k: kdj_k[i],
                kdj_d: kdj_d[i],
                wr14: wr14[i],
                wr21: wr21[i],
            })
            .collect();

        IndicatorFrame {
            symbol: series.symbol().to_string(),
            period: series.period(),
            rows,
        }
    }
}

// ============================================================================
// Rolling Primitives
// ============================================================================

/// Trailing arithmetic mean; undefined for the first `n - 1` rows.
fn sma(values: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if n == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= n {
            sum -= values[i - n];
        }
        if i + 1 >= n {
            out[i] = Some(sum / n as f64);
        }
    }
    out
}

/// Recursive EMA seeded with the first value (no look-ahead). Defined for
/// every row; warm-up masking is the caller's concern.
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => p + alpha * (v - p),
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Trailing sample standard deviation (ddof = 1); undefined for the first
/// `n - 1` rows.
fn rolling_std(values: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if n < 2 {
        return out;
    }
    for i in (n - 1)..values.len() {
        let window = &values[i + 1 - n..=i];
        let mean = window.iter().sum::<f64>() / n as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        out[i] = Some(var.sqrt());
    }
    out
}

fn rolling_max(values: &[f64], n: usize, i: usize) -> f64 {
    values[i + 1 - n..=i].iter().cloned().fold(f64::MIN, f64::max)
}

fn rolling_min(values: &[f64], n: usize, i: usize) -> f64 {
    values[i + 1 - n..=i].iter().cloned().fold(f64::MAX, f64::min)
}

// ============================================================================
// Indicators
// ============================================================================

/// MACD(12,26,9). All three columns are masked until the slow EMA has a full
/// 26-row warm-up; the signal EMA is seeded from the first unmasked macd
/// value.
#[allow(clippy::type_complexity)]
fn macd(closes: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let len = closes.len();
    let mut macd_col = vec![None; len];
    let mut signal_col = vec![None; len];
    let mut hist_col = vec![None; len];
    if len < MACD_SLOW {
        return (macd_col, signal_col, hist_col);
    }

    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);
    let alpha = 2.0 / (MACD_SIGNAL as f64 + 1.0);

    let mut signal: Option<f64> = None;
    for i in (MACD_SLOW - 1)..len {
        let m = fast[i] - slow[i];
        let s = match signal {
            Some(prev) => prev + alpha * (m - prev),
            None => m,
        };
        signal = Some(s);
        macd_col[i] = Some(m);
        signal_col[i] = Some(s);
        hist_col[i] = Some(m - s);
    }

    (macd_col, signal_col, hist_col)
}

/// RSI with a Wilder-style simple rolling mean of gains/losses. Undefined
/// until `n` deltas exist and whenever the average loss is zero.
fn rsi(closes: &[f64], n: usize) -> Vec<Option<f64>> {
    let len = closes.len();
    let mut out = vec![None; len];
    if len < n + 1 {
        return out;
    }

    for i in n..len {
        let mut gains = 0.0;
        let mut losses = 0.0;
        for j in (i + 1 - n)..=i {
            let delta = closes[j] - closes[j - 1];
            if delta > 0.0 {
                gains += delta;
            } else {
                losses -= delta;
            }
        }
        let avg_gain = gains / n as f64;
        let avg_loss = losses / n as f64;
        if avg_loss == 0.0 {
            continue;
        }
        out[i] = Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss));
    }
    out
}

/// Bollinger bands: middle = SMA(n), upper/lower = middle +/- width * std(n).
#[allow(clippy::type_complexity)]
fn bollinger(
    closes: &[f64],
    n: usize,
    width: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let mid = sma(closes, n);
    let std = rolling_std(closes, n);
    let upper = mid
        .iter()
        .zip(&std)
        .map(|(m, s)| Some(m.as_ref()? + width * s.as_ref()?))
        .collect();
    let lower = mid
        .iter()
        .zip(&std)
        .map(|(m, s)| Some(m.as_ref()? - width * s.as_ref()?))
        .collect();
    (mid, upper, lower)
}

/// KDJ(9,3,3): raw %K over a 9-bar high/low range, %K and %D smoothed with
/// the classic 1/3-weight recursion. A flat 9-bar range leaves the row
/// undefined without resetting the smoother state.
fn kdj(
    closes: &[f64],
    highs: &[f64],
    lows: &[f64],
    n: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let len = closes.len();
    let mut k_col = vec![None; len];
    let mut d_col = vec![None; len];

    let mut k_state: Option<f64> = None;
    let mut d_state: Option<f64> = None;
    for i in 0..len {
        if i + 1 < n {
            continue;
        }
        let hh = rolling_max(highs, n, i);
        let ll = rolling_min(lows, n, i);
        if hh == ll {
            continue;
        }
        let rsv = (closes[i] - ll) / (hh - ll) * 100.0;

        let k = match k_state {
            Some(prev) => prev * (1.0 - KDJ_ALPHA) + rsv * KDJ_ALPHA,
            None => rsv,
        };
        let d = match d_state {
            Some(prev) => prev * (1.0 - KDJ_ALPHA) + k * KDJ_ALPHA,
            None => k,
        };
        k_state = Some(k);
        d_state = Some(d);
        k_col[i] = Some(k);
        d_col[i] = Some(d);
    }

    (k_col, d_col)
}

/// Williams %R on the conventional negative scale: 0 at the window high,
/// -100 at the window low. A flat range leaves the row undefined.
fn williams_r(closes: &[f64], highs: &[f64], lows: &[f64], n: usize) -> Vec<Option<f64>> {
    let len = closes.len();
    let mut out = vec![None; len];
    for i in 0..len {
        if i + 1 < n {
            continue;
        }
        let hh = rolling_max(highs, n, i);
        let ll = rolling_min(lows, n, i);
        if hh == ll {
            continue;
        }
        out[i] = Some(-((hh - closes[i]) / (hh - ll) * 100.0));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
