//! Technical indicators over a [`PriceSeries`].
//!
//! Every column holds one entry per price point. `None` means the window was
//! not filled yet at that point; short series degrade to `None`, never to an
//! error. All values are rounded to six fractional digits.
//!
//! Only close prices are available, so ADX is computed with
//! `high = low = close = price`.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::services::strategies::PriceSeries;
use crate::utils::precision::round6_opt;

pub const SMA_FAST: usize = 5;
pub const SMA_SLOW: usize = 10;
pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BB_WINDOW: usize = 20;
pub const BB_K: f64 = 2.0;
pub const ADX_WINDOW: usize = 14;

pub type Column = Vec<Option<f64>>;

/// Trailing arithmetic mean of `window` prices ending at each point.
pub fn sma(prices: &[f64], window: usize) -> Column {
    if window == 0 {
        return vec![None; prices.len()];
    }
    (0..prices.len())
        .map(|i| (i + 1 >= window).then(|| prices[i + 1 - window..=i].mean()))
        .collect()
}

/// Recursive exponential average seeded with the first value.
fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut acc: Option<f64> = None;
    for &v in values {
        let next = match acc {
            None => v,
            Some(prev) => prev + alpha * (v - prev),
        };
        out.push(next);
        acc = Some(next);
    }
    out
}

/// Exponential moving average with `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, 2.0 / (span as f64 + 1.0))
}

/// Relative strength index with Wilder smoothing (`alpha = 1 / window`).
///
/// The first point counts as a zero move, so the value is defined from the
/// `window`-th point on.
pub fn rsi(prices: &[f64], window: usize) -> Column {
    let n = prices.len();
    if window == 0 || n < window {
        return vec![None; n];
    }

    let deltas: Vec<f64> = std::iter::once(0.0)
        .chain(prices.windows(2).map(|w| w[1] - w[0]))
        .collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();

    let alpha = 1.0 / window as f64;
    let up = ewm(&gains, alpha);
    let down = ewm(&losses, alpha);

    (0..n)
        .map(|i| (i + 1 >= window).then(|| rsi_value(up[i], down[i])))
        .collect()
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line (`EMA(fast) - EMA(slow)`) and its `EMA(signal)`.
///
/// Defined for any series of two or more points; early values are unstable.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> (Column, Column) {
    let n = prices.len();
    if n < 2 {
        return (vec![None; n], vec![None; n]);
    }
    let line: Vec<f64> = ema(prices, fast)
        .iter()
        .zip(ema(prices, slow))
        .map(|(f, s)| f - s)
        .collect();
    let sig = ema(&line, signal);
    (
        line.into_iter().map(Some).collect(),
        sig.into_iter().map(Some).collect(),
    )
}

/// Rolling mean ± `k` population standard deviations. Returns `(high, low)`.
pub fn bollinger_bands(prices: &[f64], window: usize, k: f64) -> (Column, Column) {
    let n = prices.len();
    let mut high = vec![None; n];
    let mut low = vec![None; n];
    if window == 0 {
        return (high, low);
    }

    for i in (window - 1)..n {
        let slice = &prices[i + 1 - window..=i];
        let mean = slice.mean();
        let std = slice.population_std_dev();
        high[i] = Some(mean + k * std);
        low[i] = Some(mean - k * std);
    }
    (high, low)
}

/// Wilder ADX on close prices only.
///
/// True range collapses to `|Δp|`, +DM to `max(Δp, 0)` and −DM to
/// `max(−Δp, 0)`. Needs `2 * window` points for the first value.
pub fn adx(prices: &[f64], window: usize) -> Column {
    let n = prices.len();
    let mut out = vec![None; n];
    if window == 0 || n < 2 * window {
        return out;
    }
    let w = window as f64;

    let (mut tr, mut pdm, mut ndm) = (0.0, 0.0, 0.0);
    for i in 1..=window {
        let d = prices[i] - prices[i - 1];
        tr += d.abs();
        pdm += d.max(0.0);
        ndm += (-d).max(0.0);
    }

    // dx[j] belongs to point `window + j`
    let mut dx = Vec::with_capacity(n - window);
    dx.push(directional_index(tr, pdm, ndm));
    for i in (window + 1)..n {
        let d = prices[i] - prices[i - 1];
        tr = tr - tr / w + d.abs();
        pdm = pdm - pdm / w + d.max(0.0);
        ndm = ndm - ndm / w + (-d).max(0.0);
        dx.push(directional_index(tr, pdm, ndm));
    }

    let mut value = dx[..window].iter().sum::<f64>() / w;
    out[2 * window - 1] = Some(value);
    for (j, &d) in dx.iter().enumerate().skip(window) {
        value = (value * (w - 1.0) + d) / w;
        out[window + j] = Some(value);
    }
    out
}

fn directional_index(tr: f64, pdm: f64, ndm: f64) -> f64 {
    if tr <= 0.0 {
        return 0.0;
    }
    let pdi = 100.0 * pdm / tr;
    let ndi = 100.0 * ndm / tr;
    let sum = pdi + ndi;
    if sum <= 0.0 {
        0.0
    } else {
        100.0 * (pdi - ndi).abs() / sum
    }
}

/// Full per-point indicator table for one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorFrame {
    pub sma_fast: Column,
    pub sma_slow: Column,
    pub rsi: Column,
    pub macd: Column,
    pub macd_signal: Column,
    pub bb_high: Column,
    pub bb_low: Column,
    pub adx: Column,
}

/// Indicator values at a single point, usually the latest one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_high: Option<f64>,
    pub bb_low: Option<f64>,
    pub adx: Option<f64>,
}

impl IndicatorSnapshot {
    /// Names of the fields left undefined by a short series.
    pub fn undefined_fields(&self) -> Vec<&'static str> {
        [
            ("sma_fast", self.sma_fast),
            ("sma_slow", self.sma_slow),
            ("rsi", self.rsi),
            ("macd", self.macd),
            ("macd_signal", self.macd_signal),
            ("bb_high", self.bb_high),
            ("bb_low", self.bb_low),
            ("adx", self.adx),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.is_none().then_some(name))
        .collect()
    }
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.sma_fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma_fast.is_empty()
    }

    pub fn at(&self, i: usize) -> IndicatorSnapshot {
        let cell = |c: &Column| c.get(i).copied().flatten();
        IndicatorSnapshot {
            sma_fast: cell(&self.sma_fast),
            sma_slow: cell(&self.sma_slow),
            rsi: cell(&self.rsi),
            macd: cell(&self.macd),
            macd_signal: cell(&self.macd_signal),
            bb_high: cell(&self.bb_high),
            bb_low: cell(&self.bb_low),
            adx: cell(&self.adx),
        }
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.len()
            .checked_sub(1)
            .map(|i| self.at(i))
            .unwrap_or_default()
    }
}

fn rounded(col: Column) -> Column {
    col.into_iter().map(round6_opt).collect()
}

/// Computes every indicator the decision rules read.
pub fn compute(series: &PriceSeries) -> IndicatorFrame {
    let prices = series.prices();
    if prices.len() < BB_WINDOW {
        log::debug!(
            "series of {} points is shorter than the {BB_WINDOW}-point bollinger window",
            prices.len()
        );
    }

    let (macd_line, macd_signal) = macd(&prices, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let (bb_high, bb_low) = bollinger_bands(&prices, BB_WINDOW, BB_K);

    IndicatorFrame {
        sma_fast: rounded(sma(&prices, SMA_FAST)),
        sma_slow: rounded(sma(&prices, SMA_SLOW)),
        rsi: rounded(rsi(&prices, RSI_WINDOW)),
        macd: rounded(macd_line),
        macd_signal: rounded(macd_signal),
        bb_high: rounded(bb_high),
        bb_low: rounded(bb_low),
        adx: rounded(adx(&prices, ADX_WINDOW)),
    }
}

// ======================================================================
// UNIT TESTS
// ======================================================================
