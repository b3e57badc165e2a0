//! Indicator kernels.
//!
//! Every kernel has a streaming state type (`update` one input at a time,
//! bounded memory) and a batch function that is a plain fold over that state,
//! so batch and incremental results are bit-identical.
//!
//! [`Indicator`] is the closed set of overlays the pipeline knows how to run.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use atr::{atr, true_range, AtrState, WilderSmoother};
pub use bollinger::{bollinger, BollingerSeries, BollingerState, BollingerValue};
pub use ema::{ema, ema_with_seed, EmaSeed, EmaState};
pub use macd::{macd, MacdParams, MacdSeries, MacdState, MacdValue};
pub use rsi::{rsi, RsiState};
pub use sma::{sma, SmaState};

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Series};
use crate::error::{check_period, Result, TaError};

/// Closed set of indicators, tagged by `type` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Indicator {
    Sma {
        period: usize,
    },
    Ema {
        period: usize,
        #[serde(default)]
        seed: EmaSeed,
    },
    Rsi {
        period: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bbands {
        period: usize,
        k: f64,
    },
    Atr {
        period: usize,
    },
}

impl Indicator {
    /// Human-readable name (e.g., "sma_20", "macd_12_26_9").
    pub fn name(&self) -> String {
        match *self {
            Indicator::Sma { period } => format!("sma_{period}"),
            Indicator::Ema { period, .. } => format!("ema_{period}"),
            Indicator::Rsi { period } => format!("rsi_{period}"),
            Indicator::Macd { fast, slow, signal } => format!("macd_{fast}_{slow}_{signal}"),
            Indicator::Bbands { period, k } => format!("bbands_{period}_{k}"),
            Indicator::Atr { period } => format!("atr_{period}"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Indicator::Sma { period } => check_period("sma.period", period),
            Indicator::Ema { period, .. } => check_period("ema.period", period),
            Indicator::Rsi { period } => check_period("rsi.period", period),
            Indicator::Macd { fast, slow, signal } => MacdParams::new(fast, slow, signal).validate(),
            Indicator::Bbands { period, k } => {
                check_period("bbands.period", period)?;
                if !k.is_finite() || k < 0.0 {
                    return Err(TaError::invalid("bbands.k"));
                }
                Ok(())
            }
            Indicator::Atr { period } => check_period("atr.period", period),
        }
    }

    /// Number of leading bars with no defined output.
    pub fn lookback(&self) -> usize {
        match *self {
            Indicator::Sma { period } | Indicator::Bbands { period, .. } => {
                period.saturating_sub(1)
            }
            Indicator::Ema { period, seed } => match seed {
                EmaSeed::First => 0,
                EmaSeed::Sma => period.saturating_sub(1),
            },
            Indicator::Rsi { period } | Indicator::Atr { period } => period,
            Indicator::Macd { .. } => 0,
        }
    }

    /// Fresh streaming state for this indicator.
    pub fn state(&self) -> Result<IndicatorState> {
        self.validate()?;
        Ok(match *self {
            Indicator::Sma { period } => IndicatorState::Sma(SmaState::new(period)?),
            Indicator::Ema { period, seed } => {
                IndicatorState::Ema(EmaState::with_seed(period, seed)?)
            }
            Indicator::Rsi { period } => IndicatorState::Rsi(RsiState::new(period)?),
            Indicator::Macd { fast, slow, signal } => {
                IndicatorState::Macd(MacdState::new(MacdParams::new(fast, slow, signal))?)
            }
            Indicator::Bbands { period, k } => {
                IndicatorState::Bbands(BollingerState::new(period, k)?)
            }
            Indicator::Atr { period } => IndicatorState::Atr(AtrState::new(period)?),
        })
    }

    /// Empty output container of the right shape.
    pub fn empty_output(&self) -> IndicatorOutput {
        match self {
            Indicator::Macd { .. } => IndicatorOutput::Macd(MacdSeries::default()),
            Indicator::Bbands { .. } => IndicatorOutput::Bollinger(BollingerSeries::default()),
            _ => IndicatorOutput::Single(Series::new()),
        }
    }

    /// Compute the indicator over the whole bar slice.
    ///
    /// Output length always equals `bars.len()`.
    pub fn compute(&self, bars: &[Bar]) -> Result<IndicatorOutput> {
        check_bars(bars)?;
        let mut state = self.state()?;
        let mut out = self.empty_output();
        for bar in bars {
            out.push(state.update(bar));
        }
        Ok(out)
    }
}

/// Streaming state matching an [`Indicator`].
#[derive(Debug, Clone)]
pub enum IndicatorState {
    Sma(SmaState),
    Ema(EmaState),
    Rsi(RsiState),
    Macd(MacdState),
    Bbands(BollingerState),
    Atr(AtrState),
}

impl IndicatorState {
    pub fn update(&mut self, bar: &Bar) -> IndicatorValue {
        match self {
            IndicatorState::Sma(s) => IndicatorValue::Single(s.update(bar.close)),
            IndicatorState::Ema(s) => IndicatorValue::Single(s.update(bar.close)),
            IndicatorState::Rsi(s) => IndicatorValue::Single(s.update(bar.close)),
            IndicatorState::Macd(s) => IndicatorValue::Macd(s.update(bar.close)),
            IndicatorState::Bbands(s) => IndicatorValue::Bollinger(s.update(bar.close)),
            IndicatorState::Atr(s) => IndicatorValue::Single(s.update(bar)),
        }
    }
}

/// One bar's worth of indicator output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Single(Option<f64>),
    Macd(Option<MacdValue>),
    Bollinger(Option<BollingerValue>),
}

/// A full aligned indicator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "series", rename_all = "snake_case")]
pub enum IndicatorOutput {
    Single(Series),
    Macd(MacdSeries),
    Bollinger(BollingerSeries),
}

impl IndicatorOutput {
    /// Append one bar's value. A value of the wrong shape is recorded as warm-up.
    pub fn push(&mut self, value: IndicatorValue) {
        match (self, value) {
            (IndicatorOutput::Single(s), IndicatorValue::Single(v)) => s.push(v),
            (IndicatorOutput::Macd(s), IndicatorValue::Macd(v)) => s.push(v),
            (IndicatorOutput::Bollinger(s), IndicatorValue::Bollinger(v)) => s.push(v),
            (IndicatorOutput::Single(s), _) => s.push(None),
            (IndicatorOutput::Macd(s), _) => s.push(None),
            (IndicatorOutput::Bollinger(s), _) => s.push(None),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndicatorOutput::Single(s) => s.len(),
            IndicatorOutput::Macd(s) => s.len(),
            IndicatorOutput::Bollinger(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_single(&self) -> Option<&Series> {
        match self {
            IndicatorOutput::Single(s) => Some(s),
            _ => None,
        }
    }
}

/// Reject NaN/infinite values, reporting the first offending index.
pub(crate) fn check_finite(values: &[f64], field: &str) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(TaError::invalid_at(field, i)),
        None => Ok(()),
    }
}

/// Validate a raw bar slice the same way [`BarSeries`](crate::domain::BarSeries) does.
pub fn check_bars(bars: &[Bar]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate(i)?;
        if i > 0 && bar.time <= bars[i - 1].time {
            return Err(TaError::invalid_at("time", i));
        }
    }
    Ok(())
}

/// Flush subnormal smoothing results to zero.
pub(crate) fn clamp_underflow(value: f64) -> f64 {
    if value.abs() < f64::MIN_POSITIVE {
        0.0
    } else {
        value
    }
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open,close) + 1,
/// low = min(open,close) - 1, one bar per minute.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                1_700_000_000 + i as i64 * 60,
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Bar::new(1_700_000_000 + i as i64 * 60, open, high, low, close)
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
