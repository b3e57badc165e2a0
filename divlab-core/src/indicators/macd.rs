//! Moving Average Convergence Divergence (MACD).
//!
//! macd      = EMA(close, fast) - EMA(close, slow)
//! signal    = EMA(macd, signal)
//! histogram = macd - signal
//!
//! With the default simple EMA seed every line is defined from the first bar.

use serde::{Deserialize, Serialize};

use crate::domain::Series;
use crate::error::Result;

use super::check_finite;
use super::ema::{EmaSeed, EmaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub seed: EmaSeed,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            seed: EmaSeed::First,
        }
    }
}

impl MacdParams {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast,
            slow,
            signal,
            seed: EmaSeed::First,
        }
    }

    pub fn validate(&self) -> Result<()> {
        crate::error::check_period("macd.fast", self.fast)?;
        crate::error::check_period("macd.slow", self.slow)?;
        crate::error::check_period("macd.signal", self.signal)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct MacdState {
    params: MacdParams,
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
}

impl MacdState {
    pub fn new(params: MacdParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            fast: EmaState::with_seed(params.fast, params.seed)?,
            slow: EmaState::with_seed(params.slow, params.seed)?,
            signal: EmaState::with_seed(params.signal, params.seed)?,
        })
    }

    pub fn lookback(&self) -> usize {
        match self.params.seed {
            EmaSeed::First => 0,
            EmaSeed::Sma => {
                self.params.fast.max(self.params.slow) - 1 + self.params.signal - 1
            }
        }
    }

    pub fn update(&mut self, close: f64) -> Option<MacdValue> {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let macd = fast? - slow?;
        let signal = self.signal.update(macd)?;
        Some(MacdValue {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

/// MACD, signal and histogram lines, each aligned to the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdSeries {
    pub macd_line: Series,
    pub signal_line: Series,
    pub histogram: Series,
}

impl MacdSeries {
    pub fn push(&mut self, value: Option<MacdValue>) {
        self.macd_line.push(value.map(|v| v.macd));
        self.signal_line.push(value.map(|v| v.signal));
        self.histogram.push(value.map(|v| v.histogram));
    }

    pub fn len(&self) -> usize {
        self.macd_line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd_line.is_empty()
    }
}

/// Batch MACD over a close-price slice.
pub fn macd(values: &[f64], params: MacdParams) -> Result<MacdSeries> {
    check_finite(values, "data")?;
    let mut state = MacdState::new(params)?;
    let mut out = MacdSeries::default();
    for &v in values {
        out.push(state.update(v));
    }
    Ok(out)
}
