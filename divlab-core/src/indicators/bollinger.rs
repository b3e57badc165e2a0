//! Bollinger Bands: moving average +/- k population standard deviations.
//!
//! - Middle: SMA(period)
//! - Upper: middle + k * stddev
//! - Lower: middle - k * stddev
//!
//! Lookback: period - 1.

use serde::{Deserialize, Serialize};

use crate::domain::Series;
use crate::error::{Result, TaError};

use super::check_finite;
use super::sma::SmaState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerValue {
    pub mid: f64,
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct BollingerState {
    sma: SmaState,
    k: f64,
}

impl BollingerState {
    pub fn new(period: usize, k: f64) -> Result<Self> {
        if !k.is_finite() || k < 0.0 {
            return Err(TaError::invalid("bbands.k"));
        }
        Ok(Self {
            sma: SmaState::new(period)?,
            k,
        })
    }

    pub fn lookback(&self) -> usize {
        self.sma.lookback()
    }

    pub fn update(&mut self, value: f64) -> Option<BollingerValue> {
        let mid = self.sma.update(value)?;
        let period = self.sma.period() as f64;
        // Two-pass over the bounded window keeps the variance non-negative.
        let variance = self
            .sma
            .window()
            .map(|v| {
                let diff = v - mid;
                diff * diff
            })
            .sum::<f64>()
            / period;
        let stddev = variance.max(0.0).sqrt();
        Some(BollingerValue {
            mid,
            upper: mid + self.k * stddev,
            lower: mid - self.k * stddev,
        })
    }
}

/// The three bands, each aligned to the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerSeries {
    pub mid: Series,
    pub upper: Series,
    pub lower: Series,
}

impl BollingerSeries {
    pub fn push(&mut self, value: Option<BollingerValue>) {
        self.mid.push(value.map(|v| v.mid));
        self.upper.push(value.map(|v| v.upper));
        self.lower.push(value.map(|v| v.lower));
    }

    pub fn len(&self) -> usize {
        self.mid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mid.is_empty()
    }
}

/// Batch Bollinger Bands over a value slice.
pub fn bollinger(values: &[f64], period: usize, k: f64) -> Result<BollingerSeries> {
    check_finite(values, "data")?;
    let mut state = BollingerState::new(period, k)?;
    let mut out = BollingerSeries::default();
    for &v in values {
        out.push(state.update(v));
    }
    Ok(out)
}
