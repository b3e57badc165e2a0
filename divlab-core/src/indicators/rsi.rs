//! Relative Strength Index (RSI).
//!
//! Wilder smoothing of average gains and average losses, seeded with the
//! plain mean of the first `period` price changes.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); avg_loss == 0 → 100.
//! Lookback: period.

use crate::domain::Series;
use crate::error::{check_period, Result};

use super::atr::WilderSmoother;
use super::check_finite;

#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev: Option<f64>,
    gains: WilderSmoother,
    losses: WilderSmoother,
}

impl RsiState {
    pub fn new(period: usize) -> Result<Self> {
        check_period("rsi.period", period)?;
        Ok(Self {
            period,
            prev: None,
            gains: WilderSmoother::new(period)?,
            losses: WilderSmoother::new(period)?,
        })
    }

    pub fn lookback(&self) -> usize {
        self.period
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev.replace(close)?;
        let change = close - prev;
        let avg_gain = self.gains.update(change.max(0.0));
        let avg_loss = self.losses.update((-change).max(0.0));
        match (avg_gain, avg_loss) {
            (Some(g), Some(l)) => Some(compute_rsi(g, l)),
            _ => None,
        }
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
    rsi.clamp(0.0, 100.0)
}

/// Batch RSI over a close-price slice.
pub fn rsi(values: &[f64], period: usize) -> Result<Series> {
    check_finite(values, "data")?;
    let mut state = RsiState::new(period)?;
    Ok(values.iter().map(|&v| state.update(v)).collect())
}
