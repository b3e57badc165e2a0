//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing: avg = (avg * (period-1) + tr) / period.
//! TR needs a previous close, so the first bar has none and the seed is the
//! mean of TR[1..=period]. Lookback: period.

use crate::domain::{Bar, Series};
use crate::error::{check_period, Result};

use super::clamp_underflow;

/// True range of `bar` against the previous close. `None` for the first bar.
pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> Option<f64> {
    let pc = prev_close?;
    let (h, l) = (bar.high, bar.low);
    Some((h - l).max((h - pc).abs()).max((l - pc).abs()))
}

/// Wilder smoothing. Seed: mean of the first `period` inputs.
#[derive(Debug, Clone)]
pub struct WilderSmoother {
    period: usize,
    seen: usize,
    sum: f64,
    avg: Option<f64>,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Result<Self> {
        check_period("wilder.period", period)?;
        Ok(Self {
            period,
            seen: 0,
            sum: 0.0,
            avg: None,
        })
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        let p = self.period as f64;
        let next = match self.avg {
            Some(avg) => (avg * (p - 1.0) + value) / p,
            None => {
                self.seen += 1;
                self.sum += value;
                if self.seen < self.period {
                    return None;
                }
                self.sum / p
            }
        };
        let next = clamp_underflow(next);
        self.avg = Some(next);
        Some(next)
    }
}

#[derive(Debug, Clone)]
pub struct AtrState {
    period: usize,
    prev_close: Option<f64>,
    smoother: WilderSmoother,
}

impl AtrState {
    pub fn new(period: usize) -> Result<Self> {
        check_period("atr.period", period)?;
        Ok(Self {
            period,
            prev_close: None,
            smoother: WilderSmoother::new(period)?,
        })
    }

    pub fn lookback(&self) -> usize {
        self.period
    }

    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);
        tr.and_then(|tr| self.smoother.update(tr))
    }
}

/// Batch ATR over bars (validated via [`BarSeries`](crate::domain::BarSeries)
/// or [`check_bars`](super::check_bars)).
pub fn atr(bars: &[Bar], period: usize) -> Result<Series> {
    super::check_bars(bars)?;
    let mut state = AtrState::new(period)?;
    Ok(bars.iter().map(|b| state.update(b)).collect())
}
