//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = data[t] * k + EMA[t-1] * (1 - k), k = 2 / (period + 1).
//! Seed (default): EMA[0] = data[0], defined from the first value.
//! Seed (`EmaSeed::Sma`): EMA[period-1] = mean of the first `period` values.

use serde::{Deserialize, Serialize};

use crate::domain::Series;
use crate::error::{check_period, Result};

use super::check_finite;

/// How the recursion is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaSeed {
    /// `ema[0] = data[0]`.
    #[default]
    First,
    /// `ema[period-1] = SMA(data[0..period])`, undefined before it.
    Sma,
}

#[derive(Debug, Clone)]
pub struct EmaState {
    period: usize,
    k: f64,
    seed: EmaSeed,
    prev: Option<f64>,
    seed_sum: f64,
    seen: usize,
}

impl EmaState {
    pub fn new(period: usize) -> Result<Self> {
        Self::with_seed(period, EmaSeed::First)
    }

    pub fn with_seed(period: usize, seed: EmaSeed) -> Result<Self> {
        check_period("ema.period", period)?;
        Ok(Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seed,
            prev: None,
            seed_sum: 0.0,
            seen: 0,
        })
    }

    pub fn lookback(&self) -> usize {
        match self.seed {
            EmaSeed::First => 0,
            EmaSeed::Sma => self.period - 1,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.seen += 1;
        let next = match (self.prev, self.seed) {
            (Some(prev), _) => value * self.k + prev * (1.0 - self.k),
            (None, EmaSeed::First) => value,
            (None, EmaSeed::Sma) => {
                self.seed_sum += value;
                if self.seen < self.period {
                    return None;
                }
                self.seed_sum / self.period as f64
            }
        };
        self.prev = Some(next);
        Some(next)
    }
}

/// Batch EMA over a value slice.
pub fn ema(values: &[f64], period: usize) -> Result<Series> {
    ema_with_seed(values, period, EmaSeed::First)
}

pub fn ema_with_seed(values: &[f64], period: usize, seed: EmaSeed) -> Result<Series> {
    check_finite(values, "data")?;
    let mut state = EmaState::with_seed(period, seed)?;
    Ok(values.iter().map(|&v| state.update(v)).collect())
}
