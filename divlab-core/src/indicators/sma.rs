//! Simple Moving Average (SMA).
//!
//! Rolling mean over a window of `period` values.
//! Lookback: period - 1 (first valid value at index period-1).

use std::collections::VecDeque;

use crate::domain::Series;
use crate::error::{check_period, Result};

use super::check_finite;

/// Neumaier-compensated running sum. Keeps the rounding error of values that
/// have already left the window out of later means.
#[derive(Debug, Clone, Copy, Default)]
struct RunningSum {
    sum: f64,
    compensation: f64,
}

impl RunningSum {
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Streaming SMA: O(1) per update, memory bounded by `period`.
#[derive(Debug, Clone)]
pub struct SmaState {
    period: usize,
    window: VecDeque<f64>,
    sum: RunningSum,
}

impl SmaState {
    pub fn new(period: usize) -> Result<Self> {
        check_period("sma.period", period)?;
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: RunningSum::default(),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn lookback(&self) -> usize {
        self.period - 1
    }

    /// Values currently inside the window, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push_back(value);
        self.sum.add(value);
        if self.window.len() > self.period {
            if let Some(leaving) = self.window.pop_front() {
                self.sum.add(-leaving);
            }
        }
        if self.window.len() < self.period {
            return None;
        }
        Some(self.sum.value() / self.period as f64)
    }
}

/// Batch SMA over a value slice.
pub fn sma(values: &[f64], period: usize) -> Result<Series> {
    check_finite(values, "data")?;
    let mut state = SmaState::new(period)?;
    Ok(values.iter().map(|&v| state.update(v)).collect())
}
