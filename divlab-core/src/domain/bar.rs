//! Bar and BarSeries: the market data the whole pipeline runs on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaError};

/// One OHLC candle. `time` is seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, all finite.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }

    /// Validate a bar that will sit at `index` in a series.
    pub fn validate(&self, index: usize) -> Result<()> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(TaError::invalid_at(field, index));
            }
        }
        if !self.is_sane() {
            return Err(TaError::invalid_at("ohlc_envelope", index));
        }
        Ok(())
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

/// Append-only, time-ordered sequence of validated bars.
///
/// Every bar pushed is checked for a sane OHLC envelope and a strictly
/// increasing timestamp, so downstream stages never see malformed input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bars: Vec::with_capacity(capacity),
        }
    }

    /// Build a series from bars already sorted ascending by time.
    pub fn from_bars(bars: Vec<Bar>) -> Result<Self> {
        let mut series = Self::with_capacity(bars.len());
        for bar in bars {
            series.push(bar)?;
        }
        Ok(series)
    }

    /// Append one bar. Fails without modifying the series if the bar is
    /// malformed or not strictly after the current last bar.
    pub fn push(&mut self, bar: Bar) -> Result<()> {
        let index = self.bars.len();
        bar.validate(index)?;
        if let Some(last) = self.bars.last() {
            if bar.time <= last.time {
                return Err(TaError::invalid_at("time", index));
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
