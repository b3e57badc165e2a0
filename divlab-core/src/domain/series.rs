//! Aligned numeric series with a warm-up prefix.
//!
//! A `Series` always has one slot per bar. Slots before `valid_from` hold
//! `f64::NAN` and read back as undefined.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaError};

use super::bar::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    values: Vec<f64>,
    /// Index of the first defined value; equals `len()` while nothing is defined.
    valid_from: usize,
}

impl Default for Series {
    fn default() -> Self {
        Self::new()
    }
}

impl Series {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            valid_from: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            valid_from: 0,
        }
    }

    /// Append the next slot. `None` marks a warm-up slot.
    pub fn push(&mut self, value: Option<f64>) {
        let defined_before = self.valid_from < self.values.len();
        match value {
            Some(v) => {
                if !defined_before {
                    self.valid_from = self.values.len();
                }
                self.values.push(v);
            }
            None => {
                self.values.push(f64::NAN);
                if !defined_before {
                    self.valid_from = self.values.len();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn valid_from(&self) -> usize {
        self.valid_from
    }

    /// Raw values, `NAN` in the warm-up prefix.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Defined value at `index`, or `None` for warm-up / out-of-range slots.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .copied()
            .filter(|v| index >= self.valid_from && !v.is_nan())
    }

    pub fn last(&self) -> Option<f64> {
        self.values.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Like [`get`](Self::get) but reports warm-up as `InsufficientData`.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        if index >= self.values.len() {
            return Err(TaError::InsufficientData {
                required: index + 1,
                available: self.values.len(),
            });
        }
        self.get(index).ok_or(TaError::InsufficientData {
            required: self.valid_from.max(index) + 1,
            available: index + 1,
        })
    }

    /// Pair each slot with the matching bar time.
    pub fn points(&self, bars: &[Bar]) -> Vec<SeriesPoint> {
        bars.iter()
            .enumerate()
            .map(|(i, bar)| SeriesPoint {
                time: bar.time,
                value: self.get(i),
            })
            .collect()
    }
}

impl FromIterator<Option<f64>> for Series {
    fn from_iter<I: IntoIterator<Item = Option<f64>>>(iter: I) -> Self {
        let mut series = Series::new();
        for v in iter {
            series.push(v);
        }
        series
    }
}

/// One `{time, value}` sample as handed to chart adapters. `value` is
/// `null` in the warm-up prefix so the output stays aligned with the bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_prefix_is_undefined() {
        let s: Series = vec![None, None, Some(1.0), Some(2.0)].into_iter().collect();
        assert_eq!(s.len(), 4);
        assert_eq!(s.valid_from(), 2);
        assert_eq!(s.get(1), None);
        assert_eq!(s.get(2), Some(1.0));
        assert!(s.values()[0].is_nan());
    }

    #[test]
    fn value_at_reports_insufficient_data() {
        let s: Series = vec![None, None, Some(1.0)].into_iter().collect();
        assert_eq!(
            s.value_at(0),
            Err(TaError::InsufficientData {
                required: 3,
                available: 1
            })
        );
        assert_eq!(s.value_at(2), Ok(1.0));
        assert!(s.value_at(5).is_err());
    }

    #[test]
    fn all_warmup_has_valid_from_at_len() {
        let s: Series = vec![None, None].into_iter().collect();
        assert_eq!(s.valid_from(), 2);
        assert_eq!(s.last(), None);
    }

    #[test]
    fn points_are_aligned_with_bars() {
        let bars = vec![
            Bar::new(60, 1.0, 1.0, 1.0, 1.0),
            Bar::new(120, 1.0, 1.0, 1.0, 1.0),
        ];
        let s: Series = vec![None, Some(5.0)].into_iter().collect();
        let pts = s.points(&bars);
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0], SeriesPoint { time: 60, value: None });
        assert_eq!(pts[1], SeriesPoint { time: 120, value: Some(5.0) });
    }
}
