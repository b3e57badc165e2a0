//! Pivot detection over windowed local extrema.
//!
//! A pivot at index `i` needs `left` bars before it and `right` bars after it.
//! The central value must be >= (highs) or <= (lows) every value in the closed
//! window `[i-left, i+right]`; ties are allowed. The last `right` bars of a
//! series can never host a confirmed pivot yet.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{check_window, Result, TaError};
use crate::indicators::check_finite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

fn dominates(kind: PivotKind, center: f64, other: f64) -> bool {
    match kind {
        PivotKind::High => center >= other,
        PivotKind::Low => center <= other,
    }
}

/// All confirmed pivots of one kind, in index order.
pub fn find_pivots(
    series: &[f64],
    left: usize,
    right: usize,
    kind: PivotKind,
) -> Result<Vec<Pivot>> {
    check_finite(series, "series")?;
    check_window("pivot_left", left)?;
    check_window("pivot_right", right)?;
    let span = left + right + 1;
    if series.len() < span {
        return Err(TaError::InsufficientData {
            required: span,
            available: series.len(),
        });
    }

    let pivots = (left..series.len() - right)
        .filter(|&i| {
            let center = series[i];
            series[i - left..=i + right]
                .iter()
                .all(|&v| dominates(kind, center, v))
        })
        .map(|i| Pivot {
            index: i,
            price: series[i],
            kind,
        })
        .collect();
    Ok(pivots)
}

/// Incremental pivot confirmer.
///
/// Each pushed value may confirm at most one pivot, at index
/// `n - 1 - right` where `n` is the number of values pushed so far.
/// Memory is bounded by the window size.
#[derive(Debug, Clone)]
pub struct PivotTracker {
    left: usize,
    right: usize,
    kind: PivotKind,
    window: VecDeque<f64>,
    pushed: usize,
}

impl PivotTracker {
    pub fn new(left: usize, right: usize, kind: PivotKind) -> Result<Self> {
        check_window("pivot_left", left)?;
        check_window("pivot_right", right)?;
        Ok(Self {
            left,
            right,
            kind,
            window: VecDeque::with_capacity(left + right + 2),
            pushed: 0,
        })
    }

    pub fn kind(&self) -> PivotKind {
        self.kind
    }

    fn span(&self) -> usize {
        self.left + self.right + 1
    }

    pub fn push(&mut self, value: f64) -> Option<Pivot> {
        self.window.push_back(value);
        self.pushed += 1;
        if self.window.len() > self.span() {
            self.window.pop_front();
        }
        if self.window.len() < self.span() {
            return None;
        }

        let center = self.window[self.left];
        if !self.window.iter().all(|&v| dominates(self.kind, center, v)) {
            return None;
        }
        let pivot = Pivot {
            index: self.pushed - 1 - self.right,
            price: center,
            kind: self.kind,
        };
        tracing::trace!(index = pivot.index, price = pivot.price, kind = ?pivot.kind, "pivot confirmed");
        Some(pivot)
    }
}
