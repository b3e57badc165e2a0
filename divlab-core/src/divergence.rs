//! Price/oscillator divergence between consecutive same-kind pivots.
//!
//! Default (`Hidden`) definitions, compared on pivots of the same kind:
//! - Bullish, on lows: price makes a higher low while the oscillator makes a lower low.
//! - Bearish, on highs: price makes a lower high while the oscillator makes a higher high.
//!
//! `Regular` divergences (lower price low with higher oscillator low, and the
//! bearish mirror) are opt-in via `detect_regular`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::error::{check_period, check_window, Result, TaError};
use crate::pivots::{find_pivots, Pivot, PivotKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceClass {
    /// Price continues the trend, oscillator retraces.
    Hidden,
    /// Price extends, oscillator fails to confirm.
    Regular,
}

/// Which bar prices feed the pivot finder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Closes for both highs and lows.
    #[default]
    Close,
    /// Bar highs for high pivots, bar lows for low pivots.
    Wicks,
}

impl PriceSource {
    pub fn high(self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Wicks => bar.high,
        }
    }

    pub fn low(self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Wicks => bar.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    pub pivot_left: usize,
    pub pivot_right: usize,
    /// Maximum distance in bars between the two pivots.
    pub lookback: usize,
    /// How many previous same-kind pivots to compare against, nearest first.
    pub pivots_to_check: usize,
    pub price_source: PriceSource,
    pub detect_regular: bool,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            pivot_left: 5,
            pivot_right: 5,
            lookback: 60,
            pivots_to_check: 1,
            price_source: PriceSource::Close,
            detect_regular: false,
        }
    }
}

impl DivergenceConfig {
    pub fn validate(&self) -> Result<()> {
        check_window("divergence.pivot_left", self.pivot_left)?;
        check_window("divergence.pivot_right", self.pivot_right)?;
        check_period("divergence.pivots_to_check", self.pivots_to_check)?;
        if self.lookback == 0 {
            return Err(TaError::invalid("divergence.lookback"));
        }
        Ok(())
    }

    /// Bars needed before the first pivot can be confirmed.
    pub fn min_bars(&self) -> usize {
        self.pivot_left
            .saturating_add(self.pivot_right)
            .saturating_add(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    pub class: DivergenceClass,
    pub from_index: usize,
    pub to_index: usize,
    pub from_price: f64,
    pub to_price: f64,
    pub from_oscillator: f64,
    pub to_oscillator: f64,
    /// Bar at which the later pivot was confirmed (`to_index + pivot_right`).
    pub confirmed_index: usize,
}

/// Divergence detector over a stream of confirmed pivots.
///
/// Keeps only the last `pivots_to_check` pivots of each kind.
#[derive(Debug, Clone)]
pub struct DivergenceDetector {
    config: DivergenceConfig,
    highs: VecDeque<Pivot>,
    lows: VecDeque<Pivot>,
}

impl DivergenceDetector {
    pub fn new(config: DivergenceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            highs: VecDeque::with_capacity(config.pivots_to_check),
            lows: VecDeque::with_capacity(config.pivots_to_check),
        })
    }

    pub fn config(&self) -> &DivergenceConfig {
        &self.config
    }

    /// Feed a newly confirmed pivot. `oscillator(i)` returns the oscillator
    /// value at bar `i`, or `None` while it is still warming up.
    ///
    /// A pivot at or before the last one of its kind is ignored, so the same
    /// `(from_index, to_index)` pair is never emitted twice.
    pub fn on_pivot<F>(&mut self, pivot: Pivot, oscillator: F) -> Option<Divergence>
    where
        F: Fn(usize) -> Option<f64>,
    {
        let cfg = self.config;
        let history = match pivot.kind {
            PivotKind::High => &mut self.highs,
            PivotKind::Low => &mut self.lows,
        };
        if history.back().is_some_and(|last| last.index >= pivot.index) {
            return None;
        }

        let found = oscillator(pivot.index).and_then(|to_osc| {
            history
                .iter()
                .rev()
                .take_while(|prev| pivot.index - prev.index <= cfg.lookback)
                .find_map(|prev| {
                    let from_osc = oscillator(prev.index)?;
                    let class = classify(&cfg, pivot.kind, prev.price, pivot.price, from_osc, to_osc)?;
                    Some(Divergence {
                        kind: match pivot.kind {
                            PivotKind::Low => DivergenceKind::Bullish,
                            PivotKind::High => DivergenceKind::Bearish,
                        },
                        class,
                        from_index: prev.index,
                        to_index: pivot.index,
                        from_price: prev.price,
                        to_price: pivot.price,
                        from_oscillator: from_osc,
                        to_oscillator: to_osc,
                        confirmed_index: pivot.index + cfg.pivot_right,
                    })
                })
        });

        history.push_back(pivot);
        if history.len() > cfg.pivots_to_check {
            history.pop_front();
        }

        if let Some(d) = &found {
            tracing::debug!(
                kind = ?d.kind,
                class = ?d.class,
                from = d.from_index,
                to = d.to_index,
                "divergence"
            );
        }
        found
    }

    /// Batch detection over bars, using the configured price source.
    /// `oscillator` must be aligned with `bars`; NaN marks warm-up.
    pub fn detect(&self, bars: &[Bar], oscillator: &[f64]) -> Result<Vec<Divergence>> {
        let src = self.config.price_source;
        let highs: Vec<f64> = bars.iter().map(|b| src.high(b)).collect();
        let lows: Vec<f64> = bars.iter().map(|b| src.low(b)).collect();
        self.detect_series(&highs, &lows, oscillator)
    }

    /// Batch detection over explicit price series. Uses a fresh copy of the
    /// detector so `self` is left untouched.
    pub fn detect_series(
        &self,
        price_highs: &[f64],
        price_lows: &[f64],
        oscillator: &[f64],
    ) -> Result<Vec<Divergence>> {
        if price_highs.len() != price_lows.len() {
            return Err(TaError::invalid("price_lows"));
        }
        if oscillator.len() != price_highs.len() {
            return Err(TaError::invalid("oscillator"));
        }
        let cfg = self.config;
        let highs = find_pivots(price_highs, cfg.pivot_left, cfg.pivot_right, PivotKind::High)?;
        let lows = find_pivots(price_lows, cfg.pivot_left, cfg.pivot_right, PivotKind::Low)?;

        // Replay in confirmation order; lows before highs on the same bar.
        let mut pivots: Vec<Pivot> = lows.into_iter().chain(highs).collect();
        pivots.sort_by_key(|p| (p.index, p.kind == PivotKind::High));

        let osc = |i: usize| oscillator.get(i).copied().filter(|v| !v.is_nan());
        let mut detector = DivergenceDetector::new(cfg)?;
        Ok(pivots
            .into_iter()
            .filter_map(|p| detector.on_pivot(p, osc))
            .collect())
    }
}

fn classify(
    cfg: &DivergenceConfig,
    kind: PivotKind,
    from_price: f64,
    to_price: f64,
    from_osc: f64,
    to_osc: f64,
) -> Option<DivergenceClass> {
    let (hidden, regular) = match kind {
        PivotKind::Low => (
            to_price > from_price && to_osc < from_osc,
            to_price < from_price && to_osc > from_osc,
        ),
        PivotKind::High => (
            to_price < from_price && to_osc > from_osc,
            to_price > from_price && to_osc < from_osc,
        ),
    };
    if hidden {
        Some(DivergenceClass::Hidden)
    } else if regular && cfg.detect_regular {
        Some(DivergenceClass::Regular)
    } else {
        None
    }
}
