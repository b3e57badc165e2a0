//! Strategy parameters: targets, partial-exit shares, stop source and trailing.

use serde::{Deserialize, Serialize};

use crate::domain::{share_to_units, SHARE_UNITS};
use crate::error::{check_period, Result, TaError};

/// Where the initial stop of a signal entry comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopSource {
    /// Stop at the price of the divergence's earlier pivot.
    #[default]
    DivergencePivot,
    /// Stop at `close -/+ multiplier * ATR(period)`.
    Atr { period: usize, multiplier: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrailDistance {
    Fixed { points: f64 },
    Atr { period: usize, multiplier: f64 },
}

/// Price the trail distance is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailReference {
    #[default]
    Close,
    /// Bar high for longs, bar low for shorts.
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub distance: TrailDistance,
    #[serde(default)]
    pub reference: TrailReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Take-profit distances as multiples of risk.
    pub tp_ratios: [f64; 3],
    /// Position share closed at each target. The last target always closes
    /// whatever remains.
    pub tp_shares: [f64; 3],
    pub stop_source: StopSource,
    pub trailing: Option<TrailingStop>,
    pub allow_long: bool,
    pub allow_short: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            tp_ratios: [1.0, 2.0, 4.0],
            tp_shares: [0.3, 0.3, 0.4],
            stop_source: StopSource::DivergencePivot,
            trailing: None,
            allow_long: true,
            allow_short: true,
        }
    }
}

fn check_multiplier(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TaError::invalid(field))
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        let [r1, r2, r3] = self.tp_ratios;
        if !self.tp_ratios.iter().all(|r| r.is_finite() && *r > 0.0) || r1 > r2 || r2 > r3 {
            return Err(TaError::invalid("strategy.tp_ratios"));
        }

        if !self.tp_shares.iter().all(|s| s.is_finite() && *s >= 0.0) {
            return Err(TaError::invalid("strategy.tp_shares"));
        }
        let total: f64 = self.tp_shares.iter().sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(TaError::invalid("strategy.tp_shares"));
        }
        // TP3 must have something left to close.
        if self.partial_units().iter().sum::<u32>() >= SHARE_UNITS {
            return Err(TaError::invalid("strategy.tp_shares"));
        }

        if let StopSource::Atr { period, multiplier } = self.stop_source {
            check_period("strategy.stop_source.period", period)?;
            check_multiplier("strategy.stop_source.multiplier", multiplier)?;
        }
        if let Some(trailing) = self.trailing {
            match trailing.distance {
                TrailDistance::Fixed { points } => {
                    check_multiplier("strategy.trailing.points", points)?
                }
                TrailDistance::Atr { period, multiplier } => {
                    check_period("strategy.trailing.period", period)?;
                    check_multiplier("strategy.trailing.multiplier", multiplier)?;
                }
            }
        }
        Ok(())
    }

    /// TP1 and TP2 shares in integer units.
    pub(crate) fn partial_units(&self) -> [u32; 2] {
        [
            share_to_units(self.tp_shares[0]),
            share_to_units(self.tp_shares[1]),
        ]
    }
}
