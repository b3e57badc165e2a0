//! Pipeline parameters and their TOML form.
//!
//! Every section has defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! [macd]
//! fast = 12
//! slow = 26
//! signal = 9
//!
//! [[indicators]]
//! type = "sma"
//! period = 20
//!
//! [divergence]
//! pivot_left = 5
//! pivot_right = 5
//!
//! [oscillator]
//! type = "macd_histogram"
//!
//! [strategy]
//! tp_ratios = [1.0, 2.0, 4.0]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::divergence::DivergenceConfig;
use crate::error::{check_period, Result, TaError};
use crate::indicators::{Indicator, MacdParams};
use crate::strategy::StrategyConfig;

/// Series the divergence detector compares price against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OscillatorSource {
    #[default]
    MacdHistogram,
    MacdLine,
    Rsi { period: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub macd: MacdParams,
    /// Extra chart overlays, computed alongside MACD.
    pub indicators: Vec<Indicator>,
    pub divergence: DivergenceConfig,
    pub oscillator: OscillatorSource,
    pub strategy: StrategyConfig,
}

impl PipelineParams {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let params: Self =
            toml::from_str(content).map_err(|e| TaError::Config(format!("parse params TOML: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TaError::Config(format!("serialize params: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.macd.validate()?;
        let mut names = BTreeSet::new();
        for indicator in &self.indicators {
            indicator.validate()?;
            if matches!(indicator, Indicator::Macd { .. }) {
                // MACD has its own section and output slot.
                return Err(TaError::invalid("indicators.macd"));
            }
            if !names.insert(overlay_key(indicator)) {
                return Err(TaError::invalid(format!("indicators.{}", indicator.name())));
            }
        }
        self.divergence.validate()?;
        if let OscillatorSource::Rsi { period } = self.oscillator {
            check_period("oscillator.period", period)?;
        }
        self.strategy.validate()
    }

    /// Fewest bars a batch run accepts.
    pub fn min_bars(&self) -> usize {
        let macd = self.macd.slow.max(self.macd.signal.saturating_add(self.macd.slow));
        let rsi = self
            .rsi_periods()
            .map(|p| p.saturating_add(1))
            .max()
            .unwrap_or(0);
        macd.max(rsi).max(self.divergence.min_bars())
    }

    fn rsi_periods(&self) -> impl Iterator<Item = usize> + '_ {
        let oscillator = match self.oscillator {
            OscillatorSource::Rsi { period } => Some(period),
            _ => None,
        };
        let overlays = self.indicators.iter().filter_map(|i| match *i {
            Indicator::Rsi { period } => Some(period),
            _ => None,
        });
        oscillator.into_iter().chain(overlays)
    }
}

/// Output slot of an overlay: one series per kind and period.
fn overlay_key(indicator: &Indicator) -> (&'static str, usize) {
    match *indicator {
        Indicator::Sma { period } => ("sma", period),
        Indicator::Ema { period, .. } => ("ema", period),
        Indicator::Rsi { period } => ("rsi", period),
        Indicator::Atr { period } => ("atr", period),
        Indicator::Bbands { .. } => ("bbands", 0),
        Indicator::Macd { .. } => ("macd", 0),
    }
}
