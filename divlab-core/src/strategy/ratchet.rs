//! Stop ratchet: a trailed stop may tighten, never loosen.
//!
//! A widening trail distance (for example an expanding ATR) must not move an
//! open position's stop away from price.

use crate::domain::Side;

/// Favourable-only stop level for one open position.
///
/// - Long: the level can only rise.
/// - Short: the level can only fall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatchetState {
    level: f64,
    side: Side,
}

impl RatchetState {
    pub fn new(side: Side, initial_level: f64) -> Self {
        Self {
            level: initial_level,
            side,
        }
    }

    /// Offer a new stop level and return the ratcheted one.
    ///
    /// Non-finite proposals are ignored.
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if proposed.is_finite() {
            self.level = match self.side {
                Side::Long => self.level.max(proposed),
                Side::Short => self.level.min(proposed),
            };
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn side(&self) -> Side {
        self.side
    }
}
