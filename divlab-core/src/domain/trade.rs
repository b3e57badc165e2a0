//! Trade records: the open setup, its fills, and the closed round trip.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position size is one unit; shares are tracked in parts per `SHARE_UNITS`
/// so that the fills of a closed trade sum to exactly one.
pub const SHARE_UNITS: u32 = 10_000;

/// Convert a fractional share to integer units, rounding to nearest.
pub fn share_to_units(share: f64) -> u32 {
    (share.clamp(0.0, 1.0) * SHARE_UNITS as f64).round() as u32
}

pub fn units_to_share(units: u32) -> f64 {
    units as f64 / SHARE_UNITS as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    SL,
    TP1,
    TP2,
    TP3,
    Trail,
    ManualExit,
}

impl ExitReason {
    /// Exit reasons that close the whole remaining position.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ExitReason::SL | ExitReason::TP3 | ExitReason::Trail | ExitReason::ManualExit
        )
    }
}

/// A single (partial) exit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: TradeId,
    pub time: i64,
    pub price: f64,
    pub share: f64,
    /// Exact share in parts per `SHARE_UNITS`.
    pub share_units: u32,
    pub reason: ExitReason,
}

impl Fill {
    /// Signed price move per unit, scaled by this fill's share.
    pub fn profit(&self, side: Side, entry_price: f64) -> f64 {
        side.sign() * (self.price - entry_price) * self.share
    }
}

/// The open position. At most one exists at a time.
///
/// Long: `stop < entry_price < tp1 <= tp2 <= tp3`; short mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub id: TradeId,
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,
    /// Current stop; moves only in the favourable direction.
    pub stop: f64,
    pub initial_stop: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// `|entry_price - initial_stop|`.
    pub risk: f64,
    pub remaining_units: u32,
    pub tp1_done: bool,
    pub tp2_done: bool,
}

impl TradeSetup {
    pub fn remaining_share(&self) -> f64 {
        units_to_share(self.remaining_units)
    }

    /// True once a trailing update has moved the stop off its initial level.
    pub fn is_trailed(&self) -> bool {
        self.stop != self.initial_stop
    }

    pub(crate) fn stop_hit(&self, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => low <= self.stop,
            Side::Short => high >= self.stop,
        }
    }

    pub(crate) fn target_hit(&self, target: f64, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => high >= target,
            Side::Short => low <= target,
        }
    }
}

/// A trade as exposed in the output: entry plus every fill so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub side: Side,
    pub entry_time: i64,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub risk: f64,
    pub targets: [f64; 3],
    pub fills: Vec<Fill>,
    pub closed_at: Option<i64>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Sum of signed profit over all fills, per unit of position.
    pub fn profit(&self) -> f64 {
        self.fills
            .iter()
            .map(|f| f.profit(self.side, self.entry_price))
            .sum()
    }

    /// Sum of fill shares, added in fill order.
    pub fn filled_share(&self) -> f64 {
        self.fills.iter().map(|f| f.share).sum()
    }

    pub fn filled_units(&self) -> u32 {
        self.fills.iter().map(|f| f.share_units).sum()
    }

    pub fn is_winner(&self) -> bool {
        self.profit() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(price: f64, units: u32, reason: ExitReason) -> Fill {
        Fill {
            trade_id: TradeId(1),
            time: 0,
            price,
            share: units_to_share(units),
            share_units: units,
            reason,
        }
    }

    #[test]
    fn share_units_round_trip_common_fractions() {
        assert_eq!(share_to_units(0.3), 3_000);
        assert_eq!(share_to_units(0.4), 4_000);
        assert_eq!(share_to_units(1.0), SHARE_UNITS);
        assert_eq!(share_to_units(1.5), SHARE_UNITS);
    }

    #[test]
    fn short_profit_is_inverted() {
        let f = fill(95.0, SHARE_UNITS, ExitReason::TP3);
        assert_eq!(f.profit(Side::Short, 100.0), 5.0);
        assert_eq!(f.profit(Side::Long, 100.0), -5.0);
    }

    #[test]
    fn trade_profit_sums_fills() {
        let trade = Trade {
            id: TradeId(1),
            side: Side::Long,
            entry_time: 0,
            entry_price: 100.0,
            initial_stop: 98.0,
            risk: 2.0,
            targets: [102.0, 104.0, 108.0],
            fills: vec![
                fill(102.0, 3_000, ExitReason::TP1),
                fill(98.0, 7_000, ExitReason::SL),
            ],
            closed_at: Some(10),
        };
        assert_eq!(trade.filled_units(), SHARE_UNITS);
        assert!((trade.profit() - (0.6 - 1.4)).abs() < 1e-12);
        assert!(!trade.is_winner());
    }

    #[test]
    fn final_reasons() {
        assert!(ExitReason::SL.is_final());
        assert!(ExitReason::Trail.is_final());
        assert!(!ExitReason::TP1.is_final());
        assert!(!ExitReason::TP2.is_final());
    }
}
