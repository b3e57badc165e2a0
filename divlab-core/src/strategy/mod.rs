//! Single-position divergence strategy.
//!
//! States are `Flat`, `Long` and `Short`. On every bar the engine first
//! checks exits of an open position (stop before targets, targets in
//! TP1, TP2, TP3 order), then updates the trailing stop, and only then
//! considers new entries. Entries fill at the bar close. A bar that opens a
//! position is never checked for exits, and a bar that closes a position
//! never opens a new one.

pub mod config;
pub mod ratchet;

pub use config::{StopSource, StrategyConfig, TrailDistance, TrailReference, TrailingStop};
pub use ratchet::RatchetState;

use serde::{Deserialize, Serialize};

use crate::divergence::{Divergence, DivergenceKind};
use crate::domain::{
    share_to_units, units_to_share, Bar, ExitReason, Fill, Side, Trade, TradeId, TradeSetup,
    SHARE_UNITS,
};
use crate::error::{Result, TaError};
use crate::indicators::AtrState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

/// What happened to the position on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StrategyEvent {
    Opened {
        trade_id: TradeId,
        side: Side,
        index: usize,
        time: i64,
        price: f64,
        stop: f64,
        targets: [f64; 3],
    },
    Filled(Fill),
    Closed(Trade),
    /// A signal arrived while the engine could not take it.
    Ignored { index: usize, reason: String },
    /// A signal was taken but produced an unusable setup.
    Rejected { index: usize, reason: String },
}

#[derive(Debug, Clone)]
struct OpenPosition {
    setup: TradeSetup,
    ratchet: RatchetState,
    /// First bar index on which exits and trailing apply.
    checks_from: usize,
}

#[derive(Debug, Clone)]
pub struct StrategyEngine {
    config: StrategyConfig,
    stop_atr: Option<AtrState>,
    trail_atr: Option<AtrState>,
    open: Option<OpenPosition>,
    trades: Vec<Trade>,
    next_id: u64,
    last_index: Option<usize>,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        let stop_atr = match config.stop_source {
            StopSource::Atr { period, .. } => Some(AtrState::new(period)?),
            StopSource::DivergencePivot => None,
        };
        let trail_atr = match config.trailing.map(|t| t.distance) {
            Some(TrailDistance::Atr { period, .. }) => Some(AtrState::new(period)?),
            _ => None,
        };
        Ok(Self {
            config,
            stop_atr,
            trail_atr,
            open: None,
            trades: Vec::new(),
            next_id: 1,
            last_index: None,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn position(&self) -> PositionState {
        match self.open.as_ref().map(|p| p.setup.side) {
            None => PositionState::Flat,
            Some(Side::Long) => PositionState::Long,
            Some(Side::Short) => PositionState::Short,
        }
    }

    pub fn open_setup(&self) -> Option<&TradeSetup> {
        self.open.as_ref().map(|p| &p.setup)
    }

    /// Every trade so far; an open trade, if any, is the last one.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_closed())
    }

    /// Advance by one bar.
    ///
    /// `signals` may contain any divergences; only those confirmed at
    /// `index` are considered for entry.
    pub fn on_bar(&mut self, index: usize, bar: &Bar, signals: &[Divergence]) -> Vec<StrategyEvent> {
        let stop_atr = self.stop_atr.as_mut().and_then(|s| s.update(bar));
        let trail_atr = self.trail_atr.as_mut().and_then(|s| s.update(bar));
        self.last_index = Some(index);

        let mut events = Vec::new();
        let flat_at_open = self.open.is_none();
        if !flat_at_open {
            self.check_exits(index, bar, &mut events);
            self.trail(index, bar, trail_atr);
        }

        for signal in signals.iter().filter(|d| d.confirmed_index == index) {
            if !flat_at_open || self.open.is_some() {
                let reason = if self.open.is_some() {
                    "position already open"
                } else {
                    "position closed on this bar"
                };
                tracing::debug!(index, kind = ?signal.kind, reason, "entry ignored");
                events.push(StrategyEvent::Ignored {
                    index,
                    reason: reason.to_string(),
                });
                continue;
            }
            let Some(side) = self.entry_side(signal, bar) else {
                continue;
            };
            let stop = match self.config.stop_source {
                StopSource::DivergencePivot => Some(signal.from_price),
                StopSource::Atr { multiplier, .. } => {
                    stop_atr.map(|atr| bar.close - side.sign() * multiplier * atr)
                }
            };
            let Some(stop) = stop else {
                events.push(reject(index, "stop atr not ready".to_string()));
                continue;
            };
            match self.open_position(side, index, index + 1, bar.time, bar.close, stop) {
                Ok(event) => events.push(event),
                Err(err) => events.push(reject(index, err.to_string())),
            }
        }
        events
    }

    /// Open a position at `price`, outside the signal path.
    ///
    /// Exits are checked from the next bar on.
    pub fn request_entry(
        &mut self,
        side: Side,
        time: i64,
        price: f64,
        stop: f64,
    ) -> Result<Vec<StrategyEvent>> {
        if self.open.is_some() {
            tracing::debug!(?side, time, "entry request ignored: position already open");
            return Err(TaError::state("entry requested while not flat"));
        }
        let index = self.last_index.unwrap_or(0);
        let checks_from = self.last_index.map_or(0, |i| i + 1);
        let opened = self.open_position(side, index, checks_from, time, price, stop)?;
        Ok(vec![opened])
    }

    /// Close `share` of the original position at `price`.
    pub fn partial_exit(&mut self, time: i64, price: f64, share: f64) -> Result<Vec<StrategyEvent>> {
        let (remaining, remaining_share) = match &self.open {
            Some(pos) => (pos.setup.remaining_units, pos.setup.remaining_share()),
            None => return Err(TaError::state("partial exit while flat")),
        };
        if !price.is_finite() {
            return Err(TaError::invalid("price"));
        }
        if !share.is_finite() || share <= 0.0 {
            return Err(TaError::invalid("share"));
        }
        let units = share_to_units(share);
        if units == 0 {
            return Err(TaError::invalid("share"));
        }
        if units > remaining {
            return Err(TaError::state(format!(
                "partial exit of {share} exceeds remaining share {remaining_share}"
            )));
        }
        Ok(self.exit_events(time, price, units, ExitReason::ManualExit))
    }

    /// Close whatever remains of the position at `price`.
    pub fn manual_exit(&mut self, time: i64, price: f64) -> Result<Vec<StrategyEvent>> {
        if self.open.is_none() {
            return Err(TaError::state("manual exit while flat"));
        }
        if !price.is_finite() {
            return Err(TaError::invalid("price"));
        }
        Ok(self.exit_events(time, price, SHARE_UNITS, ExitReason::ManualExit))
    }

    fn entry_side(&self, signal: &Divergence, bar: &Bar) -> Option<Side> {
        match signal.kind {
            DivergenceKind::Bullish if self.config.allow_long && bar.close > signal.from_price => {
                Some(Side::Long)
            }
            DivergenceKind::Bearish if self.config.allow_short && bar.close < signal.from_price => {
                Some(Side::Short)
            }
            _ => None,
        }
    }

    fn open_position(
        &mut self,
        side: Side,
        index: usize,
        checks_from: usize,
        time: i64,
        price: f64,
        stop: f64,
    ) -> Result<StrategyEvent> {
        if !price.is_finite() {
            return Err(TaError::invalid("price"));
        }
        if !stop.is_finite() {
            return Err(TaError::invalid("stop"));
        }
        let risk = side.sign() * (price - stop);
        if risk <= 0.0 {
            tracing::debug!(?side, price, stop, "entry rejected: non-positive risk");
            return Err(TaError::invalid_at("risk", index));
        }

        let [r1, r2, r3] = self.config.tp_ratios;
        let target = |ratio: f64| price + side.sign() * risk * ratio;
        let id = TradeId(self.next_id);
        self.next_id += 1;

        let setup = TradeSetup {
            id,
            side,
            entry_index: index,
            entry_time: time,
            entry_price: price,
            stop,
            initial_stop: stop,
            tp1: target(r1),
            tp2: target(r2),
            tp3: target(r3),
            risk,
            remaining_units: SHARE_UNITS,
            tp1_done: false,
            tp2_done: false,
        };
        let targets = [setup.tp1, setup.tp2, setup.tp3];
        self.trades.push(Trade {
            id,
            side,
            entry_time: time,
            entry_price: price,
            initial_stop: stop,
            risk,
            targets,
            fills: Vec::new(),
            closed_at: None,
        });
        self.open = Some(OpenPosition {
            ratchet: RatchetState::new(side, stop),
            setup,
            checks_from,
        });
        tracing::debug!(trade_id = %id, ?side, index, price, stop, risk, "position opened");

        Ok(StrategyEvent::Opened {
            trade_id: id,
            side,
            index,
            time,
            price,
            stop,
            targets,
        })
    }

    fn check_exits(&mut self, index: usize, bar: &Bar, events: &mut Vec<StrategyEvent>) {
        let Some(pos) = self.open.as_ref() else {
            return;
        };
        if index < pos.checks_from {
            return;
        }
        let setup = &pos.setup;
        let [tp1_units, tp2_units] = self.config.partial_units();

        let mut planned: Vec<(f64, ExitReason)> = Vec::with_capacity(3);
        if setup.stop_hit(bar.high, bar.low) {
            // Adverse event first when the bar also reaches a target.
            let reason = if setup.is_trailed() {
                ExitReason::Trail
            } else {
                ExitReason::SL
            };
            planned.push((setup.stop, reason));
        } else {
            if !setup.tp1_done && setup.target_hit(setup.tp1, bar.high, bar.low) {
                planned.push((setup.tp1, ExitReason::TP1));
            }
            if !setup.tp2_done && setup.target_hit(setup.tp2, bar.high, bar.low) {
                planned.push((setup.tp2, ExitReason::TP2));
            }
            if setup.target_hit(setup.tp3, bar.high, bar.low) {
                planned.push((setup.tp3, ExitReason::TP3));
            }
        }

        for (price, reason) in planned {
            let units = if reason.is_final() {
                SHARE_UNITS
            } else if reason == ExitReason::TP1 {
                tp1_units
            } else {
                tp2_units
            };
            if let Some(pos) = self.open.as_mut() {
                match reason {
                    ExitReason::TP1 => pos.setup.tp1_done = true,
                    ExitReason::TP2 => pos.setup.tp2_done = true,
                    _ => {}
                }
            }
            events.extend(self.exit_events(bar.time, price, units, reason));
            if self.open.is_none() {
                break;
            }
        }
    }

    fn trail(&mut self, index: usize, bar: &Bar, atr: Option<f64>) {
        let Some(trailing) = self.config.trailing else {
            return;
        };
        let Some(pos) = self.open.as_mut() else {
            return;
        };
        if index < pos.checks_from {
            return;
        }
        let distance = match trailing.distance {
            TrailDistance::Fixed { points } => points,
            TrailDistance::Atr { multiplier, .. } => match atr {
                Some(atr) => multiplier * atr,
                None => return,
            },
        };
        let side = pos.setup.side;
        let reference = match (trailing.reference, side) {
            (TrailReference::Close, _) => bar.close,
            (TrailReference::Extreme, Side::Long) => bar.high,
            (TrailReference::Extreme, Side::Short) => bar.low,
        };
        let stop = pos.ratchet.apply(reference - side.sign() * distance);
        if stop != pos.setup.stop {
            tracing::trace!(trade_id = %pos.setup.id, index, stop, "stop trailed");
            pos.setup.stop = stop;
        }
    }

    /// Fill up to `units` of the open position; closes it when nothing remains.
    fn exit_events(
        &mut self,
        time: i64,
        price: f64,
        units: u32,
        reason: ExitReason,
    ) -> Vec<StrategyEvent> {
        let (Some(pos), Some(trade)) = (self.open.as_mut(), self.trades.last_mut()) else {
            return Vec::new();
        };
        let units = units.min(pos.setup.remaining_units);
        if units == 0 {
            return Vec::new();
        }
        pos.setup.remaining_units -= units;
        // The closing fill takes the float remainder so the shares sum to 1.0.
        let share = if pos.setup.remaining_units == 0 {
            1.0 - trade.filled_share()
        } else {
            units_to_share(units)
        };
        let fill = Fill {
            trade_id: pos.setup.id,
            time,
            price,
            share,
            share_units: units,
            reason,
        };
        trade.fills.push(fill);
        tracing::trace!(trade_id = %fill.trade_id, ?reason, price, share = fill.share, "fill");

        let mut events = vec![StrategyEvent::Filled(fill)];
        if pos.setup.remaining_units == 0 {
            trade.closed_at = Some(time);
            tracing::debug!(trade_id = %trade.id, profit = trade.profit(), ?reason, "position closed");
            events.push(StrategyEvent::Closed(trade.clone()));
            self.open = None;
        }
        events
    }
}

fn reject(index: usize, reason: String) -> StrategyEvent {
    tracing::debug!(index, %reason, "entry rejected");
    StrategyEvent::Rejected { index, reason }
}
