//! Running performance over closed trades.
//!
//! Profit is measured per unit of position in price points. Aggregates move
//! only when a trade is fully closed; a trade with zero profit counts as a
//! loss.

use serde::{Deserialize, Serialize};

use crate::domain::Trade;
use crate::strategy::StrategyEvent;

/// Net profit after a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: i64,
    pub equity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub net_profit: f64,
    pub gross_profit: f64,
    /// Sum of losing trades' profit, as a positive number.
    pub gross_loss: f64,
    pub trades_closed: usize,
    pub winning_trades: usize,
    /// Percentage of winning trades, 0..=100.
    pub win_rate: f64,
    pub avg_trade: f64,
    /// `gross_profit / gross_loss`, or 0 when there is no loss.
    pub profit_factor: f64,
    pub max_equity: f64,
    pub max_drawdown: f64,
    pub equity_curve: Vec<EquityPoint>,
}

impl Performance {
    /// Profit factor without the zero-loss convention: infinite when every
    /// closed trade won, `None` when nothing was gained or lost.
    pub fn profit_factor_strict(&self) -> Option<f64> {
        if self.gross_loss > 0.0 {
            Some(self.gross_profit / self.gross_loss)
        } else if self.gross_profit > 0.0 {
            Some(f64::INFINITY)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceAccumulator {
    perf: Performance,
}

impl PerformanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a sequence of trades; open trades are skipped.
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Self {
        let mut acc = Self::new();
        for trade in trades {
            acc.on_trade_closed(trade);
        }
        acc
    }

    /// Record a closed trade. Returns false (and changes nothing) for a
    /// trade that is still open.
    pub fn on_trade_closed(&mut self, trade: &Trade) -> bool {
        let Some(closed_at) = trade.closed_at else {
            return false;
        };
        let profit = trade.profit();
        let p = &mut self.perf;

        if profit > 0.0 {
            p.gross_profit += profit;
            p.winning_trades += 1;
        } else {
            p.gross_loss += -profit;
        }
        p.trades_closed += 1;
        p.net_profit = p.gross_profit - p.gross_loss;

        p.win_rate = p.winning_trades as f64 / p.trades_closed as f64 * 100.0;
        p.avg_trade = p.net_profit / p.trades_closed as f64;
        p.profit_factor = if p.gross_loss > 0.0 {
            p.gross_profit / p.gross_loss
        } else {
            0.0
        };

        p.max_equity = p.max_equity.max(p.net_profit);
        p.max_drawdown = p.max_drawdown.max(p.max_equity - p.net_profit);
        p.equity_curve.push(EquityPoint {
            time: closed_at,
            equity: p.net_profit,
        });
        true
    }

    /// Feed one strategy event; only `Closed` matters.
    pub fn on_event(&mut self, event: &StrategyEvent) {
        if let StrategyEvent::Closed(trade) = event {
            self.on_trade_closed(trade);
        }
    }

    pub fn performance(&self) -> &Performance {
        &self.perf
    }

    pub fn into_performance(self) -> Performance {
        self.perf
    }
}
