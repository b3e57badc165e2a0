//! Domain types shared by every pipeline stage.

pub mod bar;
pub mod series;
pub mod trade;

pub use bar::{Bar, BarSeries};
pub use series::{Series, SeriesPoint};
pub use trade::{
    share_to_units, units_to_share, ExitReason, Fill, Side, Trade, TradeId, TradeSetup,
    SHARE_UNITS,
};
