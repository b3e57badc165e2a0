//! divlab core: the compute kernel behind a divergence-trading chart.
//!
//! Data flows one way, bar by bar:
//! - Domain types (bars, aligned series, trades and fills)
//! - Indicator kernels (SMA, EMA, RSI, MACD, ATR, Bollinger), streaming and batch
//! - Pivot confirmation and price/oscillator divergence detection
//! - Single-position strategy with partial take-profits and a ratcheted stop
//! - Performance accumulation over closed trades
//!
//! The crate performs no I/O. It emits `tracing` events but never installs a
//! subscriber.

pub mod config;
pub mod divergence;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod performance;
pub mod pivots;
pub mod strategy;

pub use config::{OscillatorSource, PipelineParams};
pub use engine::{analyze, BarUpdate, EngineContext, PipelineOutput};
pub use error::{Result, TaError};
