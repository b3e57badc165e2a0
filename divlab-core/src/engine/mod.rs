//! Pipeline orchestration: bars in, indicator bundle, divergences, trades
//! and performance out.
//!
//! [`EngineContext`] is the streaming form: one owner pushes bars, readers
//! take snapshots with [`EngineContext::output`]. [`analyze`] is the batch
//! form over a complete slice; both produce the same [`PipelineOutput`] for
//! the same bars.

pub mod chart;

pub use chart::{render_to, ChartSink, LineStyle, Marker, MarkerPosition, MarkerShape, Shape};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{OscillatorSource, PipelineParams};
use crate::divergence::{Divergence, DivergenceDetector};
use crate::domain::{Bar, BarSeries, Series, SeriesPoint, Side, Trade};
use crate::error::{Result, TaError};
use crate::indicators::{
    check_bars, macd, rsi, Indicator, IndicatorOutput, IndicatorState, MacdSeries, MacdState,
    MacdValue, RsiState,
};
use crate::performance::{Performance, PerformanceAccumulator};
use crate::pivots::{PivotKind, PivotTracker};
use crate::strategy::{StrategyEngine, StrategyEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerBundle {
    pub mid: Vec<SeriesPoint>,
    pub upper: Vec<SeriesPoint>,
    pub lower: Vec<SeriesPoint>,
}

/// Every indicator line, aligned 1:1 with the bars. Overlays are keyed by
/// period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub macd_line: Vec<SeriesPoint>,
    pub signal_line: Vec<SeriesPoint>,
    pub histogram: Vec<SeriesPoint>,
    pub sma: BTreeMap<usize, Vec<SeriesPoint>>,
    pub ema: BTreeMap<usize, Vec<SeriesPoint>>,
    pub rsi: BTreeMap<usize, Vec<SeriesPoint>>,
    pub atr: BTreeMap<usize, Vec<SeriesPoint>>,
    pub bollinger: Option<BollingerBundle>,
}

impl IndicatorBundle {
    fn build(bars: &[Bar], macd: &MacdSeries, overlays: &[(Indicator, IndicatorOutput)]) -> Self {
        let mut bundle = IndicatorBundle {
            macd_line: macd.macd_line.points(bars),
            signal_line: macd.signal_line.points(bars),
            histogram: macd.histogram.points(bars),
            ..Default::default()
        };
        for (indicator, output) in overlays {
            match (*indicator, output) {
                (Indicator::Sma { period }, IndicatorOutput::Single(s)) => {
                    bundle.sma.insert(period, s.points(bars));
                }
                (Indicator::Ema { period, .. }, IndicatorOutput::Single(s)) => {
                    bundle.ema.insert(period, s.points(bars));
                }
                (Indicator::Rsi { period }, IndicatorOutput::Single(s)) => {
                    bundle.rsi.insert(period, s.points(bars));
                }
                (Indicator::Atr { period }, IndicatorOutput::Single(s)) => {
                    bundle.atr.insert(period, s.points(bars));
                }
                (Indicator::Bbands { .. }, IndicatorOutput::Bollinger(b)) => {
                    bundle.bollinger = Some(BollingerBundle {
                        mid: b.mid.points(bars),
                        upper: b.upper.points(bars),
                        lower: b.lower.points(bars),
                    });
                }
                _ => {}
            }
        }
        bundle
    }
}

/// A divergence with its pivot bars resolved to timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceRecord {
    pub from_time: i64,
    pub to_time: i64,
    #[serde(flatten)]
    pub divergence: Divergence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub indicators: IndicatorBundle,
    pub divergences: Vec<DivergenceRecord>,
    /// Closed trades plus the open one, if any, last.
    pub trades: Vec<Trade>,
    pub performance: Performance,
}

impl PipelineOutput {
    fn assemble(
        bars: &[Bar],
        macd: &MacdSeries,
        overlays: &[(Indicator, IndicatorOutput)],
        divergences: &[Divergence],
        trades: &[Trade],
        performance: Performance,
    ) -> Self {
        let time_at = |i: usize| bars.get(i).map_or(0, |b| b.time);
        Self {
            indicators: IndicatorBundle::build(bars, macd, overlays),
            divergences: divergences
                .iter()
                .map(|d| DivergenceRecord {
                    from_time: time_at(d.from_index),
                    to_time: time_at(d.to_index),
                    divergence: *d,
                })
                .collect(),
            trades: trades.to_vec(),
            performance,
        }
    }
}

/// What one pushed bar produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarUpdate {
    pub index: usize,
    pub time: i64,
    pub divergences: Vec<Divergence>,
    pub events: Vec<StrategyEvent>,
}

fn oscillator_value(source: OscillatorSource, macd: Option<MacdValue>, rsi: Option<f64>) -> Option<f64> {
    match source {
        OscillatorSource::MacdHistogram => macd.map(|m| m.histogram),
        OscillatorSource::MacdLine => macd.map(|m| m.macd),
        OscillatorSource::Rsi { .. } => rsi,
    }
}

/// Running state behind an [`EngineContext`].
#[derive(Debug, Clone)]
struct PipelineState {
    macd: MacdState,
    macd_out: MacdSeries,
    overlay_states: Vec<IndicatorState>,
    overlays: Vec<(Indicator, IndicatorOutput)>,
    oscillator_rsi: Option<RsiState>,
    oscillator: Series,
    high_pivots: PivotTracker,
    low_pivots: PivotTracker,
    detector: DivergenceDetector,
    divergences: Vec<Divergence>,
    strategy: StrategyEngine,
    performance: PerformanceAccumulator,
}

impl PipelineState {
    fn new(params: &PipelineParams) -> Result<Self> {
        let overlay_states = params
            .indicators
            .iter()
            .map(Indicator::state)
            .collect::<Result<Vec<_>>>()?;
        let overlays = params
            .indicators
            .iter()
            .map(|i| (*i, i.empty_output()))
            .collect();
        let oscillator_rsi = match params.oscillator {
            OscillatorSource::Rsi { period } => Some(RsiState::new(period)?),
            _ => None,
        };
        let div = params.divergence;
        Ok(Self {
            macd: MacdState::new(params.macd)?,
            macd_out: MacdSeries::default(),
            overlay_states,
            overlays,
            oscillator_rsi,
            oscillator: Series::new(),
            high_pivots: PivotTracker::new(div.pivot_left, div.pivot_right, PivotKind::High)?,
            low_pivots: PivotTracker::new(div.pivot_left, div.pivot_right, PivotKind::Low)?,
            detector: DivergenceDetector::new(div)?,
            divergences: Vec::new(),
            strategy: StrategyEngine::new(params.strategy)?,
            performance: PerformanceAccumulator::new(),
        })
    }

    fn record(&mut self, events: &[StrategyEvent]) {
        for event in events {
            self.performance.on_event(event);
        }
    }
}

/// One chart's pipeline: the bars seen so far, the parameters, and the
/// running state of every stage.
#[derive(Debug, Clone)]
pub struct EngineContext {
    bars: BarSeries,
    params: PipelineParams,
    state: PipelineState,
}

impl EngineContext {
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        let state = PipelineState::new(&params)?;
        Ok(Self {
            bars: BarSeries::new(),
            params,
            state,
        })
    }

    pub fn bars(&self) -> &BarSeries {
        &self.bars
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn strategy(&self) -> &StrategyEngine {
        &self.state.strategy
    }

    pub fn divergences(&self) -> &[Divergence] {
        &self.state.divergences
    }

    pub fn performance(&self) -> &Performance {
        self.state.performance.performance()
    }

    /// Append one bar and advance every stage by it.
    ///
    /// A rejected bar leaves the context unchanged.
    pub fn push_bar(&mut self, bar: Bar) -> Result<BarUpdate> {
        self.bars.push(bar)?;
        let index = self.bars.len() - 1;
        let state = &mut self.state;

        let macd = state.macd.update(bar.close);
        state.macd_out.push(macd);
        for (st, (_, out)) in state.overlay_states.iter_mut().zip(state.overlays.iter_mut()) {
            out.push(st.update(&bar));
        }
        let rsi = state.oscillator_rsi.as_mut().and_then(|s| s.update(bar.close));
        state
            .oscillator
            .push(oscillator_value(self.params.oscillator, macd, rsi));

        // Lows before highs, matching batch detection order.
        let source = self.params.divergence.price_source;
        let confirmed = [
            state.low_pivots.push(source.low(&bar)),
            state.high_pivots.push(source.high(&bar)),
        ];
        let oscillator = &state.oscillator;
        let mut divergences = Vec::new();
        for pivot in confirmed.into_iter().flatten() {
            if let Some(d) = state.detector.on_pivot(pivot, |i| oscillator.get(i)) {
                divergences.push(d);
            }
        }
        state.divergences.extend_from_slice(&divergences);

        let events = state.strategy.on_bar(index, &bar, &divergences);
        state.record(&events);

        Ok(BarUpdate {
            index,
            time: bar.time,
            divergences,
            events,
        })
    }

    /// Push bars until the iterator ends or a bar is rejected.
    pub fn extend<I>(&mut self, bars: I) -> Result<Vec<BarUpdate>>
    where
        I: IntoIterator<Item = Bar>,
    {
        bars.into_iter().map(|bar| self.push_bar(bar)).collect()
    }

    /// Snapshot of every output for the bars pushed so far.
    pub fn output(&self) -> PipelineOutput {
        let state = &self.state;
        PipelineOutput::assemble(
            self.bars.as_slice(),
            &state.macd_out,
            &state.overlays,
            &state.divergences,
            state.strategy.trades(),
            state.performance.performance().clone(),
        )
    }

    fn last_time(&self) -> i64 {
        self.bars.last().map_or(0, |b| b.time)
    }

    /// Open a position at `price` on the latest bar.
    pub fn request_entry(&mut self, side: Side, price: f64, stop: f64) -> Result<Vec<StrategyEvent>> {
        let time = self.last_time();
        let events = self.state.strategy.request_entry(side, time, price, stop)?;
        self.state.record(&events);
        Ok(events)
    }

    pub fn partial_exit(&mut self, price: f64, share: f64) -> Result<Vec<StrategyEvent>> {
        let time = self.last_time();
        let events = self.state.strategy.partial_exit(time, price, share)?;
        self.state.record(&events);
        Ok(events)
    }

    pub fn manual_exit(&mut self, price: f64) -> Result<Vec<StrategyEvent>> {
        let time = self.last_time();
        let events = self.state.strategy.manual_exit(time, price)?;
        self.state.record(&events);
        Ok(events)
    }
}

/// Oscillator series for batch detection; NaN marks warm-up.
fn batch_oscillator(source: OscillatorSource, macd: &MacdSeries, closes: &[f64]) -> Result<Series> {
    Ok(match source {
        OscillatorSource::MacdHistogram => macd.histogram.clone(),
        OscillatorSource::MacdLine => macd.macd_line.clone(),
        OscillatorSource::Rsi { period } => rsi(closes, period)?,
    })
}

/// Run the whole pipeline over a complete bar slice.
///
/// Fails with `InsufficientData` below [`PipelineParams::min_bars`].
pub fn analyze(bars: &[Bar], params: &PipelineParams) -> Result<PipelineOutput> {
    params.validate()?;
    check_bars(bars)?;
    let required = params.min_bars();
    if bars.len() < required {
        return Err(TaError::InsufficientData {
            required,
            available: bars.len(),
        });
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let macd_out = macd(&closes, params.macd)?;
    let overlays = params
        .indicators
        .iter()
        .map(|i| Ok((*i, i.compute(bars)?)))
        .collect::<Result<Vec<_>>>()?;

    let oscillator = batch_oscillator(params.oscillator, &macd_out, &closes)?;
    let divergences = DivergenceDetector::new(params.divergence)?.detect(bars, oscillator.values())?;

    // Divergences come out in confirmation order.
    let mut strategy = StrategyEngine::new(params.strategy)?;
    let mut performance = PerformanceAccumulator::new();
    let mut next = 0;
    for (index, bar) in bars.iter().enumerate() {
        let start = next;
        while next < divergences.len() && divergences[next].confirmed_index <= index {
            next += 1;
        }
        for event in strategy.on_bar(index, bar, &divergences[start..next]) {
            performance.on_event(&event);
        }
    }
    tracing::debug!(
        bars = bars.len(),
        divergences = divergences.len(),
        trades = strategy.trades().len(),
        "analysis complete"
    );

    Ok(PipelineOutput::assemble(
        bars,
        &macd_out,
        &overlays,
        &divergences,
        strategy.trades(),
        performance.into_performance(),
    ))
}
