//! Property tests for kernel and pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Alignment: outputs have one slot per input, undefined before `valid_from`
//! 2. EMA recurrence
//! 3. MACD histogram identity
//! 4. RSI bounds
//! 5. Pivot symmetry under negation
//! 6. Divergence monotonicity per class, no duplicate pairs
//! 7. Single position, fills of a closed trade sum to exactly one
//! 8. Determinism
//! 9. Streaming equals batch
//! 10. Performance identity

use std::collections::HashSet;

use proptest::prelude::*;

use divlab_core::divergence::{
    Divergence, DivergenceClass, DivergenceConfig, DivergenceDetector, DivergenceKind,
    PriceSource,
};
use divlab_core::domain::{Bar, Side, SHARE_UNITS};
use divlab_core::fingerprint::output_hash;
use divlab_core::indicators::{ema, macd, rsi, EmaSeed, Indicator, IndicatorOutput, MacdParams};
use divlab_core::pivots::{find_pivots, PivotKind};
use divlab_core::strategy::{
    StrategyConfig, StrategyEngine, StrategyEvent, TrailDistance, TrailReference, TrailingStop,
};
use divlab_core::{analyze, EngineContext, OscillatorSource, PipelineParams};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, len)
}

/// Random walk bars with non-negative wicks.
fn arb_bars(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-3.0..3.0_f64, 0.0..2.0_f64, 0.0..2.0_f64), len).prop_map(|steps| {
        let mut close = 100.0_f64;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (change, up, down))| {
                let open = close;
                close = (close + change).max(5.0);
                Bar::new(
                    1_700_000_000 + i as i64 * 60,
                    open,
                    open.max(close) + up,
                    open.min(close) - down,
                    close,
                )
            })
            .collect()
    })
}

fn arb_indicator() -> impl Strategy<Value = Indicator> {
    prop_oneof![
        (1..30usize).prop_map(|period| Indicator::Sma { period }),
        (1..30usize).prop_map(|period| Indicator::Ema {
            period,
            seed: EmaSeed::First
        }),
        (1..30usize).prop_map(|period| Indicator::Ema {
            period,
            seed: EmaSeed::Sma
        }),
        (1..30usize).prop_map(|period| Indicator::Rsi { period }),
        (1..30usize).prop_map(|period| Indicator::Atr { period }),
        (1..30usize, 0.5..3.0_f64).prop_map(|(period, k)| Indicator::Bbands { period, k }),
        (1..15usize, 15..30usize, 1..10usize)
            .prop_map(|(fast, slow, signal)| Indicator::Macd { fast, slow, signal }),
    ]
}

fn arb_oscillator() -> impl Strategy<Value = OscillatorSource> {
    prop_oneof![
        Just(OscillatorSource::MacdHistogram),
        Just(OscillatorSource::MacdLine),
        (2..20usize).prop_map(|period| OscillatorSource::Rsi { period }),
    ]
}

fn arb_price_source() -> impl Strategy<Value = PriceSource> {
    prop_oneof![Just(PriceSource::Close), Just(PriceSource::Wicks)]
}

/// TP1 and TP2 shares in whole units, TP3 takes the float remainder.
fn arb_tp_shares() -> impl Strategy<Value = [f64; 3]> {
    (1..5_000u32, 0..5_000u32).prop_map(|(a, b)| {
        let s1 = a as f64 / SHARE_UNITS as f64;
        let s2 = b as f64 / SHARE_UNITS as f64;
        [s1, s2, 1.0 - s1 - s2]
    })
}

fn small_params() -> PipelineParams {
    PipelineParams {
        divergence: DivergenceConfig {
            pivot_left: 2,
            pivot_right: 2,
            pivots_to_check: 2,
            ..Default::default()
        },
        indicators: vec![Indicator::Sma { period: 10 }, Indicator::Atr { period: 14 }],
        ..Default::default()
    }
}

/// `small_params` with the optional oscillator, pivot price, regular
/// divergence and ATR trailing paths switched on as requested.
fn variant_params(
    oscillator: OscillatorSource,
    price_source: PriceSource,
    detect_regular: bool,
    atr_trail: bool,
) -> PipelineParams {
    let mut params = small_params();
    params.oscillator = oscillator;
    params.divergence.price_source = price_source;
    params.divergence.detect_regular = detect_regular;
    if atr_trail {
        params.strategy.trailing = Some(TrailingStop {
            distance: TrailDistance::Atr {
                period: 5,
                multiplier: 1.5,
            },
            reference: TrailReference::Extreme,
        });
    }
    params
}

// ── 1. Alignment ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn outputs_are_aligned(bars in arb_bars(1..120), indicator in arb_indicator()) {
        let out = indicator.compute(&bars).unwrap();
        prop_assert_eq!(out.len(), bars.len());
        if let IndicatorOutput::Single(series) = &out {
            let lookback = indicator.lookback();
            prop_assert_eq!(series.valid_from(), lookback.min(bars.len()));
            for i in 0..bars.len() {
                prop_assert_eq!(series.get(i).is_some(), i >= lookback, "slot {}", i);
            }
        }
    }
}

// ── 2. EMA recurrence ────────────────────────────────────────────────

proptest! {
    #[test]
    fn ema_recurrence(data in arb_closes(2..200), period in 1..50usize) {
        let out = ema(&data, period).unwrap();
        let k = 2.0 / (period as f64 + 1.0);
        prop_assert_eq!(out.get(0), Some(data[0]));
        for i in 1..data.len() {
            let prev = out.get(i - 1).unwrap();
            let expected = data[i] * k + prev * (1.0 - k);
            let actual = out.get(i).unwrap();
            prop_assert!((actual - expected).abs() <= 1e-12 * expected.abs().max(1.0));
        }
    }
}

// ── 3. MACD identity ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn macd_histogram_identity(
        data in arb_closes(1..200),
        fast in 1..20usize,
        slow in 1..40usize,
        signal in 1..15usize,
    ) {
        let out = macd(&data, MacdParams::new(fast, slow, signal)).unwrap();
        prop_assert_eq!(out.len(), data.len());
        for i in 0..data.len() {
            let m = out.macd_line.get(i).unwrap();
            let s = out.signal_line.get(i).unwrap();
            prop_assert_eq!(out.histogram.get(i).unwrap(), m - s);
        }
    }
}

// ── 4. RSI bounds ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_bounded(data in arb_closes(1..200), period in 1..30usize) {
        let out = rsi(&data, period).unwrap();
        for i in out.valid_from()..data.len() {
            let v = out.get(i).unwrap();
            prop_assert!((0.0..=100.0).contains(&v), "rsi[{}] = {}", i, v);
        }
    }
}

// ── 5. Pivot symmetry ────────────────────────────────────────────────

proptest! {
    #[test]
    fn pivot_symmetry(
        // Coarse values so ties actually occur.
        data in prop::collection::vec((0..20i32).prop_map(f64::from), 12..80),
        left in 0..5usize,
        right in 0..5usize,
    ) {
        let negated: Vec<f64> = data.iter().map(|v| -v).collect();
        let highs = find_pivots(&negated, left, right, PivotKind::High).unwrap();
        let lows = find_pivots(&data, left, right, PivotKind::Low).unwrap();
        let hi: Vec<(usize, f64)> = highs.iter().map(|p| (p.index, -p.price)).collect();
        let lo: Vec<(usize, f64)> = lows.iter().map(|p| (p.index, p.price)).collect();
        prop_assert_eq!(hi, lo);
    }
}

// ── 6. Divergence monotonicity ───────────────────────────────────────

proptest! {
    #[test]
    fn divergences_are_monotone(
        bars in arb_bars(20..200),
        osc in prop::collection::vec(-10.0..10.0_f64, 200),
        pivots_to_check in 1..4usize,
        price_source in arb_price_source(),
        detect_regular in any::<bool>(),
    ) {
        let config = DivergenceConfig {
            pivot_left: 2,
            pivot_right: 2,
            pivots_to_check,
            price_source,
            detect_regular,
            ..Default::default()
        };
        let detector = DivergenceDetector::new(config).unwrap();
        let found = detector.detect(&bars, &osc[..bars.len()]).unwrap();

        let mut seen = HashSet::new();
        for d in &found {
            let (from_osc, to_osc) = (osc[d.from_index], osc[d.to_index]);
            match (d.class, d.kind) {
                (DivergenceClass::Hidden, DivergenceKind::Bullish) => {
                    prop_assert!(d.to_price > d.from_price);
                    prop_assert!(to_osc < from_osc);
                }
                (DivergenceClass::Hidden, DivergenceKind::Bearish) => {
                    prop_assert!(d.to_price < d.from_price);
                    prop_assert!(to_osc > from_osc);
                }
                (DivergenceClass::Regular, DivergenceKind::Bullish) => {
                    prop_assert!(detect_regular);
                    prop_assert!(d.to_price < d.from_price);
                    prop_assert!(to_osc > from_osc);
                }
                (DivergenceClass::Regular, DivergenceKind::Bearish) => {
                    prop_assert!(detect_regular);
                    prop_assert!(d.to_price > d.from_price);
                    prop_assert!(to_osc < from_osc);
                }
            }
            // Pivot prices come from the configured source.
            let bar_price = |i: usize| match d.kind {
                DivergenceKind::Bullish => price_source.low(&bars[i]),
                DivergenceKind::Bearish => price_source.high(&bars[i]),
            };
            prop_assert_eq!(d.from_price, bar_price(d.from_index));
            prop_assert_eq!(d.to_price, bar_price(d.to_index));
            prop_assert!(d.from_index < d.to_index);
            prop_assert!(d.to_index - d.from_index <= config.lookback);
            prop_assert!(seen.insert((d.kind, d.from_index, d.to_index)), "duplicate pair");
        }
    }
}

// ── 7. Single position ───────────────────────────────────────────────

proptest! {
    #[test]
    fn one_position_and_exact_shares(
        bars in arb_bars(10..200),
        signals in prop::collection::vec((0..4u8, 0.1..5.0_f64), 200),
        tp_shares in arb_tp_shares(),
    ) {
        let config = StrategyConfig {
            tp_shares,
            ..Default::default()
        };
        let mut engine = StrategyEngine::new(config).unwrap();
        for (i, bar) in bars.iter().enumerate() {
            let (roll, offset) = signals[i];
            let pending: Vec<Divergence> = match roll {
                0 => vec![signal(DivergenceKind::Bullish, bar.close - offset, i)],
                1 => vec![signal(DivergenceKind::Bearish, bar.close + offset, i)],
                _ => vec![],
            };
            for event in engine.on_bar(i, bar, &pending) {
                if let StrategyEvent::Opened { side, price, stop, targets, .. } = event {
                    let ordered = match side {
                        Side::Long => stop < price && price < targets[0] && targets[0] <= targets[1] && targets[1] <= targets[2],
                        Side::Short => stop > price && price > targets[0] && targets[0] >= targets[1] && targets[1] >= targets[2],
                    };
                    prop_assert!(ordered, "bad setup {:?}", (side, price, stop, targets));
                }
            }
            let open = engine.trades().iter().filter(|t| !t.is_closed()).count();
            prop_assert!(open <= 1);
        }
        for trade in engine.closed_trades() {
            prop_assert_eq!(trade.filled_units(), SHARE_UNITS);
            let total: f64 = trade.fills.iter().map(|f| f.share).sum();
            prop_assert_eq!(total, 1.0, "shares {:?}", tp_shares);
        }
    }
}

fn signal(kind: DivergenceKind, from_price: f64, index: usize) -> Divergence {
    Divergence {
        kind,
        class: DivergenceClass::Hidden,
        from_index: index.saturating_sub(10),
        to_index: index.saturating_sub(2),
        from_price,
        to_price: from_price,
        from_oscillator: 0.0,
        to_oscillator: 0.0,
        confirmed_index: index,
    }
}

// ── 8. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pipeline_is_deterministic(bars in arb_bars(40..200)) {
        let params = small_params();
        let a = analyze(&bars, &params).unwrap();
        let b = analyze(&bars, &params).unwrap();
        prop_assert_eq!(output_hash(&a).unwrap(), output_hash(&b).unwrap());
        prop_assert_eq!(a, b);
    }
}

// ── 9. Streaming equals batch ────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn streaming_equals_batch(
        bars in arb_bars(40..200),
        oscillator in arb_oscillator(),
        price_source in arb_price_source(),
        detect_regular in any::<bool>(),
        atr_trail in any::<bool>(),
    ) {
        let params = variant_params(oscillator, price_source, detect_regular, atr_trail);
        let mut ctx = EngineContext::new(params.clone()).unwrap();
        ctx.extend(bars.iter().copied()).unwrap();
        prop_assert_eq!(ctx.output(), analyze(&bars, &params).unwrap());
    }
}

// ── 10. Performance identity ─────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn performance_identity(bars in arb_bars(40..300)) {
        let out = analyze(&bars, &small_params()).unwrap();
        let p = &out.performance;
        prop_assert_eq!(p.net_profit, p.gross_profit - p.gross_loss);
        prop_assert!(p.max_drawdown >= 0.0);
        prop_assert!(p.gross_loss >= 0.0);
        prop_assert_eq!(p.trades_closed, out.trades.iter().filter(|t| t.is_closed()).count());
    }
}
