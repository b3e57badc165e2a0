//! Render-only chart adapter.
//!
//! The core never draws. [`render_to`] walks a [`PipelineOutput`] and hands
//! series, markers and line shapes to whatever implements [`ChartSink`].

use serde::{Deserialize, Serialize};

use crate::divergence::{DivergenceClass, DivergenceKind};
use crate::domain::{SeriesPoint, Side, Trade};

use super::PipelineOutput;

pub const BULLISH_COLOR: &str = "#26a69a";
pub const BEARISH_COLOR: &str = "#ef5350";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPosition {
    AboveBar,
    BelowBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time: i64,
    pub position: MarkerPosition,
    pub color: String,
    pub shape: MarkerShape,
    pub text: String,
}

/// Straight segment between two (time, price) points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub time1: i64,
    pub price1: f64,
    pub time2: i64,
    pub price2: f64,
    pub color: String,
    pub line_width: u32,
    pub line_style: LineStyle,
}

pub trait ChartSink {
    fn set_series(&mut self, name: &str, points: &[SeriesPoint]);
    fn add_marker(&mut self, marker: Marker);
    fn add_shape(&mut self, shape: Shape);
}

fn side_color(side: Side) -> &'static str {
    match side {
        Side::Long => BULLISH_COLOR,
        Side::Short => BEARISH_COLOR,
    }
}

fn trade_markers(trade: &Trade, sink: &mut dyn ChartSink) {
    let (position, shape, label) = match trade.side {
        Side::Long => (MarkerPosition::BelowBar, MarkerShape::ArrowUp, "Long"),
        Side::Short => (MarkerPosition::AboveBar, MarkerShape::ArrowDown, "Short"),
    };
    sink.add_marker(Marker {
        time: trade.entry_time,
        position,
        color: side_color(trade.side).to_string(),
        shape,
        text: format!("{label} {} @ {:.2}", trade.id, trade.entry_price),
    });

    // Exits sit on the opposite side of the bar from the entry.
    let exit_position = match trade.side {
        Side::Long => MarkerPosition::AboveBar,
        Side::Short => MarkerPosition::BelowBar,
    };
    for fill in &trade.fills {
        let color = if fill.profit(trade.side, trade.entry_price) > 0.0 {
            BULLISH_COLOR
        } else {
            BEARISH_COLOR
        };
        sink.add_marker(Marker {
            time: fill.time,
            position: exit_position,
            color: color.to_string(),
            shape: MarkerShape::Circle,
            text: format!("{:?} {:.0}%", fill.reason, fill.share * 100.0),
        });
    }
}

/// Push every line, divergence segment and trade marker of `output` to `sink`.
pub fn render_to(output: &PipelineOutput, sink: &mut dyn ChartSink) {
    let ind = &output.indicators;
    sink.set_series("macd_line", &ind.macd_line);
    sink.set_series("signal_line", &ind.signal_line);
    sink.set_series("histogram", &ind.histogram);
    for (prefix, map) in [("sma", &ind.sma), ("ema", &ind.ema), ("rsi", &ind.rsi), ("atr", &ind.atr)] {
        for (period, points) in map {
            sink.set_series(&format!("{prefix}_{period}"), points);
        }
    }
    if let Some(bands) = &ind.bollinger {
        sink.set_series("bb_mid", &bands.mid);
        sink.set_series("bb_upper", &bands.upper);
        sink.set_series("bb_lower", &bands.lower);
    }

    for rec in &output.divergences {
        let d = &rec.divergence;
        let color = match d.kind {
            DivergenceKind::Bullish => BULLISH_COLOR,
            DivergenceKind::Bearish => BEARISH_COLOR,
        };
        sink.add_shape(Shape {
            time1: rec.from_time,
            price1: d.from_price,
            time2: rec.to_time,
            price2: d.to_price,
            color: color.to_string(),
            line_width: 2,
            line_style: match d.class {
                DivergenceClass::Hidden => LineStyle::Solid,
                DivergenceClass::Regular => LineStyle::Dashed,
            },
        });
    }

    for trade in &output.trades {
        trade_markers(trade, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divergence::Divergence;
    use crate::domain::{ExitReason, Fill, TradeId, SHARE_UNITS};
    use crate::engine::DivergenceRecord;

    #[derive(Default)]
    struct Recorder {
        series: Vec<(String, usize)>,
        markers: Vec<Marker>,
        shapes: Vec<Shape>,
    }

    impl ChartSink for Recorder {
        fn set_series(&mut self, name: &str, points: &[SeriesPoint]) {
            self.series.push((name.to_string(), points.len()));
        }

        fn add_marker(&mut self, marker: Marker) {
            self.markers.push(marker);
        }

        fn add_shape(&mut self, shape: Shape) {
            self.shapes.push(shape);
        }
    }

    fn output() -> PipelineOutput {
        let mut out = PipelineOutput::default();
        out.indicators.sma.insert(20, vec![SeriesPoint { time: 1, value: None }]);
        out.divergences.push(DivergenceRecord {
            from_time: 10,
            to_time: 40,
            divergence: Divergence {
                kind: DivergenceKind::Bullish,
                class: DivergenceClass::Hidden,
                from_index: 1,
                to_index: 4,
                from_price: 100.0,
                to_price: 102.0,
                from_oscillator: -5.0,
                to_oscillator: -8.0,
                confirmed_index: 6,
            },
        });
        out.trades.push(Trade {
            id: TradeId(1),
            side: Side::Long,
            entry_time: 60,
            entry_price: 103.0,
            initial_stop: 100.0,
            risk: 3.0,
            targets: [106.0, 109.0, 115.0],
            fills: vec![Fill {
                trade_id: TradeId(1),
                time: 70,
                price: 100.0,
                share: 1.0,
                share_units: SHARE_UNITS,
                reason: ExitReason::SL,
            }],
            closed_at: Some(70),
        });
        out
    }

    #[test]
    fn renders_series_shapes_and_markers() {
        let mut sink = Recorder::default();
        render_to(&output(), &mut sink);

        let names: Vec<&str> = sink.series.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["macd_line", "signal_line", "histogram", "sma_20"]);

        assert_eq!(sink.shapes.len(), 1);
        assert_eq!(sink.shapes[0].color, BULLISH_COLOR);
        assert_eq!((sink.shapes[0].time1, sink.shapes[0].time2), (10, 40));

        assert_eq!(sink.markers.len(), 2);
        assert_eq!(sink.markers[0].shape, MarkerShape::ArrowUp);
        assert_eq!(sink.markers[0].text, "Long T1 @ 103.00");
        assert_eq!(sink.markers[1].color, BEARISH_COLOR);
        assert_eq!(sink.markers[1].text, "SL 100%");
    }
}
