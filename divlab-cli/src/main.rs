//! divlab CLI: replay a CSV of bars through the kernel and export results.
//!
//! Commands:
//! - `analyze`: run the full pipeline over a bar file and print JSON
//! - `check-config`: parse and validate a params TOML without running

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use divlab_core::domain::{Bar, BarSeries};
use divlab_core::fingerprint::{dataset_hash, output_hash, params_hash};
use divlab_core::{analyze, PipelineOutput, PipelineParams};

#[derive(Parser)]
#[command(
    name = "divlab",
    about = "divlab CLI: indicators, divergences and trade replay over OHLC bars"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run indicators, divergence detection and the strategy over a bar file.
    Analyze {
        /// CSV with columns time,open,high,low,close[,volume].
        #[arg(long)]
        bars: PathBuf,

        /// Params TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Which part of the output to print.
        #[arg(long, value_enum, default_value_t = Section::All)]
        section: Section,
    },
    /// Parse and validate a params TOML file.
    CheckConfig {
        /// Path to the params TOML.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Section {
    All,
    Indicators,
    Divergences,
    Trades,
    Performance,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            bars,
            config,
            output,
            section,
        } => run_analyze(&bars, config.as_deref(), output.as_deref(), section),
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn run_analyze(
    bars_path: &Path,
    config_path: Option<&Path>,
    output_path: Option<&Path>,
    section: Section,
) -> Result<()> {
    let params = load_params(config_path)?;
    let bars = load_bars(bars_path)?;

    info!(
        bars = bars.len(),
        dataset = %dataset_hash(bars.as_slice()).short(),
        params = %params_hash(&params)?.short(),
        "running pipeline"
    );

    let result = analyze(bars.as_slice(), &params)
        .with_context(|| format!("analyzing {}", bars_path.display()))?;

    let perf = &result.performance;
    info!(
        divergences = result.divergences.len(),
        trades = perf.trades_closed,
        net_profit = perf.net_profit,
        win_rate = perf.win_rate,
        output = %output_hash(&result)?.short(),
        "pipeline finished"
    );

    let json = render_section(&result, section)?;
    match output_path {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output written");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let params = load_params(Some(path))?;
    println!("Config OK: {}", path.display());
    println!("  minimum bars: {}", params.min_bars());
    println!("  overlays:     {}", params.indicators.len());
    println!("  params hash:  {}", params_hash(&params)?);
    Ok(())
}

fn load_params(path: Option<&Path>) -> Result<PipelineParams> {
    match path {
        Some(path) => PipelineParams::load(path)
            .with_context(|| format!("loading params from {}", path.display())),
        None => Ok(PipelineParams::default()),
    }
}

fn render_section(output: &PipelineOutput, section: Section) -> Result<String> {
    let json = match section {
        Section::All => serde_json::to_string_pretty(output),
        Section::Indicators => serde_json::to_string_pretty(&output.indicators),
        Section::Divergences => serde_json::to_string_pretty(&output.divergences),
        Section::Trades => serde_json::to_string_pretty(&output.trades),
        Section::Performance => serde_json::to_string_pretty(&output.performance),
    };
    json.context("serializing output")
}

// ── CSV loading ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvBar {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    #[allow(dead_code)]
    volume: Option<f64>,
}

fn load_bars(path: &Path) -> Result<BarSeries> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_bars(file).with_context(|| format!("reading bars from {}", path.display()))
}

fn read_bars<R: Read>(reader: R) -> Result<BarSeries> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut series = BarSeries::new();

    for (row, record) in csv.deserialize::<CsvBar>().enumerate() {
        let record = record.with_context(|| format!("row {}", row + 1))?;
        let time = parse_time(&record.time).with_context(|| format!("row {}", row + 1))?;
        let bar = Bar::new(time, record.open, record.high, record.low, record.close);
        series
            .push(bar)
            .with_context(|| format!("row {}", row + 1))?;
    }

    if series.is_empty() {
        warn!("bar file has no rows");
    }
    Ok(series)
}

/// Integer epoch seconds or an RFC 3339 timestamp.
fn parse_time(raw: &str) -> Result<i64> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.timestamp()),
        Err(e) => bail!("unrecognized time '{raw}': {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_time_epoch_and_rfc3339() {
        assert_eq!(parse_time("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_time("2024-01-02T00:00:00Z").unwrap(), 1_704_153_600);
        assert_eq!(parse_time("2024-01-02T01:00:00+01:00").unwrap(), 1_704_153_600);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn reads_bars_with_and_without_volume() {
        let file = write_temp(
            "time,open,high,low,close,volume\n\
             1700000000,10,11,9,10.5,1200\n\
             1700000060,10.5,12,10,11.5,\n",
        );
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars.get(1).unwrap().close, 11.5);

        let file = write_temp("time,open,high,low,close\n2024-01-02T00:00:00Z,1,2,0.5,1.5\n");
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.get(0).unwrap().time, 1_704_153_600);
    }

    #[test]
    fn rejects_broken_envelope_and_unordered_time() {
        let file = write_temp("time,open,high,low,close\n1,10,9,8,10\n");
        let err = format!("{:#}", load_bars(file.path()).unwrap_err());
        assert!(err.contains("row 1"), "{err}");

        let file = write_temp("time,open,high,low,close\n2,1,2,0,1\n1,1,2,0,1\n");
        let err = format!("{:#}", load_bars(file.path()).unwrap_err());
        assert!(err.contains("row 2"), "{err}");
    }

    #[test]
    fn missing_file_mentions_path() {
        let err = load_bars(Path::new("/nonexistent/bars.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/bars.csv"));
    }

    #[test]
    fn analyze_writes_requested_section() {
        let mut csv = String::from("time,open,high,low,close\n");
        for i in 0..80 {
            let close = 100.0 + (i as f64 / 6.0).sin() * 5.0;
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                1_700_000_000 + i * 60,
                close,
                close + 1.0,
                close - 1.0,
                close
            ));
        }
        let bars = write_temp(&csv);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("perf.json");

        run_analyze(bars.path(), None, Some(&out), Section::Performance).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert!(json.get("net_profit").is_some());
        assert!(json.get("equity_curve").is_some());
    }

    #[test]
    fn analyze_reports_too_few_bars() {
        let bars = write_temp("time,open,high,low,close\n1,1,2,0,1\n2,1,2,0,1\n");
        let err = run_analyze(bars.path(), None, None, Section::All).unwrap_err();
        assert!(format!("{err:#}").contains("insufficient data"));
    }

    #[test]
    fn check_config_rejects_bad_toml() {
        let file = write_temp("[macd]\nslow = 0\n");
        assert!(run_check_config(file.path()).is_err());

        let file = write_temp("[macd]\nfast = 5\nslow = 10\nsignal = 3\n");
        run_check_config(file.path()).unwrap();
    }
}
