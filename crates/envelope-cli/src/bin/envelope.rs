//! Progressive flight envelope for a demonstration aircraft.
//!
//! Prints one JSON line per published resolution level to stdout; logs go
//! to stderr. Configuration starts from the `ENVELOPE_*` environment
//! variables, then the preset's bounds, then any explicit flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use envelope_cli::report::{parse_field, LevelReport};
use envelope_cli::Preset;
use envelope_core::{build_worker_pool, EnvelopeConfig, GridSampler, PointCache};
use envelope_runtime::config::{parse_condition, parse_resolutions};
use envelope_runtime::{Config, PublishedEnvelope, ResolutionPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Aircraft to analyse
    #[arg(long, value_enum, default_value_t = Preset::Fighter)]
    preset: Preset,

    /// JSON file with a full envelope configuration (replaces env defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    speed_min: Option<f64>,

    #[arg(long)]
    speed_max: Option<f64>,

    #[arg(long)]
    altitude_min: Option<f64>,

    #[arg(long)]
    altitude_max: Option<f64>,

    /// Resolution schedule, e.g. "16x16,48x48,128x128"
    #[arg(long)]
    resolutions: Option<String>,

    /// Ascent target as "speed,altitude"
    #[arg(long)]
    target: Option<String>,

    /// Ascent start as "speed,altitude"
    #[arg(long)]
    start: Option<String>,

    /// Sampling threads (0 = rayon default pool)
    #[arg(long)]
    threads: Option<usize>,

    /// Include every recorded path point
    #[arg(long, default_value_t = false)]
    points: bool,

    /// Dump a per-point field, repeatable (e.g. excess_specific_power)
    #[arg(long = "field")]
    fields: Vec<String>,

    #[arg(long, default_value_t = false)]
    pretty: bool,
}

impl Args {
    fn to_config(&self) -> Result<Config> {
        let mut config = Config::from_env();
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            config.envelope = serde_json::from_str::<EnvelopeConfig>(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
        } else {
            self.preset.scenario().configure(&mut config.envelope);
        }

        let envelope = &mut config.envelope;
        if let Some(value) = self.speed_min {
            envelope.speed.lower = value;
        }
        if let Some(value) = self.speed_max {
            envelope.speed.upper = value;
        }
        if let Some(value) = self.altitude_min {
            envelope.altitude.lower = value;
        }
        if let Some(value) = self.altitude_max {
            envelope.altitude.upper = value;
        }
        if let Some(value) = &self.resolutions {
            envelope.resolutions = parse_resolutions(value)
                .ok_or_else(|| anyhow!("invalid resolution schedule '{}'", value))?;
        }
        if let Some(value) = &self.target {
            envelope.target =
                Some(parse_condition(value).ok_or_else(|| anyhow!("invalid target '{}'", value))?);
        }
        if let Some(value) = &self.start {
            envelope.start =
                Some(parse_condition(value).ok_or_else(|| anyhow!("invalid start '{}'", value))?);
        }
        if let Some(threads) = self.threads {
            config.worker_threads = threads;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("envelope_cli=info".parse()?)
                .add_directive("envelope_runtime=info".parse()?)
                .add_directive("envelope_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config()?;
    let fields = args
        .fields
        .iter()
        .map(|name| parse_field(name).ok_or_else(|| anyhow!("unknown field '{}'", name)))
        .collect::<Result<Vec<_>>>()?;

    let scenario = args.preset.scenario();
    tracing::info!(
        aircraft = %scenario.name,
        levels = config.envelope.resolutions.len(),
        "Starting envelope refinement"
    );

    let mut sampler = GridSampler::new(Arc::new(PointCache::new(config.envelope.quantization)));
    if config.worker_threads > 0 {
        let workers = build_worker_pool(config.worker_threads)?;
        sampler = sampler.with_workers(Arc::new(workers));
    }
    let pipeline = ResolutionPipeline::new(Arc::new(scenario.aircraft), sampler, config.envelope);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling refinement");
                cancel.cancel();
            }
        });
    }

    let (with_points, pretty) = (args.points, args.pretty);
    let print = move |envelope: Arc<PublishedEnvelope>| {
        let report = LevelReport::new(&envelope, with_points, &fields);
        let encoded = if pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };
        match encoded {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to encode level {}: {}", envelope.level, e),
        }
    };

    match pipeline.run(&print, cancel).await {
        Ok(report) => {
            tracing::info!(
                levels = report.levels_published,
                hits = report.cache.hits,
                misses = report.cache.misses,
                elapsed_ms = report.elapsed_ms,
                "Envelope refinement complete"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            tracing::info!("Envelope refinement cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
