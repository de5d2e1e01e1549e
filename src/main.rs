use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use trackspike::config::SpikeConfig;
use trackspike::evidence::GeminiSearch;
use trackspike::pipeline::{self, Collaborators, DetectionOutcome, PhaseStatus, Status};
use trackspike::report::{self, GeminiSynthesizer};

#[derive(Parser)]
#[command(
    name = "trackspike",
    about = "Detect and explain spikes in per-country music engagement data",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults: $TRACKSPIKE_CONFIG, ./trackspike.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print phase results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest engagement data and write the anomaly file
    Detect {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Research detected anomalies and write the final report
    Report {
        #[command(flatten)]
        paths: PathOverrides,
    },

    /// Detection followed by reporting when anomalies were found
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args, Default)]
struct PathOverrides {
    /// Engagement CSV to analyse
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory for the anomaly file and report
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl PathOverrides {
    fn apply(self, cfg: &mut SpikeConfig) {
        if let Some(data) = self.data {
            cfg.paths.data_file = data;
        }
        if let Some(dir) = self.output_dir {
            cfg.paths.output_dir = dir;
        }
    }
}

#[derive(Args, Default)]
struct Overrides {
    #[command(flatten)]
    paths: PathOverrides,

    /// Rolling window size (preceding observations)
    #[arg(long)]
    window: Option<usize>,

    /// Standard-deviation multiplier for the upper band
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum absolute views for a spike
    #[arg(long)]
    floor: Option<f64>,

    /// Process segments in parallel
    #[arg(long)]
    parallel: bool,
}

impl Overrides {
    fn apply(self, cfg: &mut SpikeConfig) {
        self.paths.apply(cfg);
        if let Some(window) = self.window {
            cfg.analysis.window_size = window;
        }
        if let Some(k) = self.threshold {
            cfg.analysis.std_dev_threshold = k;
        }
        if let Some(floor) = self.floor {
            cfg.analysis.absolute_floor = floor;
        }
        if self.parallel {
            cfg.analysis.parallel = true;
        }
    }
}

fn print_status(label: &str, status: &PhaseStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        let tag = match status.status {
            Status::Success => "OK",
            Status::Error => "ERROR",
        };
        println!("{:<10} | {:<5} | {}", label, tag, status.message);
        if let Some(file) = &status.output_file {
            println!("{:<10} | {:<5} |   -> {}", "", "", file);
        }
    }
    Ok(())
}

fn print_anomalies(cfg: &SpikeConfig) -> Result<()> {
    let records = trackspike::handoff::read_anomalies(&cfg.paths.anomaly_file())?;
    println!();
    for rec in &records {
        println!("  > {}", report::format_anomaly_line(rec));
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => SpikeConfig::load(path)?,
        None => SpikeConfig::load_or_default(),
    };
    trackspike::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Detect { overrides } => {
            overrides.apply(&mut cfg);
            tracing::info!(data = %cfg.paths.data_file.display(), "Running detection");
            match pipeline::run_detection(&cfg) {
                Ok(outcome) => {
                    print_status("detection", &outcome.status(), cli.json)?;
                    if !cli.json && matches!(outcome, DetectionOutcome::Anomalies { .. }) {
                        print_anomalies(&cfg)?;
                    }
                }
                Err(e) => {
                    print_status("detection", &PhaseStatus::error(&e), cli.json)?;
                    std::process::exit(1);
                }
            }
        }
        Commands::Report { paths } => {
            paths.apply(&mut cfg);
            let lookup = GeminiSearch::from_config(&cfg.models)?;
            let synthesizer = GeminiSynthesizer::from_config(&cfg.models)?;
            match pipeline::run_reporting(&cfg, &lookup, &synthesizer).await {
                Ok(path) => {
                    let status = PhaseStatus {
                        status: Status::Success,
                        message: "Final analysis report written.".to_string(),
                        anomalies_found: None,
                        output_file: Some(path.display().to_string()),
                    };
                    print_status("reporting", &status, cli.json)?;
                }
                Err(e) => {
                    print_status("reporting", &PhaseStatus::error(&e), cli.json)?;
                    std::process::exit(1);
                }
            }
        }
        Commands::Run { overrides } => {
            overrides.apply(&mut cfg);
            let summary = pipeline::run_workflow(&cfg, |cfg| {
                Ok(Collaborators {
                    lookup: Box::new(GeminiSearch::from_config(&cfg.models)?),
                    synthesizer: Box::new(GeminiSynthesizer::from_config(&cfg.models)?),
                })
            })
            .await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n=== trackspike run {} ===", summary.run_id);
                print_status("detection", &summary.detection, false)?;
                if let Some(reporting) = &summary.reporting {
                    print_status("reporting", reporting, false)?;
                }
                println!();
            }

            let failed = !summary.detection.is_success()
                || summary.reporting.as_ref().is_some_and(|r| !r.is_success());
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
