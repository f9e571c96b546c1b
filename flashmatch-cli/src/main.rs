//! flashmatch CLI: Command-line interface for flash-matching templates.
//!
//! Generates per-distance-bin templates and match scores from a matched
//! charge/flash sample, and equalizes calorimetric hits for electron
//! lifetime.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand, ValueEnum};
use flashmatch_algorithms::lifetime::EqualizationConfig;
use flashmatch_algorithms::TemplateGenerator;
use flashmatch_core::{
    CorrectionFit, Detector, DistanceBinning, ProfileErrors, SliceEvent, SpreadPolicy,
    TemplateConfig,
};
use flashmatch_io::{Delimiter, EventCsvReader, ScoreCsvWriter, TemplateDocument, TemplateWriter};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    FlashmatchIo(#[from] flashmatch_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] flashmatch_core::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Detector selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    /// SBND
    Sbnd,
    /// ICARUS east cryostat
    IcarusEast,
    /// ICARUS west cryostat
    IcarusWest,
}

/// Policy for bins without a usable spread.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpreadArg {
    /// Abort the run
    Fail,
    /// Borrow from the next bin
    Adjacent,
    /// Borrow from the nearest populated bin
    Nearest,
}

impl From<SpreadArg> for SpreadPolicy {
    fn from(arg: SpreadArg) -> Self {
        match arg {
            SpreadArg::Fail => SpreadPolicy::Fail,
            SpreadArg::Adjacent => SpreadPolicy::AdjacentBin,
            SpreadArg::Nearest => SpreadPolicy::NearestPopulated,
        }
    }
}

/// Flash-matching template generator.
#[derive(Parser)]
#[command(name = "flashmatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build templates and score every event of a sample
    Generate {
        /// Input sample (CSV with named columns)
        input: PathBuf,

        /// Output template file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Per-event score file (CSV)
        #[arg(short, long)]
        scores: Option<PathBuf>,

        /// Detector preset
        #[arg(short, long, value_enum, default_value = "sbnd")]
        detector: DetectorArg,

        /// Configuration file (JSON); overrides the detector preset
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Include the light-ratio term in the score
        #[arg(long)]
        score_ratio: bool,

        /// Spread policy for empty bins
        #[arg(long, value_enum)]
        spread_policy: Option<SpreadArg>,

        /// Fit corrections to binned means instead of single events
        #[arg(long)]
        profile_fit: bool,

        /// Report the error of the mean instead of the spread
        #[arg(long)]
        error_of_mean: bool,

        /// Random seed for the position hypotheses
        #[arg(long)]
        seed: Option<u64>,

        /// Accumulate on a single thread
        #[arg(long)]
        serial: bool,

        /// Input is whitespace-separated
        #[arg(long)]
        whitespace: bool,
    },

    /// Summarize a sample against the quality filter
    Inspect {
        /// Input sample (CSV with named columns)
        input: PathBuf,

        /// Detector preset used for the distance binning
        #[arg(short, long, value_enum, default_value = "sbnd")]
        detector: DetectorArg,

        /// Input is whitespace-separated
        #[arg(long)]
        whitespace: bool,
    },

    /// Correct hit dQ/dx for electron lifetime
    Equalize {
        /// Hits (CSV with named columns)
        hits: PathBuf,

        /// Lifetimes per run: `run tau0 tau1 tau2 tau3` after one header line
        #[arg(short, long)]
        lifetimes: PathBuf,

        /// Timing constants (JSON)
        #[arg(short, long)]
        constants: PathBuf,

        /// Output file (CSV)
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Generate {
            input,
            output,
            scores,
            detector,
            config,
            score_ratio,
            spread_policy,
            profile_fit,
            error_of_mean,
            seed,
            serial,
            whitespace,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => preset(detector),
            };
            if score_ratio {
                config.detector = with_ratio_term(config.detector);
            }
            if let Some(policy) = spread_policy {
                config.spread_policy = policy.into();
            }
            if profile_fit {
                config.correction_fit = CorrectionFit::Profile;
            }
            if error_of_mean {
                config.profile_errors = ProfileErrors::ErrorOfMean;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if serial {
                config.parallel = false;
            }

            let start = Instant::now();
            let events = read_sample(&input, whitespace)?;
            let generator = TemplateGenerator::new(config)?;
            let run = generator.run(&events)?;

            let doc = TemplateDocument::from_run(generator.config(), &run);
            TemplateWriter::create(&output)?.write(&doc)?;
            info!("Templates written to {}", output.display());
            if let Some(path) = scores {
                ScoreCsvWriter::create(&path)?.write_records(&run.records)?;
                info!("Scores written to {}", path.display());
            }

            println!(
                "Processed {} events in {:.2}s",
                events.len(),
                start.elapsed().as_secs_f64()
            );
            println!("Scored: {}", run.summary.scored);
            println!("Scored with borrowed spread: {}", run.summary.with_fallback);
            if let Some(mean) = run.summary.mean_score() {
                println!("Mean score: {:.3}", mean);
            }
            for (label, correction) in [("y", &run.corrections.y), ("z", &run.corrections.z)] {
                println!(
                    "{} correction ({} events): {:?}",
                    label,
                    correction.selected(),
                    correction.reported().coefficients()
                );
            }
        }

        Commands::Inspect {
            input,
            detector,
            whitespace,
        } => {
            let events = read_sample(&input, whitespace)?;
            let summary = SampleSummary::new(&events, &preset(detector).binning());
            println!("File: {}", input.display());
            println!("Events: {}", events.len());
            println!("Passing quality filter: {}", summary.passing);
            if let Some((low, high)) = summary.range {
                println!("Charge x range: {:.2} - {:.2}", low, high);
            }
            println!("Events per distance bin: {:?}", summary.per_bin);
        }

        Commands::Equalize {
            hits,
            lifetimes,
            constants,
            output,
        } => {
            let constants: EqualizationConfig =
                serde_json::from_reader(std::io::BufReader::new(std::fs::File::open(constants)?))?;
            let taus = flashmatch_io::lifetime::read_lifetimes(&lifetimes)?;
            let hits = flashmatch_io::lifetime::read_track_hits(&hits)?;
            let equalized = constants.equalize(&hits, &taus)?;
            flashmatch_io::lifetime::write_equalized_hits(&output, &equalized)?;
            println!(
                "Equalized {} of {} hits into {}",
                equalized.len(),
                hits.len(),
                output.display()
            );
        }
    }

    Ok(())
}

fn preset(detector: DetectorArg) -> TemplateConfig {
    match detector {
        DetectorArg::Sbnd => TemplateConfig::sbnd(),
        DetectorArg::IcarusEast => TemplateConfig::icarus(0),
        DetectorArg::IcarusWest => TemplateConfig::icarus(1),
    }
}

fn with_ratio_term(detector: Detector) -> Detector {
    match detector {
        Detector::Sbnd { .. } => Detector::Sbnd {
            use_uncoated_pmt: true,
        },
        Detector::Icarus { cryostat, .. } => Detector::Icarus {
            cryostat,
            use_opposite_volume: true,
        },
    }
}

fn load_config(path: &Path) -> Result<TemplateConfig> {
    let text = std::fs::read_to_string(path)?;
    let config: TemplateConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

fn read_sample(path: &Path, whitespace: bool) -> Result<Vec<SliceEvent>> {
    let delimiter = if whitespace {
        Delimiter::Whitespace
    } else {
        Delimiter::Comma
    };
    Ok(EventCsvReader::open(path)
        .with_delimiter(delimiter)
        .read_events()?)
}

/// Quality-filter counts of a sample.
struct SampleSummary {
    passing: usize,
    range: Option<(f64, f64)>,
    per_bin: Vec<usize>,
}

impl SampleSummary {
    fn new(events: &[SliceEvent], binning: &DistanceBinning) -> Self {
        let mut per_bin = vec![0; binning.bins()];
        let mut range: Option<(f64, f64)> = None;
        let mut passing = 0;
        for event in events.iter().filter(|e| e.passes_quality()) {
            passing += 1;
            per_bin[binning.bin_of(event.charge_x)] += 1;
            let x = event.charge_x;
            range = Some(range.map_or((x, x), |(lo, hi)| (lo.min(x), hi.max(x))));
        }
        Self {
            passing,
            range,
            per_bin,
        }
    }
}
