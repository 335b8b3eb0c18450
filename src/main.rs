//! eegband command-line tool
//!
//! # Usage
//!
//! ```bash
//! # Theta course across every session in a folder
//! eegband time-course --input "Brain Wave Files" --output theta.svg --table theta.csv
//!
//! # Relative band power against subjective scores
//! eegband correlate --input "Brain Wave Files" --scores ratings.xlsx --output heatmap.svg
//!
//! # Scalp map of one recording
//! eegband topomap --input session.csv --band Alpha --output alpha.svg
//!
//! # Effective settings after applying a config file
//! eegband --config lab.toml show-config correlate
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

use eegband::pipeline::{run_correlation, run_time_course, run_topomap};
use eegband::{plot, AnalysisConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "eegband")]
#[command(author, version, about = "Band-power analysis of Muse EEG exports", long_about = None)]
struct Cli {
    /// TOML file overriding the workflow preset
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging verbosity level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Per-epoch band power of every session, aligned across sessions
    TimeCourse {
        /// Directory of recording CSV files
        #[arg(short, long)]
        input: PathBuf,

        /// SVG line chart with ±1 SD band
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV of epoch,mean,std,sem
        #[arg(short, long)]
        table: Option<PathBuf>,
    },

    /// Spearman correlation of relative band power with trial scores
    Correlate {
        /// Directory of recording CSV files, one trial per file
        #[arg(short, long)]
        input: PathBuf,

        /// Score table (.xlsx, .xls, .ods or .csv) with a Trial column
        #[arg(short, long)]
        scores: PathBuf,

        /// SVG heatmap
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV of band rows by score columns
        #[arg(short, long)]
        table: Option<PathBuf>,
    },

    /// Per-channel band power of one recording as a scalp map
    Topomap {
        /// Recording CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Band to map (defaults to the configured target band)
        #[arg(short, long)]
        band: Option<String>,

        /// SVG scalp map
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV of channel,x,y,value
        #[arg(short, long)]
        table: Option<PathBuf>,
    },

    /// Print the effective configuration of a workflow as TOML
    ShowConfig {
        #[arg(value_enum)]
        workflow: Workflow,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Workflow {
    TimeCourse,
    Correlate,
    Topomap,
}

impl Workflow {
    fn preset(self) -> AnalysisConfig {
        match self {
            Workflow::TimeCourse => AnalysisConfig::time_course(),
            Workflow::Correlate => AnalysisConfig::correlation(),
            Workflow::Topomap => AnalysisConfig::topomap(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(workflow: Workflow, path: Option<&Path>) -> Result<AnalysisConfig> {
    let preset = workflow.preset();
    match path {
        Some(path) => {
            info!("Applying configuration from {}", path.display());
            preset.merge_toml_file(path)
        }
        None => Ok(preset),
    }
}

fn create_table(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::TimeCourse { input, output, table } => {
            let config = load_config(Workflow::TimeCourse, config_path)?;
            let report = run_time_course(config, &input)?;
            for path in &report.skipped {
                warn!("Not included: {}", path.display());
            }
            println!(
                "{} sessions aligned to {} epochs ({} course)",
                report.sessions.len(),
                report.aligned.len(),
                report.band
            );
            if let Some(path) = table {
                report.aligned.write_csv(create_table(&path)?)?;
            }
            if let Some(path) = output {
                plot::render_time_course(&report.aligned, &report.band, &path)?;
            }
        }
        Commands::Correlate {
            input,
            scores,
            output,
            table,
        } => {
            let config = load_config(Workflow::Correlate, config_path)?;
            let report = run_correlation(config, &input, &scores)?;
            let result = &report.result;
            println!(
                "{} trials matched, {} band-power and {} score rows dropped",
                result.matched_trials.len(),
                result.unmatched_band_trials.len(),
                result.unmatched_score_trials.len()
            );
            print!("{:>8}", "");
            for score in &result.scores {
                print!(" {:>12}", score);
            }
            println!();
            for (i, band) in result.bands.iter().enumerate() {
                print!("{:>8}", band);
                for value in result.matrix.row(i) {
                    print!(" {:>12.2}", value);
                }
                println!();
            }
            if let Some(path) = table {
                result.write_csv(create_table(&path)?)?;
            }
            if let Some(path) = output {
                plot::render_correlation_heatmap(result, &path)?;
            }
        }
        Commands::Topomap {
            input,
            band,
            output,
            table,
        } => {
            let mut config = load_config(Workflow::Topomap, config_path)?;
            if let Some(band) = band {
                config.target_band = band;
                config.validate()?;
            }
            let report = run_topomap(config, &input)?;
            for sensor in &report.field.sensors {
                println!(
                    "{:>6} ({:+.2}, {:+.2}): {:.4}",
                    sensor.channel, sensor.x, sensor.y, sensor.value
                );
            }
            if let Some(path) = table {
                report.field.write_csv(create_table(&path)?)?;
            }
            if let Some(path) = output {
                let title = format!("{} power: {}", report.band, report.label);
                plot::render_topomap(&report.field, &title, &path)?;
            }
        }
        Commands::ShowConfig { workflow } => {
            let config = load_config(workflow, config_path)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
