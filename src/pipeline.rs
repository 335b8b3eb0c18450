//! Shared processing chain and the three analysis workflows.
//!
//! Every workflow runs the same stages, load → filter → Welch PSD → band
//! power, and only differs in how it segments the signal and reduces the
//! band table:
//!
//! | Workflow | PSD | Reduction |
//! |----------|-----|-----------|
//! | [`run_time_course`] | per epoch | target band per epoch, sessions aligned |
//! | [`run_correlation`] | whole recording | relative power per band, joined with scores |
//! | [`run_topomap`] | whole recording | target band per channel, projected |
//!
//! Batch workflows process files in sorted name order. A file that fails is
//! logged and skipped; the workflow only fails when no file succeeds.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::aligner::align_sessions;
use crate::bands::{BandAggregator, Granularity};
use crate::config::AnalysisConfig;
use crate::correlation::correlate;
use crate::epochs::make_fixed_length_epochs;
use crate::error::{BandError, Result};
use crate::filter::BandpassFilter;
use crate::loader::SignalLoader;
use crate::spectral::WelchEstimator;
use crate::topomap::TopomapProjector;
use crate::types::{
    AlignedSeries, CorrelationResult, Psd, Recording, ScoreTable, SessionSeries, TopomapField,
    TrialBandPowers,
};
use crate::utils::{file_label, list_files_with_extension};

/// Extension of recording files picked up from an input directory
pub const RECORDING_EXTENSION: &str = "csv";

/// Loader, filter, estimator and aggregator built from one configuration.
pub struct Pipeline {
    config: AnalysisConfig,
    loader: SignalLoader,
    filter: BandpassFilter,
    estimator: WelchEstimator,
    aggregator: BandAggregator,
}

impl Pipeline {
    /// Validates `config` and builds every stage from it.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let loader = SignalLoader::from_config(&config);
        let filter = BandpassFilter::from_config(&config.filter, config.sampling_rate)?;
        let estimator = WelchEstimator::from_config(&config.spectral, config.sampling_rate)?;
        let aggregator = BandAggregator::new(config.bands.clone());
        Ok(Self {
            config,
            loader,
            filter,
            estimator,
            aggregator,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &BandAggregator {
        &self.aggregator
    }

    /// Loads and band-pass filters one recording.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Recording> {
        let raw = self.loader.load(path)?;
        self.filter(&raw)
    }

    pub fn filter(&self, recording: &Recording) -> Result<Recording> {
        self.filter.filter_recording(recording)
    }

    /// PSD of every fixed-length epoch of `recording`.
    pub fn epoch_psd(&mut self, recording: &Recording) -> Result<Psd> {
        let epochs = make_fixed_length_epochs(&recording.data, recording.sfreq, self.config.epoch_duration)?;
        self.estimator.psd_epochs(&epochs)
    }

    /// PSD of the whole recording.
    pub fn signal_psd(&mut self, recording: &Recording) -> Result<Psd> {
        self.estimator.psd_signal(&recording.data)
    }

    /// Target-band power per epoch, averaged over channels.
    pub fn session_series(&mut self, recording: &Recording) -> Result<SessionSeries> {
        let psd = self.epoch_psd(recording)?;
        let values = self
            .aggregator
            .band_series(&psd, &self.config.target_band, self.config.normalize)?;
        Ok(SessionSeries::new(recording.label.clone(), values))
    }

    /// Power of every registered band over the whole recording.
    pub fn trial_band_powers(&mut self, trial: i64, recording: &Recording) -> Result<TrialBandPowers> {
        let psd = self.signal_psd(recording)?;
        let table = self.aggregator.aggregate(&psd, Granularity::Whole, self.config.normalize);
        Ok(TrialBandPowers {
            trial,
            label: recording.label.clone(),
            powers: table.row(0).to_vec(),
        })
    }

    /// Power of `band` per channel over the whole recording, in channel order.
    pub fn channel_band_power(&mut self, recording: &Recording, band: &str) -> Result<Vec<f64>> {
        let col = self.aggregator.band_index(band)?;
        let psd = self.signal_psd(recording)?;
        let table = self
            .aggregator
            .aggregate(&psd, Granularity::PerChannel, self.config.normalize);
        Ok(table.column(col).to_vec())
    }
}

/// Result of [`run_time_course`]
#[derive(Debug, Clone)]
pub struct TimeCourseReport {
    pub band: String,
    pub sessions: Vec<SessionSeries>,
    pub aligned: AlignedSeries,
    pub skipped: Vec<PathBuf>,
}

/// Result of [`run_correlation`]
#[derive(Debug, Clone)]
pub struct CorrelationReport {
    pub trials: Vec<TrialBandPowers>,
    pub result: CorrelationResult,
    pub skipped: Vec<PathBuf>,
}

/// Result of [`run_topomap`]
#[derive(Debug, Clone)]
pub struct TopomapReport {
    pub label: String,
    pub band: String,
    pub field: TopomapField,
}

/// Recording files of `dir` in processing order.
///
/// # Errors
///
/// [`BandError::EmptyData`] when the directory holds no recording file.
pub fn discover_recordings<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let files = list_files_with_extension(dir, RECORDING_EXTENSION)?;
    if files.is_empty() {
        return Err(BandError::EmptyData(format!(
            "no .{} recordings in {}",
            RECORDING_EXTENSION,
            dir.display()
        )));
    }
    info!("Found {} recordings in {}", files.len(), dir.display());
    Ok(files)
}

/// Applies `f` to every file with its 1-based position, skipping failures.
/// Returns the successes and the skipped paths.
fn process_batch<T, F>(files: &[PathBuf], mut f: F) -> (Vec<T>, Vec<PathBuf>)
where
    F: FnMut(usize, &Path) -> Result<T>,
{
    let mut done = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();
    for (i, path) in files.iter().enumerate() {
        match f(i + 1, path) {
            Ok(value) => done.push(value),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped.push(path.clone());
            }
        }
    }
    (done, skipped)
}

/// Per-epoch target-band course of every recording in `dir`, aligned
/// across sessions.
///
/// # Examples
///
/// ```rust
/// use eegband::{pipeline::run_time_course, AnalysisConfig};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # eegband::doctest_utils::write_sine_recording(&dir.path().join("s1.csv"), 5.0, 6.0, 256.0)?;
/// # eegband::doctest_utils::write_sine_recording(&dir.path().join("s2.csv"), 6.0, 4.0, 256.0)?;
/// let report = run_time_course(AnalysisConfig::time_course(), dir.path())?;
/// assert_eq!(report.sessions.len(), 2);
/// assert_eq!(report.aligned.len(), report.sessions.iter().map(|s| s.len()).min().unwrap());
/// # Ok::<(), eegband::BandError>(())
/// ```
pub fn run_time_course<P: AsRef<Path>>(config: AnalysisConfig, dir: P) -> Result<TimeCourseReport> {
    let mut pipeline = Pipeline::new(config)?;
    let band = pipeline.config().target()?.name.clone();
    let files = discover_recordings(dir)?;

    let (sessions, skipped) = process_batch(&files, |_, path| {
        let recording = pipeline.load(path)?;
        pipeline.session_series(&recording)
    });
    if sessions.is_empty() {
        return Err(BandError::EmptyData(format!(
            "none of the {} recordings could be processed",
            files.len()
        )));
    }

    let aligned = align_sessions(&sessions)?;
    info!(
        "{} course over {} sessions, aligned to {} epochs",
        band,
        sessions.len(),
        aligned.len()
    );
    Ok(TimeCourseReport {
        band,
        sessions,
        aligned,
        skipped,
    })
}

/// Band power of every recording in `dir`, numbered by sorted file
/// position, correlated against the score table at `scores`.
pub fn run_correlation<P: AsRef<Path>, Q: AsRef<Path>>(
    config: AnalysisConfig,
    dir: P,
    scores: Q,
) -> Result<CorrelationReport> {
    let mut pipeline = Pipeline::new(config)?;
    let files = discover_recordings(dir)?;
    let table = ScoreTable::from_path(scores)?;

    // trial id 取文件在排序后的位置，失败文件不改变后续编号
    let (trials, skipped) = process_batch(&files, |position, path| {
        let recording = pipeline.load(path)?;
        pipeline.trial_band_powers(position as i64, &recording)
    });
    if trials.is_empty() {
        return Err(BandError::EmptyData(format!(
            "none of the {} recordings could be processed",
            files.len()
        )));
    }

    let result = correlate(&pipeline.aggregator().band_names(), &trials, &table)?;
    Ok(CorrelationReport {
        trials,
        result,
        skipped,
    })
}

/// Target-band power per channel of one recording, projected onto the
/// head plane.
pub fn run_topomap<P: AsRef<Path>>(config: AnalysisConfig, file: P) -> Result<TopomapReport> {
    let file = file.as_ref();
    let projector = TopomapProjector::from_config(&config.topomap);
    let mut pipeline = Pipeline::new(config)?;
    let band = pipeline.config().target()?.name.clone();

    let recording = pipeline.load(file)?;
    let values = pipeline.channel_band_power(&recording, &band)?;
    let field = projector.project(&recording.ch_names, &values)?;
    info!("{} topomap of {} over {} channels", band, file_label(file), values.len());

    Ok(TopomapReport {
        label: recording.label,
        band,
        field,
    })
}
