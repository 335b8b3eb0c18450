//! # eegband
//!
//! Band-power analysis of multi-channel EEG exported from consumer headsets
//! (Muse: `TP9`, `AF7`, `AF8`, `TP10` at 256 Hz).
//!
//! Every analysis runs the same chain:
//!
//! 1. [`SignalLoader`] reads a delimited export and removes dropout rows
//! 2. [`BandpassFilter`] applies a zero-phase Butterworth band-pass
//! 3. [`WelchEstimator`] estimates the PSD per epoch or per recording
//! 4. [`BandAggregator`] reduces the PSD to band power
//!
//! and the three workflows in [`pipeline`] consume it:
//!
//! * **Time course** - per-epoch theta power of every session, aligned
//!   across sessions with mean, SD and SEM
//! * **Correlation** - relative band power per trial against an external
//!   score table (Spearman)
//! * **Topomap** - per-channel band power interpolated over the scalp
//!
//! ## Quick Start
//!
//! ```rust
//! use eegband::{AnalysisConfig, BandAggregator, Granularity, Pipeline, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let path = dir.path().join("session.csv");
//!     # eegband::doctest_utils::write_sine_recording(&path, 5.0, 10.0, 256.0)?;
//!     let mut pipeline = Pipeline::new(AnalysisConfig::time_course())?;
//!
//!     // 加载并滤波
//!     let recording = pipeline.load(&path)?;
//!     println!("{}: {:.1} s after cleaning", recording.label, recording.duration_secs());
//!
//!     // Relative band power of the whole recording
//!     let psd = pipeline.signal_psd(&recording)?;
//!     let powers = pipeline.aggregator().aggregate(&psd, Granularity::Whole, true);
//!     for (band, power) in pipeline.aggregator().band_names().iter().zip(powers.row(0)) {
//!         println!("{:>6}: {:.3}", band, power);
//!     }
//!     // 5 Hz 正弦波的能量集中在 Theta
//!     assert!(powers[[0, 0]] > 0.5);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`AnalysisConfig`] carries every constant of the chain. The presets
//! [`AnalysisConfig::time_course`], [`AnalysisConfig::correlation`] and
//! [`AnalysisConfig::topomap`] hold each workflow's settings; a TOML file
//! can override any field:
//!
//! ```rust
//! use eegband::AnalysisConfig;
//!
//! let config = AnalysisConfig::topomap()
//!     .merge_toml("target_band = \"Alpha\"\n[topomap]\nresolution = 128\n")?;
//! assert_eq!(config.target()?.fmin, 8.0);
//! # Ok::<(), eegband::BandError>(())
//! ```
//!
//! ## Dropout rows
//!
//! A row in which any required channel reads exactly `0` is treated as a
//! sensor dropout and removed before filtering. Genuine zero-valued samples
//! are removed as well.

pub mod aligner;
pub mod bands;
pub mod config;
pub mod correlation;
pub mod epochs;
pub mod error;
pub mod filter;
pub mod loader;
pub mod pipeline;
pub mod plot;
pub mod spectral;
pub mod topomap;
pub mod types;
pub mod utils;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use aligner::align_sessions;
pub use bands::{BandAggregator, Granularity};
pub use config::{AnalysisConfig, FilterConfig, SpectralConfig, TopomapConfig};
pub use correlation::correlate;
pub use error::{BandError, Result};
pub use filter::BandpassFilter;
pub use loader::SignalLoader;
pub use pipeline::Pipeline;
pub use spectral::WelchEstimator;
pub use topomap::TopomapProjector;
pub use types::{
    default_bands, AlignedSeries, Band, CorrelationResult, Psd, Recording, ScoreRow, ScoreTable,
    SensorValue, SessionSeries, TopomapField, TrialBandPowers,
};

// Muse 默认参数
pub const MUSE_CHANNELS: [&str; 4] = ["TP9", "AF7", "AF8", "TP10"];
pub const MUSE_SAMPLING_RATE: f64 = 256.0;

/// Library version
///
/// # Examples
///
/// ```rust
/// let version = eegband::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
