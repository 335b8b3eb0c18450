//! Named analysis configuration with documented defaults.
//!
//! Every calibration constant the pipeline needs lives here instead of being
//! scattered through the code. Three presets reproduce the settings of the
//! three analyses; a TOML file may override any subset of fields on top of a
//! preset:
//!
//! ```rust
//! use eegband::AnalysisConfig;
//!
//! let config = AnalysisConfig::correlation()
//!     .merge_toml("rescale_divisor = 10.0\n[filter]\nlow_hz = 1.0\n")
//!     .unwrap();
//! assert_eq!(config.rescale_divisor, 10.0);
//! assert_eq!(config.filter.low_hz, 1.0);
//! // untouched fields keep the preset value
//! assert_eq!(config.spectral.n_fft, 512);
//! assert!(config.normalize);
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BandError, Result};
use crate::types::{default_bands, Band};
use crate::{MUSE_CHANNELS, MUSE_SAMPLING_RATE};

/// Band-pass filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// High-pass corner in Hz
    pub low_hz: f64,
    /// Low-pass corner in Hz
    pub high_hz: f64,
    /// Butterworth order, even
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_hz: 1.0,
            high_hz: 50.0,
            order: 4,
        }
    }
}

/// Welch estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// FFT length and Welch segment length, in samples
    pub n_fft: usize,
    /// Samples shared by consecutive Welch segments
    pub overlap: usize,
    /// Lowest reported frequency (inclusive)
    pub fmin: f64,
    /// Highest reported frequency (inclusive)
    pub fmax: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            n_fft: 256,
            overlap: 0,
            fmin: 1.0,
            fmax: 50.0,
        }
    }
}

/// Topomap grid settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopomapConfig {
    /// Cells per grid side
    pub resolution: usize,
    /// Radius of the head circle in output units
    pub head_radius: f64,
}

impl Default for TopomapConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            head_radius: 1.0,
        }
    }
}

/// Full configuration surface of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Required channel columns; output order follows this list
    pub channels: Vec<String>,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Field delimiter of the recording files
    pub delimiter: char,
    /// Optional column with `YYYY-MM-DD HH:MM:SS.fff` timestamps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_column: Option<String>,
    /// Every retained sample is divided by this value
    pub rescale_divisor: f64,
    pub filter: FilterConfig,
    pub spectral: SpectralConfig,
    /// Epoch length in seconds
    pub epoch_duration: f64,
    pub bands: Vec<Band>,
    /// Report power relative to the sum over all bands
    pub normalize: bool,
    /// Band followed by the time-course and topomap analyses
    pub target_band: String,
    pub topomap: TopomapConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            channels: MUSE_CHANNELS.iter().map(|ch| ch.to_string()).collect(),
            sampling_rate: MUSE_SAMPLING_RATE,
            delimiter: ',',
            timestamp_column: Some("TimeStamp".to_string()),
            rescale_divisor: 1.0,
            filter: FilterConfig::default(),
            spectral: SpectralConfig::default(),
            epoch_duration: 1.0,
            bands: default_bands(),
            normalize: false,
            target_band: "Theta".to_string(),
            topomap: TopomapConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Per-epoch theta course: 1–50 Hz, 256-point FFT, 1 s epochs, raw units.
    pub fn time_course() -> Self {
        Self::default()
    }

    /// Per-trial relative band power: 2–50 Hz, 512-point FFT, amplitude / 100.
    pub fn correlation() -> Self {
        Self {
            rescale_divisor: 100.0,
            filter: FilterConfig {
                low_hz: 2.0,
                ..FilterConfig::default()
            },
            spectral: SpectralConfig {
                n_fft: 512,
                ..SpectralConfig::default()
            },
            normalize: true,
            ..Self::default()
        }
    }

    /// Per-channel theta power: 1–50 Hz, 256-point FFT, amplitude / 100.
    pub fn topomap() -> Self {
        Self {
            rescale_divisor: 100.0,
            ..Self::default()
        }
    }

    /// Overrides fields of `self` with the keys present in `text`.
    pub fn merge_toml(&self, text: &str) -> Result<Self> {
        let overrides: toml::Table = text.parse()?;
        let base = toml::Value::try_from(self).map_err(|e| BandError::Config(e.to_string()))?;
        let merged = match base {
            toml::Value::Table(mut table) => {
                merge_tables(&mut table, overrides);
                toml::Value::Table(table)
            }
            other => other,
        };
        let config: Self = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file and applies it on top of `self`.
    pub fn merge_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        self.merge_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BandError::Config(e.to_string()))
    }

    pub fn target(&self) -> Result<&Band> {
        self.bands
            .iter()
            .find(|band| band.name == self.target_band)
            .ok_or_else(|| {
                BandError::Config(format!(
                    "target band '{}' is not in the band registry",
                    self.target_band
                ))
            })
    }

    /// Samples per epoch at the configured rate
    pub fn epoch_samples(&self) -> usize {
        (self.epoch_duration * self.sampling_rate).round() as usize
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(BandError::Config("channel list is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.as_str()) {
                return Err(BandError::Config(format!("channel '{}' listed twice", ch)));
            }
        }
        if !(self.sampling_rate > 0.0) {
            return Err(BandError::Config(format!(
                "sampling rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        if !self.delimiter.is_ascii() {
            return Err(BandError::Config(format!(
                "delimiter '{}' is not a single ASCII character",
                self.delimiter
            )));
        }
        if !(self.rescale_divisor > 0.0) || !self.rescale_divisor.is_finite() {
            return Err(BandError::Config(format!(
                "rescale divisor must be positive and finite, got {}",
                self.rescale_divisor
            )));
        }

        let nyquist = self.sampling_rate / 2.0;
        let f = &self.filter;
        if !(f.low_hz > 0.0 && f.low_hz < f.high_hz && f.high_hz < nyquist) {
            return Err(BandError::Config(format!(
                "filter cutoffs must satisfy 0 < low < high < {} Hz, got {}–{} Hz",
                nyquist, f.low_hz, f.high_hz
            )));
        }
        if f.order == 0 || f.order % 2 != 0 {
            return Err(BandError::Config(format!(
                "filter order must be a positive even number, got {}",
                f.order
            )));
        }

        let s = &self.spectral;
        if s.n_fft < 2 {
            return Err(BandError::Config(format!("n_fft must be at least 2, got {}", s.n_fft)));
        }
        if s.overlap >= s.n_fft {
            return Err(BandError::Config(format!(
                "overlap ({}) must be smaller than n_fft ({})",
                s.overlap, s.n_fft
            )));
        }
        if s.fmin > s.fmax {
            return Err(BandError::Config(format!(
                "spectral range is inverted: {}–{} Hz",
                s.fmin, s.fmax
            )));
        }

        if !(self.epoch_duration > 0.0) || self.epoch_samples() == 0 {
            return Err(BandError::Config(format!(
                "epoch duration {} s is shorter than one sample",
                self.epoch_duration
            )));
        }

        if self.bands.is_empty() {
            return Err(BandError::Config("band registry is empty".to_string()));
        }
        let mut names = HashSet::new();
        for band in &self.bands {
            if band.fmin > band.fmax {
                return Err(BandError::Config(format!(
                    "band '{}' has fmin {} above fmax {}",
                    band.name, band.fmin, band.fmax
                )));
            }
            if !names.insert(band.name.as_str()) {
                return Err(BandError::Config(format!("band '{}' defined twice", band.name)));
            }
            // 频带内至少要有一个频率点，否则功率为 NaN
            let df = self.sampling_rate / s.n_fft as f64;
            let has_bin = (0..=s.n_fft / 2)
                .map(|k| k as f64 * df)
                .any(|f| f >= s.fmin && f <= s.fmax && f >= band.fmin && f <= band.fmax);
            if !has_bin {
                return Err(BandError::Config(format!(
                    "band '{}' ({}–{} Hz) has no frequency bin in the {}–{} Hz grid at {} Hz resolution",
                    band.name, band.fmin, band.fmax, s.fmin, s.fmax, df
                )));
            }
        }
        self.target()?;

        if self.topomap.resolution == 0 || !(self.topomap.head_radius > 0.0) {
            return Err(BandError::Config(
                "topomap resolution and head radius must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// 递归合并：表与表合并，其余值直接覆盖
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        AnalysisConfig::time_course().validate().unwrap();
        AnalysisConfig::correlation().validate().unwrap();
        AnalysisConfig::topomap().validate().unwrap();
    }

    #[test]
    fn test_presets_differ_where_expected() {
        let tc = AnalysisConfig::time_course();
        let corr = AnalysisConfig::correlation();
        let topo = AnalysisConfig::topomap();

        assert_eq!(tc.rescale_divisor, 1.0);
        assert_eq!(corr.rescale_divisor, 100.0);
        assert_eq!(topo.rescale_divisor, 100.0);
        assert_eq!(corr.filter.low_hz, 2.0);
        assert_eq!(tc.filter.low_hz, 1.0);
        assert_eq!(corr.spectral.n_fft, 512);
        assert!(corr.normalize);
        assert!(!tc.normalize);
        assert_eq!(tc.epoch_samples(), 256);
    }

    #[test]
    fn test_merge_replaces_band_registry() {
        let text = r#"
            target_band = "Alpha"
            [[bands]]
            name = "Alpha"
            fmin = 8.0
            fmax = 12.0
        "#;
        let config = AnalysisConfig::time_course().merge_toml(text).unwrap();
        assert_eq!(config.bands.len(), 1);
        assert_eq!(config.target().unwrap().fmax, 12.0);
    }

    #[test]
    fn test_merge_rejects_invalid_values() {
        let err = AnalysisConfig::time_course()
            .merge_toml("[filter]\nhigh_hz = 200.0\n")
            .unwrap_err();
        assert!(matches!(err, BandError::Config(_)));

        let err = AnalysisConfig::time_course()
            .merge_toml("target_band = \"Delta\"\n")
            .unwrap_err();
        assert!(matches!(err, BandError::Config(_)));
    }

    #[test]
    fn test_merge_rejects_malformed_toml() {
        let err = AnalysisConfig::time_course().merge_toml("channels = [").unwrap_err();
        assert!(matches!(err, BandError::Toml(_)));
    }

    #[test]
    fn test_validate_catches_bad_settings() {
        let mut config = AnalysisConfig::default();
        config.spectral.overlap = 256;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.filter.order = 3;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.channels.push("TP9".to_string());
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.bands.push(Band::new("Theta", 4.0, 8.0));
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.rescale_divisor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_band_without_bins_is_rejected() {
        // 低于 spectral.fmin 的频带
        let text = r#"
            [[bands]]
            name = "Delta"
            fmin = 0.1
            fmax = 0.5
            [[bands]]
            name = "Theta"
            fmin = 4.0
            fmax = 7.0
        "#;
        let err = AnalysisConfig::time_course().merge_toml(text).unwrap_err();
        assert!(matches!(err, BandError::Config(_)));

        // 落在两个频率点之间
        let mut config = AnalysisConfig::time_course();
        config.bands.push(Band::new("Narrow", 10.2, 10.8));
        assert!(matches!(config.validate(), Err(BandError::Config(_))));

        // 分辨率 0.5 Hz 时同一频带有频率点
        let mut config = AnalysisConfig::correlation();
        config.bands.push(Band::new("Narrow", 10.2, 10.8));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_round_trip_of_preset() {
        let text = AnalysisConfig::correlation().to_toml().unwrap();
        let back = AnalysisConfig::default().merge_toml(&text).unwrap();
        assert_eq!(back, AnalysisConfig::correlation());
    }
}
