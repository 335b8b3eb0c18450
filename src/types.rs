use std::io;

use chrono::NaiveDateTime;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A named frequency interval `[fmin, fmax]` in Hz, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub fmin: f64,
    pub fmax: f64,
}

impl Band {
    pub fn new(name: impl Into<String>, fmin: f64, fmax: f64) -> Self {
        Self {
            name: name.into(),
            fmin,
            fmax,
        }
    }

    /// 频率是否落在闭区间内
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.fmin && freq <= self.fmax
    }
}

/// The band registry used by all three workflows, in output order.
pub fn default_bands() -> Vec<Band> {
    vec![
        Band::new("Theta", 4.0, 7.0),
        Band::new("Alpha", 8.0, 13.0),
        Band::new("Beta", 13.0, 30.0),
        Band::new("Gamma", 30.0, 50.0),
    ]
}

/// A multichannel recording held channel-major (`channels × samples`).
///
/// Produced by [`SignalLoader`](crate::SignalLoader) after dropout rows have
/// been removed, and by the filter stage, which keeps every field except
/// `data` unchanged.
#[derive(Debug, Clone)]
pub struct Recording {
    /// File stem of the source file
    pub label: String,
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    pub data: Array2<f64>,
    /// Data rows present in the source file
    pub rows_read: usize,
    /// Rows removed because a required channel read exactly zero
    pub rows_dropped: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
}

impl Recording {
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Duration implied by the sample count and sampling rate, in seconds
    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    /// Wall-clock span between first and last retained timestamp, if known
    pub fn wall_clock_secs(&self) -> Option<f64> {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => Some((last - first).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.ch_names.iter().position(|ch| ch == name)
    }
}

/// Power spectral density per epoch and channel.
///
/// `power` has shape `epochs × channels × freqs`; whole-signal estimates use
/// a single epoch. `freqs` is ascending and has one entry per last-axis bin.
#[derive(Debug, Clone)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Array3<f64>,
}

impl Psd {
    pub fn n_epochs(&self) -> usize {
        self.power.dim().0
    }

    pub fn n_channels(&self) -> usize {
        self.power.dim().1
    }

    /// Indices of the frequency bins inside `band`
    pub fn band_bins(&self, band: &Band) -> Vec<usize> {
        self.freqs
            .iter()
            .enumerate()
            .filter(|&(_, &f)| band.contains(f))
            .map(|(i, _)| i)
            .collect()
    }
}

/// One band-power value per epoch of a single recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeries {
    pub label: String,
    pub values: Vec<f64>,
}

impl SessionSeries {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sessions truncated to a common length with per-epoch statistics.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    pub labels: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation (ddof = 0)
    pub std: Vec<f64>,
    /// Standard error of the mean (ddof = 1); NaN with a single session
    pub sem: Vec<f64>,
    /// Trailing epochs discarded from each session, parallel to `labels`
    pub discarded: Vec<usize>,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Writes `epoch,mean,std,sem` rows.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["epoch", "mean", "std", "sem"])?;
        for i in 0..self.len() {
            wtr.write_record([
                i.to_string(),
                self.mean[i].to_string(),
                self.std[i].to_string(),
                self.sem[i].to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Relative band power of one trial, in band-registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialBandPowers {
    /// 1-based position of the source file in sorted order
    pub trial: i64,
    pub label: String,
    pub powers: Vec<f64>,
}

/// External per-trial scores keyed by the `Trial` column.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    /// Score column names in file order, `Trial` excluded
    pub columns: Vec<String>,
    pub rows: Vec<ScoreRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub trial: i64,
    pub values: Vec<f64>,
}

impl ScoreTable {
    pub fn trial_ids(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.trial).collect()
    }

    pub fn row(&self, trial: i64) -> Option<&ScoreRow> {
        self.rows.iter().find(|row| row.trial == trial)
    }
}

/// Band × score matrix of Spearman coefficients.
#[derive(Debug, Clone)]
pub struct CorrelationResult {
    pub bands: Vec<String>,
    pub scores: Vec<String>,
    /// `bands × scores`; NaN where either series has zero variance
    pub matrix: Array2<f64>,
    pub matched_trials: Vec<i64>,
    /// Trials with band powers but no score row
    pub unmatched_band_trials: Vec<i64>,
    /// Trials with a score row but no band powers
    pub unmatched_score_trials: Vec<i64>,
}

impl CorrelationResult {
    pub fn get(&self, band: &str, score: &str) -> Option<f64> {
        let row = self.bands.iter().position(|b| b == band)?;
        let col = self.scores.iter().position(|s| s == score)?;
        Some(self.matrix[[row, col]])
    }

    /// Writes one row per band with a leading `band` column.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["band".to_string()];
        header.extend(self.scores.iter().cloned());
        wtr.write_record(&header)?;
        for (i, band) in self.bands.iter().enumerate() {
            let mut record = vec![band.clone()];
            record.extend(self.matrix.row(i).iter().map(|r| r.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// A sensor projected onto the 2-D head plane with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorValue {
    pub channel: String,
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

/// Interpolated scalar field over the head plane.
///
/// `grid[[row, col]]` is the value at cell centre
/// `(coord(col), coord(row))`; rows run from `-extent` (back of the head)
/// to `+extent` (nose). Cells outside the disk of radius `extent` are NaN.
#[derive(Debug, Clone)]
pub struct TopomapField {
    pub sensors: Vec<SensorValue>,
    pub head_radius: f64,
    pub extent: f64,
    pub grid: Array2<f64>,
}

impl TopomapField {
    pub fn resolution(&self) -> usize {
        self.grid.nrows()
    }

    /// Centre coordinate of grid cell `index` along either axis
    pub fn coord(&self, index: usize) -> f64 {
        let step = 2.0 * self.extent / self.resolution() as f64;
        -self.extent + (index as f64 + 0.5) * step
    }

    /// Writes `channel,x,y,value` rows.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["channel", "x", "y", "value"])?;
        for s in &self.sensors {
            wtr.write_record([
                s.channel.clone(),
                s.x.to_string(),
                s.y.to_string(),
                s.value.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
