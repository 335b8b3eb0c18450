use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info};
use ndarray::Array2;

use crate::config::AnalysisConfig;
use crate::error::{BandError, Result};
use crate::types::Recording;
use crate::utils::file_label;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Reads channel-per-column recordings and removes dropout rows.
///
/// A row is treated as a sensor dropout when any required channel reads
/// exactly `0`; the whole row is removed. Surviving samples are divided by
/// the rescale divisor.
///
/// # Examples
///
/// ```rust
/// use eegband::{AnalysisConfig, SignalLoader};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("session.csv");
/// # eegband::doctest_utils::write_sine_recording(&path, 5.0, 4.0, 256.0)?;
/// let loader = SignalLoader::from_config(&AnalysisConfig::time_course());
/// let recording = loader.load(&path)?;
///
/// assert_eq!(recording.ch_names, vec!["TP9", "AF7", "AF8", "TP10"]);
/// assert_eq!(recording.n_samples() + recording.rows_dropped, recording.rows_read);
/// assert!(recording.data.iter().all(|&v| v != 0.0));
/// # Ok::<(), eegband::BandError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SignalLoader {
    channels: Vec<String>,
    sfreq: f64,
    delimiter: u8,
    rescale_divisor: f64,
    timestamp_column: Option<String>,
}

impl SignalLoader {
    pub fn new(channels: &[String], sfreq: f64) -> Self {
        Self {
            channels: channels.to_vec(),
            sfreq,
            delimiter: b',',
            rescale_divisor: 1.0,
            timestamp_column: None,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            channels: config.channels.clone(),
            sfreq: config.sampling_rate,
            delimiter: config.delimiter as u8,
            rescale_divisor: config.rescale_divisor,
            timestamp_column: config.timestamp_column.clone(),
        }
    }

    pub fn with_rescale_divisor(mut self, divisor: f64) -> Self {
        self.rescale_divisor = divisor;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = Some(column.into());
        self
    }

    /// Opens and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// * [`BandError::Io`] - the file cannot be opened
    /// * [`BandError::Schema`] - one or more required channel columns are absent
    /// * [`BandError::Parse`] - a required cell is empty or not a number
    /// * [`BandError::EmptyData`] - every row was a dropout row
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Recording> {
        let path = path.as_ref();
        let file = File::open(path)?;
        self.load_from_reader(file, path)
    }

    /// Parses a recording from any reader; `path` is used for labels and
    /// error messages only.
    pub fn load_from_reader<R: Read>(&self, reader: R, path: &Path) -> Result<Recording> {
        if self.channels.is_empty() {
            return Err(BandError::Config("no channels to load".to_string()));
        }
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut columns = Vec::with_capacity(self.channels.len());
        let mut missing = Vec::new();
        for ch in &self.channels {
            match headers.iter().position(|h| h == ch.as_str()) {
                Some(idx) => columns.push(idx),
                None => missing.push(ch.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(BandError::Schema {
                path: path.to_path_buf(),
                missing,
            });
        }
        let ts_column = self
            .timestamp_column
            .as_ref()
            .and_then(|name| headers.iter().position(|h| h == name.as_str()));

        let mut samples: Vec<Vec<f64>> = vec![Vec::new(); self.channels.len()];
        let mut rows_read = 0usize;
        let mut rows_dropped = 0usize;
        let mut first_timestamp = None;
        let mut last_timestamp = None;
        let mut row_values = vec![0.0; self.channels.len()];

        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            rows_read += 1;

            for (slot, (&col, ch)) in row_values.iter_mut().zip(columns.iter().zip(&self.channels)) {
                let raw = record.get(col).unwrap_or("").trim();
                // NaN / inf 也视为格式错误
                *slot = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| BandError::Parse {
                        path: path.to_path_buf(),
                        // 表头占第 1 行
                        row: row_idx + 2,
                        column: ch.clone(),
                        value: raw.to_string(),
                    })?;
            }

            if row_values.iter().any(|&v| v == 0.0) {
                rows_dropped += 1;
                continue;
            }

            for (channel, &v) in samples.iter_mut().zip(&row_values) {
                channel.push(v / self.rescale_divisor);
            }

            if let Some(col) = ts_column {
                let raw = record.get(col).unwrap_or("");
                match parse_timestamp(raw) {
                    Some(ts) => {
                        if first_timestamp.is_none() {
                            first_timestamp = Some(ts);
                        }
                        last_timestamp = Some(ts);
                    }
                    None => debug!("{}: unparsable timestamp '{}' in row {}", path.display(), raw, row_idx + 2),
                }
            }
        }

        let n_samples = samples[0].len();
        if n_samples == 0 {
            return Err(BandError::EmptyData(format!(
                "{}: no valid rows ({} read, {} dropped as zero-valued)",
                path.display(),
                rows_read,
                rows_dropped
            )));
        }

        let flat: Vec<f64> = samples.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((self.channels.len(), n_samples), flat)
            .map_err(|e| BandError::EmptyData(e.to_string()))?;

        info!(
            "Loaded {}: {} rows, {} dropped, {:.1} s at {} Hz",
            path.display(),
            rows_read,
            rows_dropped,
            n_samples as f64 / self.sfreq,
            self.sfreq
        );

        Ok(Recording {
            label: file_label(path),
            ch_names: self.channels.clone(),
            sfreq: self.sfreq,
            data,
            rows_read,
            rows_dropped,
            first_timestamp,
            last_timestamp,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn muse_channels() -> Vec<String> {
        crate::MUSE_CHANNELS.iter().map(|s| s.to_string()).collect()
    }

    fn load_str(loader: &SignalLoader, text: &str) -> Result<Recording> {
        loader.load_from_reader(Cursor::new(text.as_bytes()), Path::new("mem.csv"))
    }

    #[test]
    fn test_drops_rows_with_any_zero_channel() {
        let text = "\
TimeStamp,TP9,AF7,AF8,TP10,Extra
2025-05-03 10:00:00.000,1,2,3,4,x
2025-05-03 10:00:00.004,0,2,3,4,x
2025-05-03 10:00:00.008,5,6,0,8,x
2025-05-03 10:00:00.012,9,10,11,12,x
";
        let loader = SignalLoader::new(&muse_channels(), 256.0).with_timestamp_column("TimeStamp");
        let rec = load_str(&loader, text).unwrap();

        assert_eq!(rec.rows_read, 4);
        assert_eq!(rec.rows_dropped, 2);
        assert_eq!(rec.n_samples(), 2);
        assert_eq!(rec.data.row(0).to_vec(), vec![1.0, 9.0]);
        assert_eq!(rec.data.row(3).to_vec(), vec![4.0, 12.0]);
        assert!(rec.data.iter().all(|&v| v != 0.0));
        assert_eq!(rec.label, "mem");
        assert!((rec.wall_clock_secs().unwrap() - 0.012).abs() < 1e-9);
    }

    #[test]
    fn test_channel_order_follows_configuration() {
        let text = "AF8,TP10,TP9,AF7\n3,4,1,2\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        let rec = load_str(&loader, text).unwrap();
        assert_eq!(rec.data.column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rec.channel_index("AF8"), Some(2));
    }

    #[test]
    fn test_missing_columns_are_all_reported() {
        let text = "TP9,AF8\n1,2\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        match load_str(&loader, text) {
            Err(BandError::Schema { missing, .. }) => {
                assert_eq!(missing, vec!["AF7".to_string(), "TP10".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_zero_rows_is_empty_data() {
        let text = "TP9,AF7,AF8,TP10\n0,0,0,0\n1,0,1,1\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        assert!(matches!(load_str(&loader, text), Err(BandError::EmptyData(_))));
    }

    #[test]
    fn test_malformed_cell_fails_loudly() {
        let text = "TP9,AF7,AF8,TP10\n1,2,3,4\n1,abc,3,4\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        match load_str(&loader, text) {
            Err(BandError::Parse { row, column, value, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(column, "AF7");
                assert_eq!(value, "abc");
            }
            other => panic!("expected parse error, got {:?}", other),
        }

        // 缺失单元格同样视为错误
        let text = "TP9,AF7,AF8,TP10\n1,2,3\n";
        assert!(matches!(load_str(&loader, text), Err(BandError::Parse { .. })));
    }

    #[test]
    fn test_non_finite_cells_fail_loudly() {
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        for bad in ["NaN", "inf", "-inf"] {
            let text = format!("TP9,AF7,AF8,TP10\n1,2,3,4\n{},2,3,4\n", bad);
            match load_str(&loader, &text) {
                Err(BandError::Parse { row, column, value, .. }) => {
                    assert_eq!(row, 3);
                    assert_eq!(column, "TP9");
                    assert_eq!(value, bad);
                }
                other => panic!("expected parse error for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_rescale_and_delimiter() {
        let text = "TP9;AF7;AF8;TP10\n100;200;-300;400\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0)
            .with_delimiter(b';')
            .with_rescale_divisor(100.0);
        let rec = load_str(&loader, text).unwrap();
        assert_eq!(rec.data.column(0).to_vec(), vec![1.0, 2.0, -3.0, 4.0]);
    }

    #[test]
    fn test_bad_timestamps_are_ignored() {
        let text = "TimeStamp,TP9,AF7,AF8,TP10\nnot-a-time,1,2,3,4\n";
        let loader = SignalLoader::new(&muse_channels(), 256.0).with_timestamp_column("TimeStamp");
        let rec = load_str(&loader, text).unwrap();
        assert!(rec.first_timestamp.is_none());
        assert!(rec.wall_clock_secs().is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = SignalLoader::new(&muse_channels(), 256.0);
        assert!(matches!(loader.load("/definitely/not/here.csv"), Err(BandError::Io(_))));
    }
}
