//! Band power versus external score correlation.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use log::{info, warn};
use ndarray::Array2;

use crate::error::{BandError, Result};
use crate::types::{CorrelationResult, ScoreRow, ScoreTable, TrialBandPowers};
use crate::utils::spearman;

/// Name of the join column in score files
pub const TRIAL_COLUMN: &str = "Trial";

impl ScoreTable {
    /// Loads a score table, choosing the parser from the file extension:
    /// `xlsx`, `xlsm`, `xls`, `xlsb` and `ods` are read as spreadsheets (first
    /// worksheet), anything else as comma-separated text.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let table = match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Self::from_spreadsheet(path)?,
            _ => Self::from_csv_reader(File::open(path)?, path)?,
        };
        info!(
            "Loaded {} score rows with columns {:?} from {}",
            table.rows.len(),
            table.columns,
            path.display()
        );
        Ok(table)
    }

    /// Parses comma-separated scores with a header row.
    pub fn from_csv_reader<R: Read>(reader: R, path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let mut cells = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row: Vec<String> = (0..headers.len())
                .map(|i| record.get(i).unwrap_or("").to_string())
                .collect();
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            cells.push(row);
        }
        Self::from_cells(&headers, &cells, path)
    }

    /// Reads the first worksheet of a spreadsheet file.
    pub fn from_spreadsheet(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path).map_err(|e| BandError::Spreadsheet(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| BandError::Spreadsheet(format!("{}: workbook has no sheets", path.display())))?
            .map_err(|e| BandError::Spreadsheet(e.to_string()))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(cell_text).collect(),
            None => {
                return Err(BandError::EmptyData(format!(
                    "{}: worksheet is empty",
                    path.display()
                )))
            }
        };
        let cells: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
            .collect();
        Self::from_cells(&headers, &cells, path)
    }

    fn from_cells(headers: &[String], cells: &[Vec<String>], path: &Path) -> Result<Self> {
        let trial_idx = headers
            .iter()
            .position(|h| h.trim() == TRIAL_COLUMN)
            .ok_or_else(|| BandError::Schema {
                path: path.to_path_buf(),
                missing: vec![TRIAL_COLUMN.to_string()],
            })?;
        let score_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != trial_idx && !headers[i].trim().is_empty())
            .collect();
        let columns: Vec<String> = score_idx.iter().map(|&i| headers[i].trim().to_string()).collect();

        let parse_err = |row: usize, col: usize, value: &str| BandError::Parse {
            path: path.to_path_buf(),
            row,
            column: headers[col].clone(),
            value: value.to_string(),
        };

        let mut rows = Vec::with_capacity(cells.len());
        let mut seen = BTreeSet::new();
        for (i, row) in cells.iter().enumerate() {
            // 表头占第 1 行
            let line = i + 2;
            let raw_trial = row.get(trial_idx).map(String::as_str).unwrap_or("").trim();
            let trial = parse_trial(raw_trial).ok_or_else(|| parse_err(line, trial_idx, raw_trial))?;
            // trial id 必须唯一
            if !seen.insert(trial) {
                return Err(parse_err(line, trial_idx, raw_trial));
            }

            let mut values = Vec::with_capacity(score_idx.len());
            for &col in &score_idx {
                let raw = row.get(col).map(String::as_str).unwrap_or("").trim();
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| parse_err(line, col, raw))?;
                values.push(value);
            }
            rows.push(ScoreRow { trial, values });
        }

        Ok(Self { columns, rows })
    }
}

/// Integer trial id; spreadsheets often store integers as `3.0`.
fn parse_trial(raw: &str) -> Option<i64> {
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value.is_finite() {
        Some(value as i64)
    } else {
        None
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Spearman correlation of every band against every score column.
///
/// Band powers and scores are inner-joined on the trial id. Trials present
/// on only one side are dropped; they are logged and reported in the
/// result. A coefficient is NaN when either joined series is constant or
/// fewer than two trials match.
///
/// # Errors
///
/// [`BandError::JoinMismatch`] when no trial id appears on both sides.
///
/// # Examples
///
/// ```rust
/// use eegband::{correlate, ScoreRow, ScoreTable, TrialBandPowers};
///
/// let trials: Vec<TrialBandPowers> = (1..=4)
///     .map(|t| TrialBandPowers {
///         trial: t,
///         label: format!("trial{}", t),
///         powers: vec![t as f64 / 10.0, 1.0 - t as f64 / 10.0],
///     })
///     .collect();
/// let scores = ScoreTable {
///     columns: vec!["Focus".to_string()],
///     rows: (1..=4).map(|t| ScoreRow { trial: t, values: vec![t as f64 * 2.0] }).collect(),
/// };
///
/// let bands = vec!["Theta".to_string(), "Alpha".to_string()];
/// let result = correlate(&bands, &trials, &scores)?;
/// assert!((result.get("Theta", "Focus").unwrap() - 1.0).abs() < 1e-12);
/// assert!((result.get("Alpha", "Focus").unwrap() + 1.0).abs() < 1e-12);
/// # Ok::<(), eegband::BandError>(())
/// ```
pub fn correlate(bands: &[String], trials: &[TrialBandPowers], scores: &ScoreTable) -> Result<CorrelationResult> {
    let band_ids: BTreeSet<i64> = trials.iter().map(|t| t.trial).collect();
    let score_ids: BTreeSet<i64> = scores.rows.iter().map(|r| r.trial).collect();

    let matched: Vec<i64> = band_ids.intersection(&score_ids).copied().collect();
    let unmatched_band_trials: Vec<i64> = band_ids.difference(&score_ids).copied().collect();
    let unmatched_score_trials: Vec<i64> = score_ids.difference(&band_ids).copied().collect();

    if matched.is_empty() {
        return Err(BandError::JoinMismatch {
            bands: band_ids.into_iter().collect(),
            scores: score_ids.into_iter().collect(),
        });
    }
    if !unmatched_band_trials.is_empty() || !unmatched_score_trials.is_empty() {
        warn!(
            "Join on {} dropped {} band-power trial(s) {:?} and {} score row(s) {:?}",
            TRIAL_COLUMN,
            unmatched_band_trials.len(),
            unmatched_band_trials,
            unmatched_score_trials.len(),
            unmatched_score_trials
        );
    }

    // 按 trial id 升序取出配对后的两侧数据
    let mut band_columns = vec![Vec::with_capacity(matched.len()); bands.len()];
    let mut score_columns = vec![Vec::with_capacity(matched.len()); scores.columns.len()];
    for &id in &matched {
        let trial = trials
            .iter()
            .find(|t| t.trial == id)
            .ok_or_else(|| BandError::JoinMismatch { bands: vec![id], scores: vec![] })?;
        let row = scores
            .row(id)
            .ok_or_else(|| BandError::JoinMismatch { bands: vec![], scores: vec![id] })?;
        for (b, column) in band_columns.iter_mut().enumerate() {
            column.push(trial.powers.get(b).copied().unwrap_or(f64::NAN));
        }
        for (s, column) in score_columns.iter_mut().enumerate() {
            column.push(row.values.get(s).copied().unwrap_or(f64::NAN));
        }
    }

    let mut matrix = Array2::from_elem((bands.len(), scores.columns.len()), f64::NAN);
    for (b, band_values) in band_columns.iter().enumerate() {
        for (s, score_values) in score_columns.iter().enumerate() {
            matrix[[b, s]] = spearman(band_values, score_values);
        }
    }

    info!(
        "Correlated {} bands with {} score columns over {} trials",
        bands.len(),
        scores.columns.len(),
        matched.len()
    );

    Ok(CorrelationResult {
        bands: bands.to_vec(),
        scores: scores.columns.clone(),
        matrix,
        matched_trials: matched,
        unmatched_band_trials,
        unmatched_score_trials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn trials(powers: &[(i64, [f64; 2])]) -> Vec<TrialBandPowers> {
        powers
            .iter()
            .map(|(t, p)| TrialBandPowers {
                trial: *t,
                label: format!("t{}", t),
                powers: p.to_vec(),
            })
            .collect()
    }

    fn bands() -> Vec<String> {
        vec!["Theta".to_string(), "Alpha".to_string()]
    }

    fn scores_from(text: &str) -> Result<ScoreTable> {
        ScoreTable::from_csv_reader(Cursor::new(text.as_bytes()), Path::new("scores.csv"))
    }

    #[test]
    fn test_csv_scores_parse() {
        let table = scores_from("Trial,Focus,Effort\n1,3,4.5\n2,5,2\n\n3.0,1,1\n").unwrap();
        assert_eq!(table.columns, vec!["Focus", "Effort"]);
        assert_eq!(table.trial_ids(), vec![1, 2, 3]);
        assert_eq!(table.row(1).unwrap().values, vec![3.0, 4.5]);
    }

    #[test]
    fn test_trial_column_may_be_anywhere() {
        let table = scores_from("Focus,Trial\n7,2\n").unwrap();
        assert_eq!(table.columns, vec!["Focus"]);
        assert_eq!(table.rows[0], ScoreRow { trial: 2, values: vec![7.0] });
    }

    #[test]
    fn test_missing_trial_column() {
        let err = scores_from("trial,Focus\n1,2\n").unwrap_err();
        match err {
            BandError::Schema { missing, .. } => assert_eq!(missing, vec!["Trial"]),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_score_is_rejected() {
        let err = scores_from("Trial,Focus\n1,high\n").unwrap_err();
        assert!(matches!(err, BandError::Parse { row: 2, .. }));
        let err = scores_from("Trial,Focus\n1.5,3\n").unwrap_err();
        assert!(matches!(err, BandError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_trial_is_rejected() {
        match scores_from("Trial,Focus\n1,3\n2,4\n1,5\n").unwrap_err() {
            BandError::Parse { row, column, value, .. } => {
                assert_eq!(row, 4);
                assert_eq!(column, "Trial");
                assert_eq!(value, "1");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        // 3 与 3.0 是同一个 trial
        assert!(scores_from("Trial,Focus\n3,1\n3.0,2\n").is_err());
        assert!(scores_from("Trial,Focus\n1,NaN\n").is_err());
    }

    #[test]
    fn test_band_without_power_correlates_as_nan() {
        let trials = trials(&[
            (1, [0.1, f64::NAN]),
            (2, [0.2, f64::NAN]),
            (3, [0.3, f64::NAN]),
            (4, [0.4, f64::NAN]),
        ]);
        let scores = scores_from("Trial,Focus\n1,1\n2,2\n3,3\n4,4\n").unwrap();
        let result = correlate(&bands(), &trials, &scores).unwrap();
        assert_relative_eq!(result.get("Theta", "Focus").unwrap(), 1.0, epsilon = 1e-12);
        assert!(result.get("Alpha", "Focus").unwrap().is_nan());
    }

    #[test]
    fn test_inner_join_reports_drops() {
        let trials = trials(&[(1, [0.1, 0.9]), (2, [0.2, 0.7]), (3, [0.3, 0.8]), (5, [0.5, 0.5])]);
        let scores = scores_from("Trial,Focus\n1,10\n2,20\n3,30\n4,40\n").unwrap();
        let result = correlate(&bands(), &trials, &scores).unwrap();

        assert_eq!(result.matched_trials, vec![1, 2, 3]);
        assert_eq!(result.unmatched_band_trials, vec![5]);
        assert_eq!(result.unmatched_score_trials, vec![4]);
        assert_relative_eq!(result.get("Theta", "Focus").unwrap(), 1.0, epsilon = 1e-12);
        // Alpha: 0.9, 0.7, 0.8 → 秩 3, 1, 2 与 1, 2, 3 → ρ = -0.5
        assert_relative_eq!(result.get("Alpha", "Focus").unwrap(), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_series_is_nan() {
        let trials = trials(&[(1, [0.25, 0.1]), (2, [0.25, 0.2]), (3, [0.25, 0.3])]);
        let scores = scores_from("Trial,Focus,Flat\n1,1,5\n2,2,5\n3,3,5\n").unwrap();
        let result = correlate(&bands(), &trials, &scores).unwrap();

        assert!(result.get("Theta", "Focus").unwrap().is_nan());
        assert!(result.get("Alpha", "Flat").unwrap().is_nan());
        assert_relative_eq!(result.get("Alpha", "Focus").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_overlap_is_join_mismatch() {
        let trials = trials(&[(1, [0.1, 0.9])]);
        let scores = scores_from("Trial,Focus\n7,1\n").unwrap();
        match correlate(&bands(), &trials, &scores) {
            Err(BandError::JoinMismatch { bands, scores }) => {
                assert_eq!(bands, vec![1]);
                assert_eq!(scores, vec![7]);
            }
            other => panic!("expected join mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_result_csv_layout() {
        let trials = trials(&[(1, [0.1, 0.9]), (2, [0.2, 0.8])]);
        let scores = scores_from("Trial,Focus\n1,1\n2,2\n").unwrap();
        let result = correlate(&bands(), &trials, &scores).unwrap();

        let mut out = Vec::new();
        result.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "band,Focus");
        assert!(lines[1].starts_with("Theta,"));
        assert!(lines[2].starts_with("Alpha,"));
    }

    #[test]
    fn test_unsupported_spreadsheet_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(ScoreTable::from_path(&path), Err(BandError::Spreadsheet(_))));
    }
}
