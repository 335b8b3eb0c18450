use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BandError {
    #[error("{}: missing required column(s): {}", path.display(), missing.join(", "))]
    Schema { path: PathBuf, missing: Vec<String> },

    #[error("No usable data: {0}")]
    EmptyData(String),

    #[error("Channel '{0}' is not part of the standard sensor layout")]
    UnknownChannel(String),

    #[error("No overlapping trial ids between band powers {bands:?} and scores {scores:?}")]
    JoinMismatch { bands: Vec<i64>, scores: Vec<i64> },

    #[error("{}: row {row}, column '{column}': cannot parse '{value}' as a number", path.display())]
    Parse {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Rendering failed: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, BandError>;
