// Internal utilities for documentation tests
// Writes small synthetic Muse exports for doctests and unit tests

use std::f64::consts::PI;
use std::path::Path;

use chrono::{Duration, NaiveDate};

use crate::{Result, MUSE_CHANNELS};

/// A dropout row (one channel reading 0) is inserted after every this many samples
pub const DROPOUT_EVERY: usize = 97;

/// Writes a Muse-style export whose four channels carry `f(channel, t)` µV.
///
/// Columns are `TimeStamp,TP9,AF7,AF8,TP10,Battery`. Dropout rows repeat
/// the previous timestamp and do not advance time, so removing them leaves
/// an uninterrupted signal.
pub fn write_recording<P, F>(path: P, sfreq: f64, seconds: f64, f: F) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(usize, f64) -> f64,
{
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    let mut header = vec!["TimeStamp"];
    header.extend(MUSE_CHANNELS);
    header.push("Battery");
    wtr.write_record(&header)?;

    let start = NaiveDate::from_ymd_opt(2025, 5, 3)
        .and_then(|d| d.and_hms_milli_opt(22, 5, 3, 0))
        .unwrap_or_default();
    let n_samples = (seconds * sfreq).round() as usize;

    for i in 0..n_samples {
        let t = i as f64 / sfreq;
        let stamp = start + Duration::microseconds((t * 1e6).round() as i64);
        let stamp = stamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let mut record = vec![stamp.clone()];
        record.extend((0..MUSE_CHANNELS.len()).map(|ch| format!("{:.6}", f(ch, t))));
        record.push("87.5".to_string());
        wtr.write_record(&record)?;

        if i % DROPOUT_EVERY == DROPOUT_EVERY - 1 {
            let mut dropout = vec![stamp];
            dropout.extend((0..MUSE_CHANNELS.len()).map(|ch| if ch == 1 { "0".to_string() } else { "812.0".to_string() }));
            dropout.push("87.5".to_string());
            wtr.write_record(&dropout)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a recording where every channel is an 800 µV offset plus a
/// 50 µV sinusoid at `freq_hz`, phase-shifted per channel.
pub fn write_sine_recording<P: AsRef<Path>>(path: P, freq_hz: f64, seconds: f64, sfreq: f64) -> Result<()> {
    write_recording(path, sfreq, seconds, |ch, t| {
        800.0 + 50.0 * (2.0 * PI * freq_hz * t + ch as f64 * PI / 4.0).sin()
    })
}
