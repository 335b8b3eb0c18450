use log::debug;

use crate::error::{BandError, Result};
use crate::types::{AlignedSeries, SessionSeries};
use crate::utils::{mean, sem, std_dev};

/// Aligns sessions of possibly different lengths by truncating every series
/// to the shortest one, then computes per-epoch mean, population standard
/// deviation and standard error of the mean across sessions.
///
/// Values beyond the shortest session are discarded, never padded or
/// interpolated.
///
/// # Errors
///
/// [`BandError::EmptyData`] when `sessions` is empty.
///
/// # Examples
///
/// ```rust
/// use eegband::{align_sessions, SessionSeries};
///
/// let aligned = align_sessions(&[
///     SessionSeries::new("a", vec![1.0, 2.0, 3.0, 4.0]),
///     SessionSeries::new("b", vec![3.0, 4.0]),
/// ])?;
/// assert_eq!(aligned.len(), 2);
/// assert_eq!(aligned.mean, vec![2.0, 3.0]);
/// assert_eq!(aligned.std, vec![1.0, 1.0]);
/// assert_eq!(aligned.discarded, vec![2, 0]);
/// # Ok::<(), eegband::BandError>(())
/// ```
pub fn align_sessions(sessions: &[SessionSeries]) -> Result<AlignedSeries> {
    let min_len = sessions
        .iter()
        .map(SessionSeries::len)
        .min()
        .ok_or_else(|| BandError::EmptyData("no sessions to align".to_string()))?;

    let mut mean_values = Vec::with_capacity(min_len);
    let mut std_values = Vec::with_capacity(min_len);
    let mut sem_values = Vec::with_capacity(min_len);
    let mut column = Vec::with_capacity(sessions.len());

    for i in 0..min_len {
        column.clear();
        column.extend(sessions.iter().map(|s| s.values[i]));
        mean_values.push(mean(&column));
        std_values.push(std_dev(&column, 0));
        sem_values.push(sem(&column));
    }

    let discarded: Vec<usize> = sessions.iter().map(|s| s.len() - min_len).collect();
    for (session, &dropped) in sessions.iter().zip(&discarded) {
        if dropped > 0 {
            debug!(
                "Session {}: {} trailing epochs discarded to align at {}",
                session.label, dropped, min_len
            );
        }
    }

    Ok(AlignedSeries {
        labels: sessions.iter().map(|s| s.label.clone()).collect(),
        mean: mean_values,
        std: std_values,
        sem: sem_values,
        discarded,
    })
}
