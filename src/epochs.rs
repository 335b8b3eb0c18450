use log::debug;
use ndarray::{s, Array2, Array3};

use crate::error::{BandError, Result};

/// Cuts `data` (`channels × samples`) into consecutive, non-overlapping
/// epochs of `duration` seconds, starting at sample 0.
///
/// The trailing remainder shorter than one epoch is discarded. Returns
/// `epochs × channels × samples_per_epoch`.
///
/// # Errors
///
/// * [`BandError::Config`] - `duration * sfreq` rounds to zero samples
/// * [`BandError::EmptyData`] - the signal is shorter than one epoch
///
/// # Examples
///
/// ```rust
/// use eegband::epochs::make_fixed_length_epochs;
/// use ndarray::Array2;
///
/// let data = Array2::<f64>::ones((4, 2_600));
/// let epochs = make_fixed_length_epochs(&data, 256.0, 1.0)?;
/// assert_eq!(epochs.dim(), (10, 4, 256));
/// # Ok::<(), eegband::BandError>(())
/// ```
pub fn make_fixed_length_epochs(data: &Array2<f64>, sfreq: f64, duration: f64) -> Result<Array3<f64>> {
    let samples_per_epoch = (duration * sfreq).round() as usize;
    if samples_per_epoch == 0 {
        return Err(BandError::Config(format!(
            "epoch duration {} s at {} Hz is shorter than one sample",
            duration, sfreq
        )));
    }

    let (n_channels, n_samples) = data.dim();
    let n_epochs = n_samples / samples_per_epoch;
    if n_epochs == 0 {
        return Err(BandError::EmptyData(format!(
            "{} samples do not fill a single {} s epoch ({} samples)",
            n_samples, duration, samples_per_epoch
        )));
    }

    let mut epochs = Array3::zeros((n_epochs, n_channels, samples_per_epoch));
    for i in 0..n_epochs {
        let start = i * samples_per_epoch;
        epochs
            .slice_mut(s![i, .., ..])
            .assign(&data.slice(s![.., start..start + samples_per_epoch]));
    }

    debug!(
        "Epoched {} samples into {} x {} samples, {} discarded",
        n_samples,
        n_epochs,
        samples_per_epoch,
        n_samples - n_epochs * samples_per_epoch
    );
    Ok(epochs)
}
