//! Reduction of PSD estimates to band power.

use log::warn;
use ndarray::{s, Array2, Axis};

use crate::error::{BandError, Result};
use crate::types::{Band, Psd};

/// Output granularity of [`BandAggregator::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One row per epoch, averaged over channels and in-band bins
    PerEpoch,
    /// One row per channel, averaged over epochs and in-band bins
    PerChannel,
    /// A single row averaged over everything
    Whole,
}

/// Computes band power from a [`Psd`] for an ordered band registry.
///
/// Band power is the mean PSD over the bins inside `[fmin, fmax]`
/// (inclusive). With normalization each row is divided by its sum over all
/// registered bands, so a row of relative powers sums to one; a row whose
/// total is zero (or not finite) becomes all zeros.
///
/// # Examples
///
/// ```rust
/// use eegband::{BandAggregator, default_bands};
///
/// let relative = BandAggregator::normalize(&[3.0, 1.0, 0.0, 0.0]);
/// assert_eq!(relative, vec![0.75, 0.25, 0.0, 0.0]);
/// assert_eq!(BandAggregator::normalize(&[0.0; 4]), vec![0.0; 4]);
///
/// let aggregator = BandAggregator::new(default_bands());
/// assert_eq!(aggregator.band_names(), vec!["Theta", "Alpha", "Beta", "Gamma"]);
/// ```
#[derive(Debug, Clone)]
pub struct BandAggregator {
    bands: Vec<Band>,
}

impl BandAggregator {
    pub fn new(bands: Vec<Band>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn band_index(&self, name: &str) -> Result<usize> {
        self.bands
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| BandError::Config(format!("band '{}' is not registered", name)))
    }

    /// Band power table: rows per `granularity`, one column per band.
    ///
    /// A band without any bin inside the PSD grid yields NaN (absolute) and
    /// drives the row total to NaN, so normalized rows then read all zeros.
    pub fn aggregate(&self, psd: &Psd, granularity: Granularity, normalize: bool) -> Array2<f64> {
        let n_rows = match granularity {
            Granularity::PerEpoch => psd.n_epochs(),
            Granularity::PerChannel => psd.n_channels(),
            Granularity::Whole => 1,
        };
        let mut table = Array2::from_elem((n_rows, self.bands.len()), f64::NAN);

        for (col, band) in self.bands.iter().enumerate() {
            let bins = psd.band_bins(band);
            if bins.is_empty() {
                warn!(
                    "Band {} ({}–{} Hz) has no bins in the PSD grid",
                    band.name, band.fmin, band.fmax
                );
                continue;
            }
            let (first, last) = (bins[0], bins[bins.len() - 1]);
            // 频点按升序排列，带内频点连续
            let block = psd.power.slice(s![.., .., first..=last]);

            match granularity {
                Granularity::PerEpoch => {
                    for (row, epoch) in block.axis_iter(Axis(0)).enumerate() {
                        table[[row, col]] = epoch.mean().unwrap_or(f64::NAN);
                    }
                }
                Granularity::PerChannel => {
                    for (row, channel) in block.axis_iter(Axis(1)).enumerate() {
                        table[[row, col]] = channel.mean().unwrap_or(f64::NAN);
                    }
                }
                Granularity::Whole => {
                    table[[0, col]] = block.mean().unwrap_or(f64::NAN);
                }
            }
        }

        if normalize {
            for mut row in table.rows_mut() {
                let relative = Self::normalize(&row.to_vec());
                row.iter_mut().zip(relative).for_each(|(dst, v)| *dst = v);
            }
        }
        table
    }

    /// One value per epoch for a single band.
    pub fn band_series(&self, psd: &Psd, band: &str, normalize: bool) -> Result<Vec<f64>> {
        let col = self.band_index(band)?;
        let table = self.aggregate(psd, Granularity::PerEpoch, normalize);
        Ok(table.column(col).to_vec())
    }

    /// Relative powers; all zero when the total is not a positive finite number.
    pub fn normalize(powers: &[f64]) -> Vec<f64> {
        let total: f64 = powers.iter().sum();
        if total > 0.0 && total.is_finite() {
            powers.iter().map(|p| p / total).collect()
        } else {
            vec![0.0; powers.len()]
        }
    }
}
