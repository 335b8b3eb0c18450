//! Welch power spectral density estimation.

use log::{debug, warn};
use ndarray::{s, Array3, ArrayView1, ArrayView3, Axis};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::SpectralConfig;
use crate::error::{BandError, Result};
use crate::types::Psd;

/// Welch estimator: Hamming-windowed, mean-removed segments of `n_fft`
/// samples, one-sided density scaling (`unit² / Hz`), periodograms averaged.
///
/// When a signal is shorter than `n_fft`, the FFT and segment length are
/// reduced to the signal length for that call and a warning is logged. The
/// frequency grid therefore depends only on the input length, so repeated
/// calls with the same input always produce the same bins.
pub struct WelchEstimator {
    n_fft: usize,
    overlap: usize,
    sample_rate: f64,
    fmin: f64,
    fmax: f64,
    planner: FftPlanner<f64>,
}

impl WelchEstimator {
    /// Creates an estimator reporting bins in `[fmin, fmax]`.
    ///
    /// # Arguments
    ///
    /// * `n_fft` - FFT and segment length in samples
    /// * `overlap` - samples shared by consecutive segments, `< n_fft`
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(n_fft: usize, overlap: usize, sample_rate: f64, fmin: f64, fmax: f64) -> Result<Self> {
        if n_fft < 1 || overlap >= n_fft {
            return Err(BandError::Config(format!(
                "invalid Welch parameters: n_fft {}, overlap {}",
                n_fft, overlap
            )));
        }
        Ok(Self {
            n_fft,
            overlap,
            sample_rate,
            fmin,
            fmax,
            planner: FftPlanner::new(),
        })
    }

    pub fn from_config(config: &SpectralConfig, sample_rate: f64) -> Result<Self> {
        Self::new(config.n_fft, config.overlap, sample_rate, config.fmin, config.fmax)
    }

    /// FFT length actually used for a signal of `n_times` samples
    pub fn effective_n_fft(&self, n_times: usize) -> usize {
        self.n_fft.min(n_times)
    }

    /// Reported frequency bins for a given FFT length, ascending
    pub fn frequencies(&self, n_fft: usize) -> Vec<f64> {
        let df = self.sample_rate / n_fft as f64;
        (0..=n_fft / 2)
            .map(|k| k as f64 * df)
            .filter(|&f| f >= self.fmin && f <= self.fmax)
            .collect()
    }

    /// PSD of each epoch (`epochs × channels × samples`), epoch order kept.
    pub fn psd_epochs(&mut self, epochs: &Array3<f64>) -> Result<Psd> {
        self.estimate(epochs.view())
    }

    /// PSD of a whole `channels × samples` signal, stored as one epoch.
    pub fn psd_signal(&mut self, data: &ndarray::Array2<f64>) -> Result<Psd> {
        self.estimate(data.view().insert_axis(Axis(0)))
    }

    fn estimate(&mut self, epochs: ArrayView3<'_, f64>) -> Result<Psd> {
        let (n_epochs, n_channels, n_times) = epochs.dim();
        if n_times == 0 || n_epochs == 0 || n_channels == 0 {
            return Err(BandError::EmptyData(
                "cannot estimate a spectrum from an empty signal".to_string(),
            ));
        }

        let n_fft = self.effective_n_fft(n_times);
        let overlap = if n_fft < self.n_fft {
            warn!(
                "Segment of {} samples is shorter than n_fft {}; using n_fft = {}",
                n_times, self.n_fft, n_fft
            );
            0
        } else {
            self.overlap
        };

        let all_bins = n_fft / 2 + 1;
        let df = self.sample_rate / n_fft as f64;
        let keep: Vec<usize> = (0..all_bins)
            .filter(|&k| {
                let f = k as f64 * df;
                f >= self.fmin && f <= self.fmax
            })
            .collect();
        let freqs: Vec<f64> = keep.iter().map(|&k| k as f64 * df).collect();

        let window = hamming_window(n_fft);
        let mut power = Array3::zeros((n_epochs, n_channels, keep.len()));
        for e in 0..n_epochs {
            for ch in 0..n_channels {
                let spectrum = self.welch(epochs.slice(s![e, ch, ..]), n_fft, overlap, &window);
                for (dst, &k) in keep.iter().enumerate() {
                    power[[e, ch, dst]] = spectrum[k];
                }
            }
        }

        debug!(
            "Welch PSD: {} epochs x {} channels, n_fft {}, {} bins in {}–{} Hz",
            n_epochs,
            n_channels,
            n_fft,
            freqs.len(),
            self.fmin,
            self.fmax
        );
        Ok(Psd { freqs, power })
    }

    /// Full one-sided density spectrum of one channel (`n_fft / 2 + 1` bins).
    fn welch(&mut self, x: ArrayView1<'_, f64>, n_fft: usize, overlap: usize, window: &[f64]) -> Vec<f64> {
        let fft = self.planner.plan_fft_forward(n_fft);
        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let n_bins = n_fft / 2 + 1;
        let mut acc = vec![0.0; n_bins];
        let step = n_fft - overlap;
        let win_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (self.sample_rate * win_power);

        let mut n_segments = 0usize;
        let mut start = 0usize;
        while start + n_fft <= x.len() {
            let segment = x.slice(s![start..start + n_fft]);
            let seg_mean = segment.mean().unwrap_or(0.0);
            for ((dst, &v), &w) in buffer.iter_mut().zip(segment.iter()).zip(window) {
                *dst = Complex::new((v - seg_mean) * w, 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);

            for (k, a) in acc.iter_mut().enumerate() {
                let c = buffer[k];
                *a += (c.re * c.re + c.im * c.im) * scale;
            }
            n_segments += 1;
            start += step;
        }

        // 单边谱：除直流和（偶数长度时的）奈奎斯特频点外均乘 2
        let last_doubled = if n_fft % 2 == 0 { n_bins - 1 } else { n_bins };
        for (k, a) in acc.iter_mut().enumerate() {
            *a /= n_segments as f64;
            if k > 0 && k < last_doubled {
                *a *= 2.0;
            }
        }
        acc
    }
}

/// Periodic Hamming window
fn hamming_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    const FS: f64 = 256.0;

    fn sine_signal(freq: f64, amplitude: f64, n: usize, n_channels: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_channels, n), |(_, i)| {
            amplitude * (2.0 * PI * freq * i as f64 / FS).sin()
        })
    }

    #[test]
    fn test_frequency_grid() {
        let est = WelchEstimator::new(256, 0, FS, 1.0, 50.0).unwrap();
        let freqs = est.frequencies(256);
        assert_eq!(freqs.len(), 50);
        assert_relative_eq!(freqs[0], 1.0);
        assert_relative_eq!(*freqs.last().unwrap(), 50.0);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));

        let freqs = est.frequencies(512);
        assert_eq!(freqs.len(), 99);
    }

    #[test]
    fn test_peak_at_signal_frequency() {
        let mut est = WelchEstimator::new(256, 0, FS, 0.0, 128.0).unwrap();
        let data = sine_signal(10.0, 1.0, 2048, 1);
        let psd = est.psd_signal(&data).unwrap();

        let row = psd.power.slice(s![0, 0, ..]);
        let (peak_idx, _) = row
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        assert_relative_eq!(psd.freqs[peak_idx], 10.0);
    }

    #[test]
    fn test_density_integrates_to_signal_power() {
        // 正弦波功率 A²/2，对密度积分应近似恢复
        let mut est = WelchEstimator::new(256, 0, FS, 0.0, 128.0).unwrap();
        let amplitude = 3.0;
        let data = sine_signal(20.0, amplitude, 256 * 8, 1);
        let psd = est.psd_signal(&data).unwrap();

        let df = FS / 256.0;
        let total: f64 = psd.power.iter().sum::<f64>() * df;
        assert_relative_eq!(total, amplitude * amplitude / 2.0, max_relative = 0.02);
    }

    #[test]
    fn test_epoch_order_preserved() {
        let mut est = WelchEstimator::new(256, 0, FS, 1.0, 50.0).unwrap();
        let mut epochs = Array3::zeros((2, 1, 256));
        for i in 0..256 {
            epochs[[1, 0, i]] = (2.0 * PI * 6.0 * i as f64 / FS).sin();
        }
        let psd = est.psd_epochs(&epochs).unwrap();
        assert_eq!(psd.n_epochs(), 2);
        assert!(psd.power.slice(s![0, 0, ..]).iter().all(|&v| v == 0.0));
        assert!(psd.power.slice(s![1, 0, ..]).iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_short_segment_reduces_n_fft_deterministically() {
        let mut est = WelchEstimator::new(512, 0, FS, 1.0, 50.0).unwrap();
        let data = sine_signal(5.0, 1.0, 256, 2);

        assert_eq!(est.effective_n_fft(256), 256);
        let first = est.psd_signal(&data).unwrap();
        let second = est.psd_signal(&data).unwrap();
        assert_eq!(first.freqs, est.frequencies(256));
        assert_eq!(first.freqs, second.freqs);
        assert_eq!(first.power, second.power);
    }

    #[test]
    fn test_overlap_adds_segments_without_changing_level() {
        let data = sine_signal(12.0, 1.0, 256 * 4, 1);
        let mut plain = WelchEstimator::new(256, 0, FS, 0.0, 128.0).unwrap();
        let mut half = WelchEstimator::new(256, 128, FS, 0.0, 128.0).unwrap();
        let a: f64 = plain.psd_signal(&data).unwrap().power.sum();
        let b: f64 = half.psd_signal(&data).unwrap().power.sum();
        assert_relative_eq!(a, b, max_relative = 0.02);
    }

    #[test]
    fn test_empty_signal_and_bad_parameters() {
        let mut est = WelchEstimator::new(256, 0, FS, 1.0, 50.0).unwrap();
        let empty = Array2::<f64>::zeros((4, 0));
        assert!(matches!(est.psd_signal(&empty), Err(BandError::EmptyData(_))));
        assert!(WelchEstimator::new(256, 256, FS, 1.0, 50.0).is_err());
    }
}
