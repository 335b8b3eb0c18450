//! Sensor projection and scalp-map interpolation.
//!
//! Positions come from a built-in subset of the 10-10 system given as
//! spherical angles (inclination from the vertex, azimuth from the nasion,
//! positive towards the right ear). They are projected azimuthal-equidistantly:
//! the equator (inclination 90°) lands on the head circle, sites below it
//! such as TP9/TP10 land outside.

use std::collections::HashSet;

use log::debug;
use ndarray::Array2;

use crate::config::TopomapConfig;
use crate::error::{BandError, Result};
use crate::types::{SensorValue, TopomapField};

/// Inverse-distance weighting exponent
const IDW_POWER: i32 = 2;

/// Cell centres closer than this to a sensor take its value directly
const COINCIDENT: f64 = 1e-9;

/// (name, inclination°, azimuth°)
const STANDARD_LAYOUT: &[(&str, f64, f64)] = &[
    // 中线
    ("Fpz", 90.0, 0.0),
    ("AFz", 67.5, 0.0),
    ("Fz", 45.0, 0.0),
    ("FCz", 22.5, 0.0),
    ("Cz", 0.0, 0.0),
    ("CPz", 22.5, 180.0),
    ("Pz", 45.0, 180.0),
    ("POz", 67.5, 180.0),
    ("Oz", 90.0, 180.0),
    // 赤道环
    ("Fp1", 90.0, -18.0),
    ("Fp2", 90.0, 18.0),
    ("AF7", 90.0, -36.0),
    ("AF8", 90.0, 36.0),
    ("F7", 90.0, -54.0),
    ("F8", 90.0, 54.0),
    ("FT7", 90.0, -72.0),
    ("FT8", 90.0, 72.0),
    ("T7", 90.0, -90.0),
    ("T8", 90.0, 90.0),
    ("TP7", 90.0, -108.0),
    ("TP8", 90.0, 108.0),
    ("P7", 90.0, -126.0),
    ("P8", 90.0, 126.0),
    ("PO7", 90.0, -144.0),
    ("PO8", 90.0, 144.0),
    ("O1", 90.0, -162.0),
    ("O2", 90.0, 162.0),
    // 赤道以下
    ("FT9", 112.5, -72.0),
    ("FT10", 112.5, 72.0),
    ("T9", 112.5, -90.0),
    ("T10", 112.5, 90.0),
    ("TP9", 112.5, -108.0),
    ("TP10", 112.5, 108.0),
    // 内圈
    ("AF3", 74.0, -23.0),
    ("AF4", 74.0, 23.0),
    ("F3", 60.0, -39.0),
    ("F4", 60.0, 39.0),
    ("FC3", 51.0, -62.0),
    ("FC4", 51.0, 62.0),
    ("C3", 45.0, -90.0),
    ("C4", 45.0, 90.0),
    ("CP3", 51.0, -118.0),
    ("CP4", 51.0, 118.0),
    ("P3", 60.0, -141.0),
    ("P4", 60.0, 141.0),
    ("PO3", 74.0, -157.0),
    ("PO4", 74.0, 157.0),
    // 10-20 旧命名
    ("T3", 90.0, -90.0),
    ("T4", 90.0, 90.0),
    ("T5", 90.0, -126.0),
    ("T6", 90.0, 126.0),
];

/// Projects per-channel values onto the head plane and interpolates them.
///
/// # Examples
///
/// ```rust
/// use eegband::TopomapProjector;
///
/// let projector = TopomapProjector::new(32, 1.0);
/// let channels = ["tp9", "AF7", "AF8", "TP10"].map(String::from);
/// let field = projector.project(&channels, &[1.0, 2.0, 3.0, 4.0])?;
///
/// assert_eq!(field.grid.dim(), (32, 32));
/// assert_eq!(field.sensors[0].channel, "tp9");
/// assert!(field.sensors[0].x < 0.0);
/// // 四角在头部圆盘之外
/// assert!(field.grid[[0, 0]].is_nan());
/// # Ok::<(), eegband::BandError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TopomapProjector {
    resolution: usize,
    head_radius: f64,
}

impl TopomapProjector {
    pub fn new(resolution: usize, head_radius: f64) -> Self {
        Self {
            resolution,
            head_radius,
        }
    }

    pub fn from_config(config: &TopomapConfig) -> Self {
        Self::new(config.resolution, config.head_radius)
    }

    /// 2-D head-plane position of `channel` (x to the right ear, y to the nose).
    pub fn position(&self, channel: &str) -> Result<(f64, f64)> {
        let &(_, inclination, azimuth) = STANDARD_LAYOUT
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(channel))
            .ok_or_else(|| BandError::UnknownChannel(channel.to_string()))?;
        let r = inclination / 90.0 * self.head_radius;
        let az = azimuth.to_radians();
        Ok((r * az.sin(), r * az.cos()))
    }

    /// Builds the sensor list and the interpolated grid.
    ///
    /// # Errors
    ///
    /// * [`BandError::UnknownChannel`] - a channel is not in the layout
    /// * [`BandError::Config`] - duplicate channels or mismatched lengths
    /// * [`BandError::EmptyData`] - no channels
    pub fn project(&self, channels: &[String], values: &[f64]) -> Result<TopomapField> {
        if channels.len() != values.len() {
            return Err(BandError::Config(format!(
                "{} channels but {} values",
                channels.len(),
                values.len()
            )));
        }
        if channels.is_empty() {
            return Err(BandError::EmptyData("no channels to project".to_string()));
        }
        if self.resolution == 0 || !(self.head_radius > 0.0) {
            return Err(BandError::Config(
                "topomap resolution and head radius must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut sensors = Vec::with_capacity(channels.len());
        for (channel, &value) in channels.iter().zip(values) {
            if !seen.insert(channel.to_ascii_lowercase()) {
                return Err(BandError::Config(format!("channel '{}' listed twice", channel)));
            }
            let (x, y) = self.position(channel)?;
            sensors.push(SensorValue {
                channel: channel.clone(),
                x,
                y,
                value,
            });
        }

        let outermost = sensors
            .iter()
            .map(|s| s.x.hypot(s.y))
            .fold(0.0f64, f64::max);
        let extent = self.head_radius.max(outermost);
        let grid = self.interpolate(&sensors, extent);

        debug!(
            "Projected {} sensors onto a {}x{} grid, extent {:.3}",
            sensors.len(),
            self.resolution,
            self.resolution,
            extent
        );
        Ok(TopomapField {
            sensors,
            head_radius: self.head_radius,
            extent,
            grid,
        })
    }

    fn interpolate(&self, sensors: &[SensorValue], extent: f64) -> Array2<f64> {
        let res = self.resolution;
        let step = 2.0 * extent / res as f64;
        let centre = |i: usize| -extent + (i as f64 + 0.5) * step;
        let usable: Vec<&SensorValue> = sensors.iter().filter(|s| s.value.is_finite()).collect();

        Array2::from_shape_fn((res, res), |(row, col)| {
            let (x, y) = (centre(col), centre(row));
            if x.hypot(y) > extent {
                return f64::NAN;
            }
            let mut sum_weights = 0.0;
            let mut sum_values = 0.0;
            for s in &usable {
                let dist = (x - s.x).hypot(y - s.y);
                if dist < COINCIDENT {
                    return s.value;
                }
                let weight = 1.0 / dist.powi(IDW_POWER);
                sum_weights += weight;
                sum_values += weight * s.value;
            }
            if sum_weights > 0.0 {
                sum_values / sum_weights
            } else {
                f64::NAN
            }
        })
    }
}
