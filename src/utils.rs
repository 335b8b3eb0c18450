use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayView1;

use crate::error::Result;

/// 算术平均；空输入返回 NaN
pub fn mean(values: &[f64]) -> f64 {
    ArrayView1::from(values).mean().unwrap_or(f64::NAN)
}

/// Standard deviation with `ddof` delta degrees of freedom.
///
/// Returns NaN when `values.len() <= ddof`.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    ArrayView1::from(values).std(ddof as f64)
}

/// Standard error of the mean (sample standard deviation over √n).
pub fn sem(values: &[f64]) -> f64 {
    std_dev(values, 1) / (values.len() as f64).sqrt()
}

/// Fractional ranks (1-based); tied values share the mean of their ranks.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 位置 i..=j 的秩为 i+1..=j+1，取平均
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = shared;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; NaN if lengths differ, fewer than two points, or
/// either series has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Spearman rank correlation: Pearson correlation of the fractional ranks.
///
/// NaN propagates: any non-finite value in either series gives NaN.
///
/// ```rust
/// use eegband::utils::spearman;
///
/// let x = [1.0, 2.0, 3.0, 4.0];
/// assert!((spearman(&x, &[10.0, 20.0, 25.0, 80.0]) - 1.0).abs() < 1e-12);
/// assert!((spearman(&x, &[4.0, 3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
/// assert!(spearman(&x, &[5.0; 4]).is_nan());
/// assert!(spearman(&x, &[0.1, f64::NAN, 0.3, 0.4]).is_nan());
/// ```
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.iter().chain(y).any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    pearson(&rank_average(x), &rank_average(y))
}

/// Files in `dir` whose extension matches `extension` (case-insensitive),
/// sorted by file name.
pub fn list_files_with_extension<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// File stem used to label a recording, falling back to the full path.
pub fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
