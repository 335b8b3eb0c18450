//! Headless SVG rendering of the three analyses.

use std::path::Path;

use log::info;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::{BandError, Result};
use crate::types::{AlignedSeries, CorrelationResult, TopomapField};

const FONT: &str = "sans-serif";
const NAN_COLOR: RGBColor = RGBColor(200, 200, 200);
const BAND_FILL: RGBColor = RGBColor(128, 128, 128);

// matplotlib coolwarm 的近似取样点
const COOLWARM: [(f64, RGBColor); 5] = [
    (0.0, RGBColor(59, 76, 192)),
    (0.25, RGBColor(141, 176, 254)),
    (0.5, RGBColor(221, 221, 221)),
    (0.75, RGBColor(244, 154, 123)),
    (1.0, RGBColor(180, 4, 38)),
];

const PLASMA: [(f64, RGBColor); 5] = [
    (0.0, RGBColor(13, 8, 135)),
    (0.25, RGBColor(126, 3, 168)),
    (0.5, RGBColor(204, 71, 120)),
    (0.75, RGBColor(248, 149, 64)),
    (1.0, RGBColor(240, 249, 33)),
];

fn plot_err<E: std::fmt::Debug>(e: E) -> BandError {
    BandError::Plot(format!("{:?}", e))
}

fn lerp_palette(palette: &[(f64, RGBColor)], t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    for pair in palette.windows(2) {
        let (t0, RGBColor(r0, g0, b0)) = pair[0];
        let (t1, RGBColor(r1, g1, b1)) = pair[1];
        if t <= t1 {
            let u = (t - t0) / (t1 - t0);
            let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * u).round() as u8;
            return RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1));
        }
    }
    palette[palette.len() - 1].1
}

/// Diverging palette for `value` in `[-1, 1]`, neutral grey at 0.
pub fn coolwarm(value: f64) -> RGBColor {
    lerp_palette(&COOLWARM, (value + 1.0) / 2.0)
}

/// Sequential palette for `t` in `[0, 1]`.
pub fn plasma(t: f64) -> RGBColor {
    lerp_palette(&PLASMA, t)
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Mean course with a shaded ±1 SD band.
pub fn render_time_course<P: AsRef<Path>>(aligned: &AlignedSeries, band: &str, path: P) -> Result<()> {
    let path = path.as_ref();
    if aligned.is_empty() {
        return Err(BandError::EmptyData("aligned series has no epochs".to_string()));
    }
    let n = aligned.len();
    let upper: Vec<f64> = aligned.mean.iter().zip(&aligned.std).map(|(m, s)| m + s).collect();
    let lower: Vec<f64> = aligned.mean.iter().zip(&aligned.std).map(|(m, s)| m - s).collect();
    let (mut y_min, mut y_max) = finite_range(upper.iter().chain(&lower).copied())
        .ok_or_else(|| BandError::EmptyData("aligned series has no finite values".to_string()))?;
    if y_max - y_min < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }
    let pad = (y_max - y_min) * 0.05;

    let root = SVGBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Average {} Power Across All Sessions", band), (FONT, 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..(n.max(2) - 1) as f64, (y_min - pad)..(y_max + pad))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(format!("{} Power (µV²/Hz)", band))
        .label_style((FONT, 16))
        .axis_desc_style((FONT, 18))
        .draw()
        .map_err(plot_err)?;

    let mut outline: Vec<(f64, f64)> = upper.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();
    outline.extend(lower.iter().enumerate().rev().map(|(i, &v)| (i as f64, v)));
    let fill = BAND_FILL.mix(0.3);
    chart
        .draw_series(std::iter::once(Polygon::new(outline, fill.filled())))
        .map_err(plot_err)?
        .label("±1 SD")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], fill.filled()));

    chart
        .draw_series(LineSeries::new(
            aligned.mean.iter().enumerate().map(|(i, &v)| (i as f64, v)),
            BLACK.stroke_width(2),
        ))
        .map_err(plot_err)?
        .label(format!("Mean {}", band))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((FONT, 16))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Wrote time course plot to {}", path.display());
    Ok(())
}

/// Band × score heatmap with two-decimal annotations; NaN cells grey.
pub fn render_correlation_heatmap<P: AsRef<Path>>(result: &CorrelationResult, path: P) -> Result<()> {
    let path = path.as_ref();
    let (n_rows, n_cols) = result.matrix.dim();
    if n_rows == 0 || n_cols == 0 {
        return Err(BandError::EmptyData("correlation matrix is empty".to_string()));
    }

    let (left, top, cell_w, cell_h) = (140i32, 70i32, 130i32, 70i32);
    let width = (left + cell_w * n_cols as i32 + 160) as u32;
    let height = (top + cell_h * n_rows as i32 + 90) as u32;

    let root = SVGBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let centred = |size: u32| (FONT, size).into_font().color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center));
    let right_aligned = (FONT, 18).into_font().color(&BLACK).pos(Pos::new(HPos::Right, VPos::Center));

    root.draw(&Text::new(
        "Correlation between Relative EEG Band Power and Scores",
        (width as i32 / 2, top / 2),
        centred(22),
    ))
    .map_err(plot_err)?;

    for (r, band) in result.bands.iter().enumerate() {
        let y0 = top + r as i32 * cell_h;
        root.draw(&Text::new(band.clone(), (left - 10, y0 + cell_h / 2), right_aligned.clone()))
            .map_err(plot_err)?;
        for c in 0..n_cols {
            let x0 = left + c as i32 * cell_w;
            let value = result.matrix[[r, c]];
            let (color, label) = if value.is_finite() {
                (coolwarm(value), format!("{:.2}", value))
            } else {
                (NAN_COLOR, "NaN".to_string())
            };
            root.draw(&Rectangle::new([(x0, y0), (x0 + cell_w, y0 + cell_h)], color.filled()))
                .map_err(plot_err)?;
            root.draw(&Rectangle::new([(x0, y0), (x0 + cell_w, y0 + cell_h)], WHITE.stroke_width(1)))
                .map_err(plot_err)?;
            root.draw(&Text::new(label, (x0 + cell_w / 2, y0 + cell_h / 2), centred(18)))
                .map_err(plot_err)?;
        }
    }

    let label_y = top + n_rows as i32 * cell_h + 25;
    for (c, score) in result.scores.iter().enumerate() {
        let x = left + c as i32 * cell_w + cell_w / 2;
        root.draw(&Text::new(score.clone(), (x, label_y), centred(16)))
            .map_err(plot_err)?;
    }

    // 色标：-1 在下，+1 在上
    let bar_x = left + cell_w * n_cols as i32 + 40;
    let bar_h = cell_h * n_rows as i32;
    let steps = 50;
    for i in 0..steps {
        let value = 1.0 - 2.0 * (i as f64 + 0.5) / steps as f64;
        let y0 = top + bar_h * i / steps;
        let y1 = top + bar_h * (i + 1) / steps;
        root.draw(&Rectangle::new([(bar_x, y0), (bar_x + 24, y1 + 1)], coolwarm(value).filled()))
            .map_err(plot_err)?;
    }
    let left_aligned = (FONT, 14).into_font().color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
    for (text, y) in [("1.0", top), ("0.0", top + bar_h / 2), ("-1.0", top + bar_h)] {
        root.draw(&Text::new(text, (bar_x + 32, y), left_aligned.clone()))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    info!("Wrote correlation heatmap to {}", path.display());
    Ok(())
}

/// Interpolated scalp map with head outline, nose and labelled sensors.
pub fn render_topomap<P: AsRef<Path>>(field: &TopomapField, title: &str, path: P) -> Result<()> {
    let path = path.as_ref();
    let res = field.resolution();
    if res == 0 {
        return Err(BandError::EmptyData("topomap grid is empty".to_string()));
    }
    let (v_min, v_max) = finite_range(field.grid.iter().copied())
        .or_else(|| finite_range(field.sensors.iter().map(|s| s.value)))
        .unwrap_or((0.0, 1.0));
    let span = if v_max - v_min > 0.0 { v_max - v_min } else { 1.0 };

    let size = 640i32;
    let (origin_x, origin_y) = (60i32, 80i32);
    let root = SVGBackend::new(path, ((origin_x + size + 160) as u32, (origin_y + size + 40) as u32))
        .into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let scale = size as f64 / (2.0 * field.extent);
    // y 轴朝向鼻子，像素坐标向下增长
    let to_px = |x: f64, y: f64| {
        (
            origin_x + ((x + field.extent) * scale).round() as i32,
            origin_y + ((field.extent - y) * scale).round() as i32,
        )
    };

    let centred = (FONT, 22).into_font().color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(title.to_string(), (origin_x + size / 2, origin_y / 2), centred))
        .map_err(plot_err)?;

    let cell = size as f64 / res as f64;
    for row in 0..res {
        for col in 0..res {
            let value = field.grid[[row, col]];
            if !value.is_finite() {
                continue;
            }
            let x0 = origin_x + (col as f64 * cell).floor() as i32;
            let x1 = origin_x + ((col + 1) as f64 * cell).ceil() as i32;
            // 第 0 行在后脑一侧，画在底部
            let y1 = origin_y + size - (row as f64 * cell).floor() as i32;
            let y0 = origin_y + size - ((row + 1) as f64 * cell).ceil() as i32;
            let color = plasma((value - v_min) / span);
            root.draw(&Rectangle::new([(x0, y0), (x1, y1)], color.filled()))
                .map_err(plot_err)?;
        }
    }

    let centre = to_px(0.0, 0.0);
    let head_px = (field.head_radius * scale).round() as i32;
    root.draw(&Circle::new(centre, head_px, BLACK.stroke_width(2)))
        .map_err(plot_err)?;
    let nose = vec![
        to_px(-0.1 * field.head_radius, 0.99 * field.head_radius),
        to_px(0.0, 1.12 * field.head_radius),
        to_px(0.1 * field.head_radius, 0.99 * field.head_radius),
    ];
    root.draw(&PathElement::new(nose, BLACK.stroke_width(2)))
        .map_err(plot_err)?;

    let label_style = (FONT, 16).into_font().color(&BLACK).pos(Pos::new(HPos::Center, VPos::Top));
    for sensor in &field.sensors {
        let (px, py) = to_px(sensor.x, sensor.y);
        root.draw(&Circle::new((px, py), 5, BLACK.filled())).map_err(plot_err)?;
        root.draw(&Text::new(sensor.channel.clone(), (px, py + 8), label_style.clone()))
            .map_err(plot_err)?;
    }

    let bar_x = origin_x + size + 50;
    let steps = 50;
    for i in 0..steps {
        let t = 1.0 - (i as f64 + 0.5) / steps as f64;
        let y0 = origin_y + size * i / steps;
        let y1 = origin_y + size * (i + 1) / steps;
        root.draw(&Rectangle::new([(bar_x, y0), (bar_x + 24, y1 + 1)], plasma(t).filled()))
            .map_err(plot_err)?;
    }
    let left_aligned = (FONT, 14).into_font().color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
    for (value, y) in [(v_max, origin_y), (v_min, origin_y + size)] {
        root.draw(&Text::new(format!("{:.3}", value), (bar_x + 32, y), left_aligned.clone()))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    info!("Wrote topomap to {}", path.display());
    Ok(())
}
