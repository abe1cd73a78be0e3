use anyhow::Result;
use ndarray::{Array2, ArrayView2};
use plotters::prelude::*;
use plotters::style::colors::colormaps::ViridisRGB;
use plotters::style::FontTransform;
use std::path::Path;

/// Cells drawn along each axis at most; larger matrices are max-pooled.
const MAX_CELLS: (usize, usize) = (360, 640);

/// Physical axes of a cropped DM-time matrix (cell edges, not centres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DmTimeExtent {
    pub(crate) t_start: f64,
    pub(crate) t_end: f64,
    pub(crate) dm_start: f64,
    pub(crate) dm_end: f64,
}

/// Max-pool `values` into at most `max_rows` x `max_cols` blocks, ignoring
/// non-finite samples. A block without finite samples becomes NaN.
pub(crate) fn downsample_max(values: ArrayView2<'_, f64>, max_rows: usize, max_cols: usize) -> Array2<f64> {
    let (rows, cols) = values.dim();
    let row_step = rows.div_ceil(max_rows.max(1)).max(1);
    let col_step = cols.div_ceil(max_cols.max(1)).max(1);
    let out_rows = rows.div_ceil(row_step);
    let out_cols = cols.div_ceil(col_step);
    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let block = values.slice(ndarray::s![
            r * row_step..((r + 1) * row_step).min(rows),
            c * col_step..((c + 1) * col_step).min(cols)
        ]);
        block
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max)
    })
}

fn finite_range(values: &Array2<f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    Some(if hi - lo < f64::EPSILON { (lo, lo + 1.0) } else { (lo, hi) })
}

/// Render a standardized DM-time matrix as a Viridis heatmap with a sigma colour bar.
pub(crate) fn plot_dm_time(output_path: &Path, dmt: ArrayView2<'_, f64>, extent: DmTimeExtent, title: &str) -> Result<()> {
    let cells = downsample_max(dmt, MAX_CELLS.0, MAX_CELLS.1);
    let Some((min_val, max_val)) = finite_range(&cells) else {
        return Ok(());
    };
    let (n_rows, n_cols) = cells.dim();
    let t_step = (extent.t_end - extent.t_start) / n_cols as f64;
    let dm_step = (extent.dm_end - extent.dm_start) / n_rows as f64;

    let total_width = 1280u32;
    let total_height = 720u32;
    let color_bar_width = 140u32;
    let plot_width = total_width.saturating_sub(color_bar_width);

    let root = BitMapBackend::new(output_path, (total_width, total_height)).into_drawing_area();
    root.fill(&WHITE)?;
    let (plot_area, color_bar_area) = root.split_horizontally(plot_width);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(extent.t_start..extent.t_end, extent.dm_start..extent.dm_end)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time at f_min [s]")
        .y_desc("DM [pc cm^-3]")
        .x_label_formatter(&|v| format!("{:.3}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_label_style(("sans-serif", 22).into_font())
        .y_label_style(("sans-serif", 22).into_font())
        .draw()?;

    chart.draw_series(cells.indexed_iter().map(|((r, c), &v)| {
        let norm = if v.is_finite() {
            ((v - min_val) / (max_val - min_val)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let t0 = extent.t_start + c as f64 * t_step;
        let dm0 = extent.dm_start + r as f64 * dm_step;
        Rectangle::new(
            [(t0, dm0), (t0 + t_step, dm0 + dm_step)],
            ViridisRGB.get_color(norm).filled(),
        )
    }))?;

    let (bar_width_px, bar_height_px) = color_bar_area.dim_in_pixel();
    let bar_x_start = (bar_width_px as i32).saturating_sub(70);
    let top_margin = 40i32;
    let bottom_margin = 40i32;
    let usable_height = (bar_height_px as i32).saturating_sub(top_margin + bottom_margin);
    if usable_height > 1 {
        for i in 0..usable_height {
            let frac = 1.0 - (i as f64 / (usable_height - 1) as f64);
            color_bar_area.draw(&Rectangle::new(
                [(bar_x_start, top_margin + i), (bar_x_start + 30, top_margin + i + 1)],
                ViridisRGB.get_color(frac).filled(),
            ))?;
        }
        let label_count = 5.max(usable_height / 80);
        for i in 0..label_count {
            let frac = i as f64 / (label_count - 1).max(1) as f64;
            let value = min_val + (max_val - min_val) * (1.0 - frac);
            let y_pos = top_margin + (frac * (usable_height - 1) as f64) as i32;
            color_bar_area.draw_text(
                &format!("{:.1}", value),
                &TextStyle::from(("sans-serif", 20).into_font()).color(&BLACK),
                (bar_x_start + 35, y_pos - 8),
            )?;
        }
        color_bar_area.draw_text(
            "Significance [sigma]",
            &TextStyle::from(("sans-serif", 22).into_font())
                .color(&BLACK)
                .transform(FontTransform::Rotate270),
            (bar_x_start - 20, (bar_height_px / 2) as i32 + 90),
        )?;
    }

    root.present()?;
    Ok(())
}
