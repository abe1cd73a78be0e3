//! Per-channel and per-row rescaling around the transform.

use ndarray::{s, Array2, ArrayView2, Axis};

use crate::error::{FdmtError, Result};

/// Rescale every channel to `0..=1` (minus min, over max). Non-finite samples
/// become 0 and a flat channel becomes all zeros.
pub fn normalize_channels(image: &mut Array2<f32>) {
    for mut row in image.axis_iter_mut(Axis(0)) {
        let (min, max) = row
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = max - min;
        if !(span.is_finite() && span > 0.0) {
            row.fill(0.0);
            continue;
        }
        row.mapv_inplace(|v| if v.is_finite() { (v - min) / span } else { 0.0 });
    }
}

/// Zero the inclusive channel ranges in `ranges`; ranges past the last channel are clipped.
pub fn zap_channels(image: &mut Array2<f32>, ranges: &[(usize, usize)]) {
    let n_chan = image.nrows();
    for &(lo, hi) in ranges {
        if lo >= n_chan {
            continue;
        }
        let hi = hi.min(n_chan - 1);
        if lo > hi {
            continue;
        }
        image.slice_mut(s![lo..=hi, ..]).fill(0.0);
    }
}

/// Drop DM rows below `ds_min` and the first `ds_max` columns, which only
/// hold partially accumulated sums.
pub fn crop_dm_time(dmt: ArrayView2<'_, f64>, ds_min: usize, ds_max: usize) -> Result<Array2<f64>> {
    let (rows, cols) = dmt.dim();
    if ds_min >= rows || ds_max >= cols {
        return Err(FdmtError::shape(format!(
            "cropping {ds_min} rows and {ds_max} columns leaves nothing of a {rows}x{cols} DM-time matrix"
        )));
    }
    Ok(dmt.slice(s![ds_min.., ds_max..]).to_owned())
}

/// Standardize every DM row to zero mean and unit variance over its finite values.
pub fn standardize_rows(dmt: &mut Array2<f64>) {
    for mut row in dmt.axis_iter_mut(Axis(0)) {
        let (n, sum) = row
            .iter()
            .filter(|v| v.is_finite())
            .fold((0usize, 0.0), |(n, acc), &v| (n + 1, acc + v));
        if n == 0 {
            row.fill(0.0);
            continue;
        }
        let mean = sum / n as f64;
        let var = row
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| (v - mean) * (v - mean))
            .sum::<f64>()
            / n as f64;
        let std = var.sqrt();
        if !(std > 0.0) {
            row.fill(0.0);
            continue;
        }
        row.mapv_inplace(|v| (v - mean) / std);
    }
}
