use ndarray::ArrayView2;

/// Strongest finite sample of a standardized DM-time matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub peak: f64,
    pub row: usize,
    pub col: usize,
    pub triggered: bool,
}

/// Locate the maximum and flag it when it exceeds `threshold` (in sigma after
/// row standardization). An all-NaN or empty matrix yields no detection.
pub fn detect(dmt: ArrayView2<'_, f64>, threshold: f64) -> Option<Detection> {
    let mut best: Option<(f64, usize, usize)> = None;
    for ((row, col), &v) in dmt.indexed_iter() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((peak, _, _)) if v <= peak => {}
            _ => best = Some((v, row, col)),
        }
    }
    best.map(|(peak, row, col)| Detection {
        peak,
        row,
        col,
        triggered: peak > threshold,
    })
}
