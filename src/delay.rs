//! Cold-plasma delay law expressed in discrete delay bins.
//!
//! The delay of frequency `f` relative to the top of the band is proportional to
//! `f^-2`. Everything here is normalized so that the full band `f_min..f_max`
//! spans exactly `max_dt - 1` bins (Zackay & Ofek 2014, eqs. 17 and 19).

use crate::error::{FdmtError, Result};
use crate::plan::FrequencyPlan;

#[inline]
fn inv_sq(f: f64) -> f64 {
    1.0 / (f * f)
}

fn check_band(f_start: f64, f_end: f64) -> Result<()> {
    if !(f_start.is_finite() && f_end.is_finite()) || f_start <= 0.0 {
        return Err(FdmtError::config(format!(
            "sub-band edges must be finite and positive ({f_start}..{f_end})"
        )));
    }
    if f_start >= f_end {
        return Err(FdmtError::config(format!(
            "sub-band has non-positive bandwidth ({f_start}..{f_end})"
        )));
    }
    Ok(())
}

/// Shift applied to the sub-band midpoint before the split delays are evaluated.
///
/// The shift is `fraction` of one input channel width, subtracted for the
/// lower child's midpoint and added for the upper child's one, on every merge
/// level `k >= from_level`. It is an empirical sensitivity knob: with it the
/// hitting efficiency improves while coherently dispersed pulses come out
/// slightly weaker, so it stays adjustable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidpointCorrection {
    pub from_level: Option<u32>,
    pub fraction: f64,
}

impl Default for MidpointCorrection {
    fn default() -> Self {
        Self {
            from_level: Some(2),
            fraction: 0.5,
        }
    }
}

impl MidpointCorrection {
    pub fn disabled() -> Self {
        Self {
            from_level: None,
            fraction: 0.0,
        }
    }

    /// Frequency shift for merge level `level` (1-based).
    pub fn offset(&self, level: u32, channel_width: f64) -> f64 {
        match self.from_level {
            Some(first) if level >= first => self.fraction * channel_width,
            _ => 0.0,
        }
    }
}

/// Contiguous frequency interval handled as one unit at a merge level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBand {
    pub f_start: f64,
    pub f_end: f64,
}

impl SubBand {
    pub fn width(&self) -> f64 {
        self.f_end - self.f_start
    }

    pub fn midpoint(&self) -> f64 {
        (self.f_end - self.f_start) / 2.0 + self.f_start
    }
}

/// How one output delay row of a merge is assembled from its two children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSplit {
    /// Row read from the lower-frequency child (`dT_middle`).
    pub lower_row: usize,
    /// Lag of the upper child relative to the lower one (`dT_middle_larger`).
    pub upper_shift: usize,
    /// Row read from the upper-frequency child (`dT_rest`).
    pub upper_row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayModel {
    f_min: f64,
    f_max: f64,
    max_dt: usize,
    full_span: f64,
}

impl DelayModel {
    pub fn new(plan: &FrequencyPlan) -> Self {
        Self {
            f_min: plan.f_min(),
            f_max: plan.f_max(),
            max_dt: plan.ds_max(),
            full_span: inv_sq(plan.f_min()) - inv_sq(plan.f_max()),
        }
    }

    pub fn max_dt(&self) -> usize {
        self.max_dt
    }

    /// Largest delay index a sub-band `f_start..f_end` can accumulate.
    ///
    /// Rounded up: an undersized delay axis would send the merge step out of
    /// bounds, an oversized one only costs memory.
    pub fn sub_band_delay_budget(&self, f_start: f64, f_end: f64) -> Result<usize> {
        check_band(f_start, f_end)?;
        let fraction = (inv_sq(f_start) - inv_sq(f_end)) / self.full_span;
        let budget = ((self.max_dt - 1) as f64 * fraction).ceil();
        if !(budget >= 0.0) {
            return Err(FdmtError::invariant(format!(
                "negative delay budget {budget} for {f_start}..{f_end}"
            )));
        }
        Ok(budget as usize)
    }

    /// Part of trial delay `i_dt` accumulated between `f_start` and `f_mid`,
    /// rounded half-to-even.
    pub fn mid_split_offset(&self, i_dt: usize, f_start: f64, f_mid: f64, f_end: f64) -> Result<usize> {
        check_band(f_start, f_end)?;
        let fraction = (inv_sq(f_mid) - inv_sq(f_start)) / (inv_sq(f_end) - inv_sq(f_start));
        let offset = (i_dt as f64 * fraction).round_ties_even();
        if !(offset >= 0.0) {
            return Err(FdmtError::invariant(format!(
                "midpoint {f_mid} lies below sub-band start {f_start}"
            )));
        }
        Ok(offset as usize)
    }

    /// Sub-band `index` of `n_sub` uniform sub-bands; the last one ends exactly at f_max.
    pub fn sub_band(&self, n_sub: usize, index: usize) -> SubBand {
        let edge = |i: usize| {
            if i >= n_sub {
                self.f_max
            } else {
                (self.f_max - self.f_min) / n_sub as f64 * i as f64 + self.f_min
            }
        };
        SubBand {
            f_start: edge(index),
            f_end: edge(index + 1),
        }
    }

    /// Delay budget shared by every sub-band of a level with `n_sub` sub-bands.
    /// The lowest sub-band disperses most, so it bounds the others.
    pub fn level_delay_budget(&self, n_sub: usize) -> Result<usize> {
        if n_sub == 0 {
            return Err(FdmtError::shape("a level needs at least one sub-band"));
        }
        let band = self.sub_band(n_sub, 0);
        self.sub_band_delay_budget(band.f_start, band.f_end)
    }

    /// Split trial delay `i_dt` of `band` between its lower and upper halves.
    ///
    /// The two roundings use differently shifted midpoints and are not
    /// interchangeable; each child keeps its own.
    pub fn split_row(&self, i_dt: usize, band: SubBand, correction: f64) -> Result<RowSplit> {
        let f_middle = band.midpoint() - correction;
        let f_middle_larger = band.midpoint() + correction;
        let lower_row = self.mid_split_offset(i_dt, band.f_start, f_middle, band.f_end)?;
        let upper_shift = self.mid_split_offset(i_dt, band.f_start, f_middle_larger, band.f_end)?;
        let upper_row = i_dt.checked_sub(upper_shift).ok_or_else(|| {
            FdmtError::invariant(format!(
                "upper-half lag {upper_shift} exceeds trial delay {i_dt} in {:.6}..{:.6}",
                band.f_start, band.f_end
            ))
        })?;
        Ok(RowSplit {
            lower_row,
            upper_shift,
            upper_row,
        })
    }
}
