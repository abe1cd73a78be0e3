//! Dispersion measure <-> delay-bin bookkeeping.

use crate::error::{FdmtError, Result};

/// Dispersion constant in s MHz^2 pc^-1 cm^3.
pub const K_DM: f64 = 4148.808;

fn band_sweep(f_min_mhz: f64, f_max_mhz: f64) -> f64 {
    1.0 / (f_min_mhz * f_min_mhz) - 1.0 / (f_max_mhz * f_max_mhz)
}

/// Whole sample bins a pulse of dispersion `dm` drifts across `f_min..f_max`.
pub fn delay_samples(dm: f64, f_min_mhz: f64, f_max_mhz: f64, tsamp: f64) -> Result<usize> {
    if !(tsamp > 0.0) {
        return Err(FdmtError::config(format!(
            "sampling interval must be positive, got {tsamp}"
        )));
    }
    if !(dm >= 0.0) || !dm.is_finite() {
        return Err(FdmtError::config(format!("invalid DM {dm}")));
    }
    if !(f_min_mhz > 0.0 && f_min_mhz < f_max_mhz) {
        return Err(FdmtError::config(format!(
            "invalid band {f_min_mhz}..{f_max_mhz} MHz"
        )));
    }
    let samples = (dm * K_DM * band_sweep(f_min_mhz, f_max_mhz) / tsamp).trunc();
    Ok(samples as usize)
}

/// Linear mapping between DM-time rows and dispersion measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmAxis {
    dm_per_row: f64,
}

impl DmAxis {
    pub fn new(f_min_mhz: f64, f_max_mhz: f64, tsamp: f64) -> Result<Self> {
        if !(tsamp > 0.0) {
            return Err(FdmtError::config(format!(
                "sampling interval must be positive, got {tsamp}"
            )));
        }
        if !(f_min_mhz > 0.0 && f_min_mhz < f_max_mhz) {
            return Err(FdmtError::config(format!(
                "invalid band {f_min_mhz}..{f_max_mhz} MHz"
            )));
        }
        Ok(Self {
            dm_per_row: tsamp / (K_DM * band_sweep(f_min_mhz, f_max_mhz)),
        })
    }

    pub fn dm_per_row(&self) -> f64 {
        self.dm_per_row
    }

    pub fn dm_of_row(&self, row: usize) -> f64 {
        row as f64 * self.dm_per_row
    }

    /// Nearest row for `dm`.
    pub fn row_of_dm(&self, dm: f64) -> usize {
        (dm / self.dm_per_row).round().max(0.0) as usize
    }
}
