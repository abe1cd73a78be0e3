use crate::dm;
use crate::error::{FdmtError, Result};

/// Frequency ordering of the rows of a power matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    /// Row 0 is the lowest channel (f_min).
    #[default]
    Ascending,
    /// Row 0 is the highest channel (f_max), as in most filterbank recordings.
    Descending,
}

/// Band edges and the maximum trial delay of one search.
///
/// Frequencies can be given in MHz or GHz; the transform only uses ratios of
/// `f^-2` differences. `ds_max` is the maximum delay across the full band in
/// whole sample bins and sets the number of DM rows of the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyPlan {
    f_min: f64,
    f_max: f64,
    ds_max: usize,
    order: ChannelOrder,
}

impl FrequencyPlan {
    pub fn new(f_min: f64, f_max: f64, ds_max: usize) -> Result<Self> {
        if !f_min.is_finite() || !f_max.is_finite() {
            return Err(FdmtError::config(format!(
                "band edges must be finite (f_min={f_min}, f_max={f_max})"
            )));
        }
        if f_min <= 0.0 {
            return Err(FdmtError::config(format!(
                "f_min must be positive, got {f_min}"
            )));
        }
        if f_min >= f_max {
            return Err(FdmtError::config(format!(
                "f_min ({f_min}) must be below f_max ({f_max})"
            )));
        }
        if ds_max == 0 {
            return Err(FdmtError::config("ds_max must be at least one sample"));
        }
        Ok(Self {
            f_min,
            f_max,
            ds_max,
            order: ChannelOrder::Ascending,
        })
    }

    /// Plan whose `ds_max` covers dispersion up to `dm_max` (pc cm^-3).
    /// Frequencies in MHz, `tsamp` in seconds.
    pub fn from_dm_range(f_min_mhz: f64, f_max_mhz: f64, tsamp: f64, dm_max: f64) -> Result<Self> {
        if !(f_min_mhz > 0.0 && f_min_mhz < f_max_mhz) {
            return Err(FdmtError::config(format!(
                "invalid band {f_min_mhz}..{f_max_mhz} MHz"
            )));
        }
        let ds_max = dm::delay_samples(dm_max, f_min_mhz, f_max_mhz, tsamp)?;
        Self::new(f_min_mhz, f_max_mhz, ds_max)
    }

    pub fn with_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    pub fn f_min(&self) -> f64 {
        self.f_min
    }

    pub fn f_max(&self) -> f64 {
        self.f_max
    }

    pub fn ds_max(&self) -> usize {
        self.ds_max
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Width of one of `n_chan` uniform channels.
    pub fn channel_width(&self, n_chan: usize) -> f64 {
        (self.f_max - self.f_min) / n_chan as f64
    }

    /// Number of rows of the final DM-time matrix (ΔT_max + 1).
    pub fn dm_rows(&self) -> usize {
        self.ds_max
    }
}
