//! Direct evaluation of the DM-time matrix along traced dispersion curves.
//!
//! Much slower than the engine, but written straight from the path each DM
//! row takes through the frequency channels, with no intermediate tensors.
//! Used to cross-check the engine's index bookkeeping.

use ndarray::{Array2, ArrayView2, Axis};

use crate::delay::DelayModel;
use crate::engine::FdmtConfig;
use crate::error::{FdmtError, Result};
use crate::plan::{ChannelOrder, FrequencyPlan};

/// Portion of one discretized dispersion curve inside one channel.
///
/// The curve enters channel `channel` `offset` samples after it leaves the
/// bottom of the band and stays there for `width + 1` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSweep {
    pub channel: usize,
    pub offset: usize,
    pub width: usize,
}

/// Trace DM row `row` down to the channels it sums, in ascending frequency.
///
/// Channels whose share of the curve falls outside the delay rows the merge
/// computes for their sub-band are left out; they contribute zero there too.
pub fn sweep_path(plan: &FrequencyPlan, n_chan: usize, config: &FdmtConfig, row: usize) -> Result<Vec<ChannelSweep>> {
    if n_chan == 0 || !n_chan.is_power_of_two() {
        return Err(FdmtError::shape(format!(
            "channel count {n_chan} must be a power of two"
        )));
    }
    let delay = DelayModel::new(plan);
    let levels = n_chan.trailing_zeros();
    let channel_width = plan.channel_width(n_chan);
    let mut sweeps = Vec::with_capacity(n_chan);
    descend(&delay, config, n_chan, channel_width, levels, 0, row, 0, &mut sweeps)?;
    Ok(sweeps)
}

#[allow(clippy::too_many_arguments)]
fn descend(
    delay: &DelayModel,
    config: &FdmtConfig,
    n_chan: usize,
    channel_width: f64,
    level: u32,
    index: usize,
    row: usize,
    offset: usize,
    sweeps: &mut Vec<ChannelSweep>,
) -> Result<()> {
    if level == 0 {
        if row <= delay.level_delay_budget(n_chan)? {
            sweeps.push(ChannelSweep {
                channel: index,
                offset,
                width: row,
            });
        }
        return Ok(());
    }
    let n_sub = n_chan >> level;
    let band = delay.sub_band(n_sub, index);
    if row > delay.sub_band_delay_budget(band.f_start, band.f_end)? {
        return Ok(());
    }
    let correction = config.correction.offset(level, channel_width);
    let split = delay.split_row(row, band, correction)?;
    descend(delay, config, n_chan, channel_width, level - 1, 2 * index, split.lower_row, offset, sweeps)?;
    descend(
        delay,
        config,
        n_chan,
        channel_width,
        level - 1,
        2 * index + 1,
        split.upper_row,
        offset + split.upper_shift,
        sweeps,
    )
}

/// Brute-force DM-time matrix, `O(N_f · N_DM · N_t)`.
///
/// `out[d, t] = Σ_c Σ_{k=0..=w_c} I[c, t - o_c - k]`, counting a channel only
/// once its whole sweep lies at non-negative times, as the engine does. The
/// inner window sums come from per-channel prefix sums.
pub fn brute_force(image: ArrayView2<'_, f64>, plan: &FrequencyPlan, config: &FdmtConfig) -> Result<Array2<f64>> {
    let (n_chan, n_time) = image.dim();
    if n_time == 0 {
        return Err(FdmtError::shape("power matrix has no time samples"));
    }
    let image = match plan.order() {
        ChannelOrder::Ascending => image,
        ChannelOrder::Descending => image.slice_move(ndarray::s![..;-1, ..]),
    };
    // prefix[c, t] = Σ_{u < t} I[c, u]
    let mut prefix = Array2::<f64>::zeros((n_chan, n_time + 1));
    for (c, row) in image.axis_iter(Axis(0)).enumerate() {
        let mut acc = 0.0;
        for (t, &v) in row.iter().enumerate() {
            acc += v;
            prefix[[c, t + 1]] = acc;
        }
    }
    let rows = plan.dm_rows();
    let mut out = Array2::<f64>::zeros((rows, n_time));
    for d in 0..rows {
        for sweep in sweep_path(plan, n_chan, config, d)? {
            for t in (sweep.offset + sweep.width)..n_time {
                let newest = t - sweep.offset;
                let oldest = newest - sweep.width;
                out[[d, t]] += prefix[[sweep.channel, newest + 1]] - prefix[[sweep.channel, oldest]];
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::MidpointCorrection;

    #[test]
    fn every_path_ends_at_its_row() {
        let plan = FrequencyPlan::new(400.0, 800.0, 32).unwrap();
        let config = FdmtConfig::default();
        for d in 0..32 {
            let path = sweep_path(&plan, 8, &config, d).unwrap();
            let top = path.iter().find(|s| s.channel == 7).unwrap();
            assert_eq!(top.offset + top.width, d);
            let bottom = path.iter().find(|s| s.channel == 0).unwrap();
            assert_eq!(bottom.offset, 0);
        }
    }

    #[test]
    fn offsets_increase_with_frequency() {
        let plan = FrequencyPlan::new(1100.0, 1500.0, 200).unwrap();
        let path = sweep_path(&plan, 16, &FdmtConfig::default(), 150).unwrap();
        assert_eq!(path.len(), 16);
        for pair in path.windows(2) {
            assert_eq!(pair[1].channel, pair[0].channel + 1);
            assert!(pair[1].offset >= pair[0].offset);
        }
    }

    #[test]
    fn zero_delay_row_is_a_plain_channel_sum() {
        let image = Array2::from_shape_fn((4, 10), |(c, t)| (c * 10 + t) as f64);
        let plan = FrequencyPlan::new(400.0, 800.0, 6).unwrap();
        let out = brute_force(image.view(), &plan, &FdmtConfig::default()).unwrap();
        for t in 0..10 {
            let expected: f64 = (0..4).map(|c| image[[c, t]]).sum();
            assert_eq!(out[[0, t]], expected);
        }
    }

    #[test]
    fn sweeps_follow_the_cold_plasma_law() {
        // Uncorrected paths stay within half a bin per level of the closed form.
        let plans = [
            (400.0, 800.0, 32, 8usize),
            (1200.0, 1500.0, 20, 16),
            (1100.0, 1500.0, 48, 16),
            (1200.0, 1500.0, 103, 32),
            (400.0, 800.0, 512, 64),
        ];
        let config = FdmtConfig {
            correction: MidpointCorrection::disabled(),
        };
        for (f_min, f_max, ds_max, n_chan) in plans {
            let plan = FrequencyPlan::new(f_min, f_max, ds_max).unwrap();
            let tolerance = 0.5 * f64::from(n_chan.trailing_zeros());
            let width = (f_max - f_min) / n_chan as f64;
            let span = f_min.powi(-2) - f_max.powi(-2);
            for d in 0..ds_max {
                let lag = |f: f64| d as f64 * (f_min.powi(-2) - f.powi(-2)) / span;
                let path = sweep_path(&plan, n_chan, &config, d).unwrap();
                assert_eq!(path.len(), n_chan);
                for sweep in path {
                    let lo = f_min + sweep.channel as f64 * width;
                    let enter = sweep.offset as f64;
                    let leave = (sweep.offset + sweep.width) as f64;
                    assert!(
                        (enter - lag(lo)).abs() <= tolerance && (leave - lag(lo + width)).abs() <= tolerance,
                        "{f_min}..{f_max} ds={ds_max} row {d}: {sweep:?} vs {:.2}..{:.2}",
                        lag(lo),
                        lag(lo + width)
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_non_power_of_two_channels() {
        let plan = FrequencyPlan::new(400.0, 800.0, 6).unwrap();
        assert!(matches!(
            sweep_path(&plan, 12, &FdmtConfig::default(), 0),
            Err(FdmtError::Shape(_))
        ));
    }
}
