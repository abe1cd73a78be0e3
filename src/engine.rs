//! FDMT engine: initialization, the log2(N_f) frequency merges and the
//! tensor bookkeeping between them.
//!
//! Each level produces a fresh `[N_f / 2^k, ΔT_k + 1, N_t]` tensor from the
//! previous one, which is dropped as soon as the next level exists. Output
//! sub-bands of one level are independent and are filled in parallel.

use std::fmt;
use std::fmt::Debug;
use std::ops::Add;

use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip};
use num_traits::{NumCast, Zero};
use tracing::debug;

use crate::delay::{DelayModel, MidpointCorrection, RowSplit};
use crate::error::{FdmtError, Result};
use crate::plan::{ChannelOrder, FrequencyPlan};

/// Element type the transform accumulates in.
pub trait Power: Copy + Zero + Add<Output = Self> + NumCast + Send + Sync + Debug + 'static {}

impl<T> Power for T where T: Copy + Zero + Add<Output = T> + NumCast + Send + Sync + Debug + 'static {}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FdmtConfig {
    pub correction: MidpointCorrection,
}

/// Partial dispersion sums after `level` merges.
#[derive(Debug, Clone)]
pub struct State<T> {
    level: u32,
    data: Array3<T>,
}

impl<T: Power> State<T> {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Surviving sub-bands at this level.
    pub fn n_sub(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn delay_rows(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn n_time(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Squeeze the single remaining sub-band into the DM-time matrix.
    pub fn into_dm_time(self) -> Result<Array2<T>> {
        if self.n_sub() != 1 {
            return Err(FdmtError::invariant(format!(
                "{} sub-bands remain after level {}",
                self.n_sub(),
                self.level
            )));
        }
        Ok(self.data.index_axis_move(Axis(0), 0))
    }
}

/// Row splits of one merge level, resolved once per engine.
#[derive(Debug, Clone)]
struct MergeLevel {
    delta_t: usize,
    splits: Vec<Vec<RowSplit>>,
    /// Largest child row any split of this level reads.
    max_child_row: usize,
}

fn plan_merge(delay: &DelayModel, correction: f64, level: u32, n_sub: usize) -> Result<MergeLevel> {
    let delta_t = delay.level_delay_budget(n_sub)?;
    let mut max_child_row = 0;
    let splits = (0..n_sub)
        .map(|i_f| {
            let band = delay.sub_band(n_sub, i_f);
            let local = delay.sub_band_delay_budget(band.f_start, band.f_end)?;
            if local > delta_t {
                return Err(FdmtError::invariant(format!(
                    "sub-band {i_f} at level {level} needs {local} delay rows, level allows {delta_t}"
                )));
            }
            let rows = (0..=local)
                .map(|i_dt| delay.split_row(i_dt, band, correction))
                .collect::<Result<Vec<_>>>()?;
            for split in &rows {
                max_child_row = max_child_row.max(split.lower_row).max(split.upper_row);
            }
            Ok(rows)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MergeLevel {
        delta_t,
        splits,
        max_child_row,
    })
}

#[derive(Debug, Clone)]
pub struct Fdmt {
    plan: FrequencyPlan,
    delay: DelayModel,
    config: FdmtConfig,
    n_chan: usize,
    levels: u32,
    init_delta_t: usize,
    merges: Vec<MergeLevel>,
    /// Allocated delay rows per level, `0..=levels`.
    rows: Vec<usize>,
}

impl Fdmt {
    pub fn new(plan: FrequencyPlan, n_chan: usize, config: FdmtConfig) -> Result<Self> {
        if n_chan == 0 {
            return Err(FdmtError::shape("power matrix has no frequency channels"));
        }
        if !n_chan.is_power_of_two() {
            return Err(FdmtError::shape(format!(
                "channel count {n_chan} must be a power of two"
            )));
        }
        let fraction = config.correction.fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(FdmtError::config(format!(
                "midpoint correction must be within [0, 1) channel widths, got {fraction}"
            )));
        }
        let delay = DelayModel::new(&plan);
        let levels = n_chan.trailing_zeros();
        let channel_width = plan.channel_width(n_chan);
        let init_delta_t = delay.level_delay_budget(n_chan)?;
        let merges = (1..=levels)
            .map(|level| {
                let correction = config.correction.offset(level, channel_width);
                plan_merge(&delay, correction, level, n_chan >> level)
            })
            .collect::<Result<Vec<_>>>()?;

        // A split can round one row past its child's budget; those rows stay zero.
        let budgets = std::iter::once(init_delta_t).chain(merges.iter().map(|m| m.delta_t));
        let rows = budgets
            .enumerate()
            .map(|(k, budget)| merges.get(k).map_or(budget, |next| budget.max(next.max_child_row)) + 1)
            .collect();

        Ok(Self {
            plan,
            delay,
            config,
            n_chan,
            levels,
            init_delta_t,
            merges,
            rows,
        })
    }

    pub fn plan(&self) -> &FrequencyPlan {
        &self.plan
    }

    pub fn delay_model(&self) -> &DelayModel {
        &self.delay
    }

    pub fn config(&self) -> &FdmtConfig {
        &self.config
    }

    pub fn n_chan(&self) -> usize {
        self.n_chan
    }

    /// Number of merge iterations, log2(N_f).
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Delay rows allocated for the state after `level` merges.
    pub fn level_rows(&self, level: u32) -> Option<usize> {
        self.rows.get(level as usize).copied()
    }

    /// Rows of the final DM-time matrix.
    pub fn output_rows(&self) -> usize {
        self.rows[self.levels as usize]
    }

    fn check_image<T>(&self, image: &ArrayView2<'_, T>) -> Result<()> {
        let (rows, cols) = image.dim();
        if rows != self.n_chan {
            return Err(FdmtError::shape(format!(
                "power matrix has {rows} channels, engine was built for {}",
                self.n_chan
            )));
        }
        if cols == 0 {
            return Err(FdmtError::shape("power matrix has no time samples"));
        }
        Ok(())
    }

    /// Level 0: per-channel running sums over `0..=ΔT_0` trailing samples.
    ///
    /// Row `d` of a channel holds `Σ_{k=0..=d} I[t - k]` for `t >= d` and zero
    /// before that; those zeros are real values, not gaps.
    pub fn initialize<T: Power>(&self, image: ArrayView2<'_, T>) -> Result<State<T>> {
        self.check_image(&image)?;
        let image = match self.plan.order() {
            ChannelOrder::Ascending => image,
            ChannelOrder::Descending => image.slice_move(s![..;-1, ..]),
        };
        let n_time = image.ncols();
        let delta_t = self.init_delta_t;
        debug!(n_chan = self.n_chan, delta_t, rows = self.rows[0], n_time, "FDMT initialized");

        let mut data = Array3::<T>::zeros((self.n_chan, self.rows[0], n_time));
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(image.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut chan, row)| {
                chan.row_mut(0).assign(&row);
                for d in 1..=delta_t.min(n_time) {
                    let (done, mut rest) = chan.view_mut().split_at(Axis(0), d);
                    let prev = done.row(d - 1);
                    let mut cur = rest.row_mut(0);
                    Zip::from(cur.slice_mut(s![d..]))
                        .and(prev.slice(s![d..]))
                        .and(row.slice(s![..n_time - d]))
                        .for_each(|out, &acc, &x| *out = acc + x);
                }
            });

        Ok(State { level: 0, data })
    }

    /// One merge: channels (2i, 2i+1) of `state` become channel i of the result.
    pub fn iterate<T: Power>(&self, state: State<T>) -> Result<State<T>> {
        let level = state.level + 1;
        if level > self.levels {
            return Err(FdmtError::invariant(format!(
                "no merge level {level}; transform has {} levels",
                self.levels
            )));
        }
        let (n_in, input_rows, n_time) = state.data.dim();
        if n_in != self.n_chan >> (level - 1) {
            return Err(FdmtError::invariant(format!(
                "level {} state has {n_in} sub-bands, expected {}",
                state.level,
                self.n_chan >> (level - 1)
            )));
        }
        let merge = &self.merges[(level - 1) as usize];
        if merge.max_child_row >= input_rows {
            return Err(FdmtError::invariant(format!(
                "level {level} reads child row {} but level {} holds {input_rows} rows",
                merge.max_child_row, state.level
            )));
        }
        let n_sub = n_in / 2;
        let rows = self.rows[level as usize];
        debug!(level, n_sub, delta_t = merge.delta_t, rows, input_rows, n_time, "FDMT iteration");

        let input = &state.data;
        let mut data = Array3::<T>::zeros((n_sub, rows, n_time));
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(merge.splits.par_iter())
            .enumerate()
            .for_each(|(i_f, (mut band_out, splits))| {
                let lower = input.index_axis(Axis(0), 2 * i_f);
                let upper = input.index_axis(Axis(0), 2 * i_f + 1);
                for (i_dt, split) in splits.iter().enumerate() {
                    merge_row(
                        band_out.row_mut(i_dt),
                        lower.row(split.lower_row),
                        upper.row(split.upper_row),
                        split.upper_shift,
                    );
                }
            });

        Ok(State { level, data })
    }

    pub fn transform<T: Power>(&self, image: ArrayView2<'_, T>) -> Result<Array2<T>> {
        let mut state = self.initialize(image)?;
        for _ in 0..self.levels {
            state = self.iterate(state)?;
        }
        state.into_dm_time()
    }

    /// Transform an f32 power matrix, accumulating in `kind`.
    pub fn transform_kind(&self, image: ArrayView2<'_, f32>, kind: NumericKind) -> Result<DmTimeMatrix> {
        self.check_image(&image)?;
        Ok(match kind {
            NumericKind::F32 => DmTimeMatrix::F32(self.transform(image)?),
            NumericKind::F64 => DmTimeMatrix::F64(self.transform(cast_image::<f64>(image, kind)?.view())?),
            NumericKind::I32 => DmTimeMatrix::I32(self.transform(cast_image::<i32>(image, kind)?.view())?),
            NumericKind::I64 => DmTimeMatrix::I64(self.transform(cast_image::<i64>(image, kind)?.view())?),
        })
    }
}

/// Columns before `shift` see only the lower child; after it the upper child
/// joins, lagging by `shift` samples.
fn merge_row<T: Power>(mut out: ArrayViewMut1<'_, T>, lower: ArrayView1<'_, T>, upper: ArrayView1<'_, T>, shift: usize) {
    let n_time = out.len();
    let cut = shift.min(n_time);
    out.slice_mut(s![..cut]).assign(&lower.slice(s![..cut]));
    Zip::from(out.slice_mut(s![cut..]))
        .and(lower.slice(s![cut..]))
        .and(upper.slice(s![..n_time - cut]))
        .for_each(|o, &a, &b| *o = a + b);
}

/// FDMT with the default configuration; `image` rows must match `plan`'s channel order.
pub fn transform<T: Power>(image: ArrayView2<'_, T>, plan: &FrequencyPlan) -> Result<Array2<T>> {
    Fdmt::new(*plan, image.nrows(), FdmtConfig::default())?.transform(image)
}

/// Runtime choice of the accumulation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericKind {
    #[default]
    F32,
    F64,
    I32,
    I64,
}

impl NumericKind {
    pub fn name(&self) -> &'static str {
        match self {
            NumericKind::F32 => "f32",
            NumericKind::F64 => "f64",
            NumericKind::I32 => "i32",
            NumericKind::I64 => "i64",
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DM-time matrix in the numeric kind it was accumulated in.
#[derive(Debug, Clone, PartialEq)]
pub enum DmTimeMatrix {
    F32(Array2<f32>),
    F64(Array2<f64>),
    I32(Array2<i32>),
    I64(Array2<i64>),
}

impl DmTimeMatrix {
    pub fn kind(&self) -> NumericKind {
        match self {
            DmTimeMatrix::F32(_) => NumericKind::F32,
            DmTimeMatrix::F64(_) => NumericKind::F64,
            DmTimeMatrix::I32(_) => NumericKind::I32,
            DmTimeMatrix::I64(_) => NumericKind::I64,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        match self {
            DmTimeMatrix::F32(a) => a.dim(),
            DmTimeMatrix::F64(a) => a.dim(),
            DmTimeMatrix::I32(a) => a.dim(),
            DmTimeMatrix::I64(a) => a.dim(),
        }
    }

    pub fn to_f64(&self) -> Array2<f64> {
        match self {
            DmTimeMatrix::F32(a) => a.mapv(<f64 as From<f32>>::from),
            DmTimeMatrix::F64(a) => a.clone(),
            DmTimeMatrix::I32(a) => a.mapv(<f64 as From<i32>>::from),
            DmTimeMatrix::I64(a) => a.mapv(|v| v as f64),
        }
    }
}

fn cast_image<T: Power>(image: ArrayView2<'_, f32>, kind: NumericKind) -> Result<Array2<T>> {
    let mut out = Array2::<T>::zeros(image.dim());
    for ((channel, time), &v) in image.indexed_iter() {
        out[[channel, time]] = <T as NumCast>::from(v).ok_or(FdmtError::Sample {
            channel,
            time,
            kind: kind.name(),
        })?;
    }
    Ok(out)
}

/// Transform an f32 power matrix, accumulating in `kind`. Integer kinds
/// truncate the input, so they suit pre-quantized data only.
pub fn transform_kind(
    image: ArrayView2<'_, f32>,
    plan: &FrequencyPlan,
    config: FdmtConfig,
    kind: NumericKind,
) -> Result<DmTimeMatrix> {
    Fdmt::new(*plan, image.nrows(), config)?.transform_kind(image, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn plan() -> FrequencyPlan {
        FrequencyPlan::new(400.0, 800.0, 32).unwrap()
    }

    fn impulse(n_chan: usize, n_time: usize, chan: usize, time: usize) -> Array2<f64> {
        let mut image = Array2::zeros((n_chan, n_time));
        image[[chan, time]] = 1.0;
        image
    }

    #[test]
    fn rejects_non_power_of_two_channels() {
        let image = Array2::<f32>::ones((6, 16));
        let err = transform(image.view(), &plan()).unwrap_err();
        assert!(matches!(err, FdmtError::Shape(_)), "{err}");
        assert!(matches!(
            Fdmt::new(plan(), 0, FdmtConfig::default()),
            Err(FdmtError::Shape(_))
        ));
    }

    #[test]
    fn rejects_empty_time_axis() {
        let image = Array2::<f32>::zeros((8, 0));
        assert!(matches!(
            transform(image.view(), &plan()),
            Err(FdmtError::Shape(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_correction() {
        let config = FdmtConfig {
            correction: MidpointCorrection {
                from_level: Some(1),
                fraction: 1.0,
            },
        };
        assert!(matches!(
            Fdmt::new(plan(), 8, config),
            Err(FdmtError::Config(_))
        ));
    }

    #[test]
    fn initialization_builds_trailing_window_sums() {
        let image = Array2::from_shape_fn((8, 12), |(c, t)| (c * 100 + t) as f64);
        let engine = Fdmt::new(plan(), 8, FdmtConfig::default()).unwrap();
        let state = engine.initialize(image.view()).unwrap();
        // ceil(31 * 0.2798) = 9
        assert_eq!(state.data().dim(), (8, 10, 12));
        assert_eq!(state.level(), 0);
        for c in 0..8 {
            for d in 0..10 {
                for t in 0..12 {
                    let expected = if t >= d {
                        (0..=d).map(|k| image[[c, t - k]]).sum::<f64>()
                    } else {
                        0.0
                    };
                    assert_eq!(state.data()[[c, d, t]], expected, "c={c} d={d} t={t}");
                }
            }
        }
    }

    #[test]
    fn iterate_halves_the_channel_axis() {
        let image = Array2::<f64>::ones((8, 40));
        let engine = Fdmt::new(plan(), 8, FdmtConfig::default()).unwrap();
        let mut state = engine.initialize(image.view()).unwrap();
        let mut rows = state.delay_rows();
        for level in 1..=3u32 {
            state = engine.iterate(state).unwrap();
            assert_eq!(state.level(), level);
            assert_eq!(state.n_sub(), 8 >> level);
            assert!(state.delay_rows() >= rows);
            assert_eq!(state.n_time(), 40);
            rows = state.delay_rows();
        }
        assert_eq!(rows, 32);
        assert!(matches!(
            engine.iterate(state),
            Err(FdmtError::InternalInvariant(_))
        ));
    }

    #[test]
    fn output_shape_depends_only_on_plan() {
        let engine = Fdmt::new(plan(), 8, FdmtConfig::default()).unwrap();
        assert_eq!(engine.levels(), 3);
        assert_eq!(engine.output_rows(), 32);
        let zeros = Array2::<f32>::zeros((8, 64));
        let out = engine.transform(zeros.view()).unwrap();
        assert_eq!(out.dim(), (32, 64));
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn delay_axis_covers_rows_rounded_past_the_child_budget() {
        // the lowest sub-band of level 1 asks its lower child for row 1441
        let wide = FrequencyPlan::new(400.0, 800.0, 3001).unwrap();
        for config in [FdmtConfig::default(), FdmtConfig { correction: MidpointCorrection::disabled() }] {
            let engine = Fdmt::new(wide, 4, config).unwrap();
            let budget = engine.delay_model().level_delay_budget(4).unwrap();
            assert_eq!(budget, 1440);
            assert_eq!(engine.level_rows(0), Some(1442));
            assert_eq!(engine.output_rows(), 3001);
            assert_eq!(engine.level_rows(3), None);
        }
    }

    #[test]
    fn top_channel_impulse_traces_a_single_ridge() {
        let image = impulse(8, 64, 7, 0);
        let out = transform(image.view(), &plan()).unwrap();
        assert_eq!(out.dim(), (32, 64));
        for d in 0..32 {
            for t in 0..64 {
                let expected = if t == d { 1.0 } else { 0.0 };
                assert_eq!(out[[d, t]], expected, "row {d}, column {t}");
            }
        }
    }

    #[test]
    fn descending_rows_are_flipped_before_the_transform() {
        let ascending = Array2::from_shape_fn((16, 48), |(c, t)| ((c * 7 + t * 3) % 11) as f64);
        let descending = ascending.slice(s![..;-1, ..]).to_owned();
        let plan_up = FrequencyPlan::new(1200.0, 1500.0, 20).unwrap();
        let plan_down = plan_up.with_order(ChannelOrder::Descending);
        let a = transform(ascending.view(), &plan_up).unwrap();
        let b = transform(descending.view(), &plan_down).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_channel_passes_through_initialization() {
        let image = Array2::from_shape_fn((1, 10), |(_, t)| t as f64);
        let p = FrequencyPlan::new(400.0, 800.0, 4).unwrap();
        let out = transform(image.view(), &p).unwrap();
        assert_eq!(out.dim(), (4, 10));
        assert_eq!(out[[0, 5]], 5.0);
        assert_eq!(out[[3, 5]], 5.0 + 4.0 + 3.0 + 2.0);
        assert_eq!(out[[3, 2]], 0.0);
    }

    #[test]
    fn numeric_kinds_agree_on_integer_data() {
        let image = Array2::from_shape_fn((8, 64), |(c, t)| ((c + 2 * t) % 5) as f32);
        let config = FdmtConfig::default();
        let f32_out = transform_kind(image.view(), &plan(), config, NumericKind::F32).unwrap();
        let i32_out = transform_kind(image.view(), &plan(), config, NumericKind::I32).unwrap();
        let i64_out = transform_kind(image.view(), &plan(), config, NumericKind::I64).unwrap();
        let f64_out = transform_kind(image.view(), &plan(), config, NumericKind::F64).unwrap();
        assert_eq!(i32_out.kind(), NumericKind::I32);
        assert_eq!(f32_out.dim(), (32, 64));
        assert_eq!(f32_out.to_f64(), i32_out.to_f64());
        assert_eq!(i32_out.to_f64(), i64_out.to_f64());
        assert_eq!(i64_out.to_f64(), f64_out.to_f64());
    }

    #[test]
    fn nan_cannot_accumulate_as_integer() {
        let mut image = Array2::<f32>::zeros((4, 8));
        image[[2, 5]] = f32::NAN;
        let err = transform_kind(image.view(), &plan(), FdmtConfig::default(), NumericKind::I32).unwrap_err();
        match err {
            FdmtError::Sample { channel, time, kind } => {
                assert_eq!((channel, time, kind), (2, 5, "i32"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
