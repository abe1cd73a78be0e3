use fdmtrs::chunk::ChunkPlan;
use fdmtrs::detect::{detect, Detection};
use fdmtrs::dm::{self, DmAxis, K_DM};
use fdmtrs::io::{read_power_npy, write_npy_2d};
use fdmtrs::normalize::{crop_dm_time, normalize_channels, standardize_rows};
use fdmtrs::{Fdmt, FdmtConfig, FrequencyPlan, NumericKind};
use ndarray::{s, Array2};

const F_MIN: f64 = 1200.0;
const F_MAX: f64 = 1500.0;
const TSAMP: f64 = 1.0e-3;
const N_CHAN: usize = 32;

/// Uniform noise in `0..0.5`.
fn noise(n_time: usize) -> Array2<f32> {
    let mut state = 12345u64;
    Array2::from_shape_fn((N_CHAN, n_time), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        0.5 * (state >> 40) as f32 / (1u64 << 24) as f32
    })
}

/// Noise plus a DM-`dm` sweep of unit amplitude that leaves the top of the
/// band at sample `t0`.
fn dispersed_pulse(n_time: usize, dm: f64, t0: usize) -> Array2<f32> {
    let mut image = noise(n_time);
    let width = (F_MAX - F_MIN) / N_CHAN as f64;
    let lag = |f: f64| (dm * K_DM * (1.0 / (f * f) - 1.0 / (F_MAX * F_MAX)) / TSAMP) as usize;
    for c in 0..N_CHAN {
        let lo = F_MIN + c as f64 * width;
        let first = t0 + lag(lo + width);
        let last = t0 + lag(lo);
        image.slice_mut(s![c, first..=last]).mapv_inplace(|v| v + 1.0);
    }
    image
}

fn search(image: &Array2<f32>, dm_min: f64, dm_max: f64, chunk: usize, overlap: usize) -> Vec<(usize, Detection)> {
    let plan = FrequencyPlan::from_dm_range(F_MIN, F_MAX, TSAMP, dm_max).unwrap();
    let ds_min = dm::delay_samples(dm_min, F_MIN, F_MAX, TSAMP).unwrap();
    let engine = Fdmt::new(plan, image.nrows(), FdmtConfig::default()).unwrap();
    let mut hits = Vec::new();
    for window in ChunkPlan::new(chunk, overlap).unwrap().windows(image.ncols()) {
        if window.len() <= plan.ds_max() {
            continue;
        }
        let mut block = image.slice(s![.., window.start..window.end]).to_owned();
        normalize_channels(&mut block);
        let dmt = engine.transform_kind(block.view(), NumericKind::F32).unwrap();
        let mut dmt = crop_dm_time(dmt.to_f64().view(), ds_min, plan.ds_max()).unwrap();
        standardize_rows(&mut dmt);
        if let Some(hit) = detect(dmt.view(), 6.0) {
            hits.push((window.start, hit));
        }
    }
    hits
}

#[test]
fn injected_pulse_is_recovered_near_its_dm() {
    let image = dispersed_pulse(1200, 50.0, 300);
    let hits = search(&image, 10.0, 100.0, 512, 128);
    assert_eq!(hits.len(), 3);

    let triggered: Vec<&(usize, Detection)> = hits.iter().filter(|(_, h)| h.triggered).collect();
    assert_eq!(triggered.len(), 1, "{hits:?}");
    let (start, hit) = *triggered[0];
    assert_eq!(start, 0);

    let ds_min = dm::delay_samples(10.0, F_MIN, F_MAX, TSAMP).unwrap();
    let ds_max = dm::delay_samples(100.0, F_MIN, F_MAX, TSAMP).unwrap();
    let axis = DmAxis::new(F_MIN, F_MAX, TSAMP).unwrap();
    let found_dm = axis.dm_of_row(ds_min + hit.row);
    assert!((found_dm - 50.0).abs() < 5.0, "DM {found_dm}");

    // columns index the arrival at the bottom of the band
    let arrival = (start + ds_max + hit.col) as f64 * TSAMP;
    let expected = 0.300 + 50.0 * K_DM * (1.0 / (F_MIN * F_MIN) - 1.0 / (F_MAX * F_MAX));
    assert!((arrival - expected).abs() < 0.005, "t = {arrival}, expected {expected}");
}

#[test]
fn noise_alone_stays_below_threshold() {
    let image = noise(700);
    let hits = search(&image, 10.0, 100.0, 512, 128);
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|(_, h)| !h.triggered), "{hits:?}");
}

#[test]
fn triggered_dm_time_matrix_survives_npy_round_trip() {
    let image = dispersed_pulse(600, 40.0, 200);
    let plan = FrequencyPlan::from_dm_range(F_MIN, F_MAX, TSAMP, 100.0).unwrap();
    let mut block = image.clone();
    normalize_channels(&mut block);
    let dmt = Fdmt::new(plan, N_CHAN, FdmtConfig::default())
        .unwrap()
        .transform_kind(block.view(), NumericKind::F64)
        .unwrap()
        .to_f64();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dmt.npy");
    write_npy_2d(&path, dmt.view()).unwrap();
    let back = read_power_npy(&path).unwrap();
    assert_eq!(back.dim(), dmt.dim());
    for (a, b) in back.iter().zip(dmt.iter()) {
        assert!((f64::from(*a) - b).abs() <= 1e-4 * b.abs().max(1.0));
    }
}
