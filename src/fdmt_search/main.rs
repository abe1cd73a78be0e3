use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use ndarray::{s, Array2};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fdmtrs::chunk::ChunkPlan;
use fdmtrs::detect::detect;
use fdmtrs::dm::{self, DmAxis};
use fdmtrs::io::{read_power_npy, read_power_raw, write_npy_2d};
use fdmtrs::normalize::{crop_dm_time, normalize_channels, standardize_rows, zap_channels};
use fdmtrs::{ChannelOrder, Fdmt, FdmtConfig, FrequencyPlan, MidpointCorrection, NumericKind};

mod plot;
mod shared;
mod zap;

use plot::DmTimeExtent;
use shared::ChunkRecord;

/// Accumulation type accepted by `--dtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Dtype {
    F32,
    F64,
    I32,
    I64,
}

impl From<Dtype> for NumericKind {
    fn from(dtype: Dtype) -> Self {
        match dtype {
            Dtype::F32 => NumericKind::F32,
            Dtype::F64 => NumericKind::F64,
            Dtype::I32 => NumericKind::I32,
            Dtype::I64 => NumericKind::I64,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "fdmt_search",
    version,
    about = "Search a power matrix for dispersed transients with the Fast Dispersion Measure Transform",
    long_about = "Reads a time-frequency power matrix (.npy [channels, samples] or raw little-endian f32, time-major),\n\
    splits it into overlapping windows and computes the full DM-time matrix of each window with the FDMT.\n\
    Each DM row is standardized and windows whose peak exceeds --threshold are reported in candidates.csv."
)]
struct Cli {
    /// Input power matrix (.npy, or raw f32 with --nchan)
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Channel count of a raw input file
    #[arg(long, value_name = "N")]
    nchan: Option<usize>,

    /// Lowest frequency of the band [MHz]
    #[arg(long, value_name = "MHZ")]
    fmin: f64,

    /// Highest frequency of the band [MHz]
    #[arg(long, value_name = "MHZ")]
    fmax: f64,

    /// Sampling interval [s]
    #[arg(long, value_name = "SECONDS")]
    tsamp: f64,

    /// Smallest DM of interest; lower rows are cropped [pc cm^-3]
    #[arg(long, default_value_t = 10.0)]
    dm_min: f64,

    /// Largest DM searched [pc cm^-3]
    #[arg(long, default_value_t = 800.0)]
    dm_max: f64,

    /// Window length [samples]
    #[arg(long, default_value_t = 1 << 15)]
    chunk: usize,

    /// Samples shared by consecutive windows
    #[arg(long, default_value_t = 1 << 13)]
    overlap: usize,

    /// Detection threshold on the standardized DM-time matrix [sigma]
    #[arg(long, default_value_t = 6.0)]
    threshold: f64,

    /// Accumulation type of the transform
    #[arg(long, value_enum, default_value_t = Dtype::F32)]
    dtype: Dtype,

    /// Row 0 of the input is the highest channel (typical filterbank order)
    #[arg(long)]
    descending: bool,

    /// Channel ranges to zero before the search (e.g. "251,255"). Can be specified multiple times.
    #[arg(long, num_args = 1.., value_name = "MIN,MAX")]
    zap: Vec<String>,

    /// Worker threads (0 = all available cores)
    #[arg(long, default_value_t = 0)]
    cpu: usize,

    /// First merge level that shifts the sub-band midpoints
    #[arg(long, default_value_t = 2)]
    correction_from_level: u32,

    /// Midpoint shift in channel widths
    #[arg(long, default_value_t = 0.5)]
    correction_fraction: f64,

    /// Disable the midpoint shift entirely
    #[arg(long)]
    no_correction: bool,

    /// Save the DM-time matrix of every triggered window as .npy
    #[arg(long)]
    save_dmt: bool,

    /// Skip the PNG heatmap of triggered windows
    #[arg(long)]
    no_plot: bool,

    /// Output directory (default: <input dir>/fdmt/<input stem>)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    if std::env::args_os().len() == 1 {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn determine_effective_cpu_count(cpu_arg: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    if cpu_arg == 0 {
        available
    } else {
        cpu_arg.clamp(1, available)
    }
}

fn load_input(input: &Path, nchan: Option<usize>) -> Result<Array2<f32>> {
    let is_npy = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("npy"))
        .unwrap_or(false);
    if is_npy {
        return read_power_npy(input).with_context(|| format!("failed to read {}", input.display()));
    }
    let n_chan = nchan.ok_or_else(|| anyhow!("--nchan is required for raw input {}", input.display()))?;
    read_power_raw(input, n_chan).with_context(|| format!("failed to read {}", input.display()))
}

fn run(cli: Cli) -> Result<()> {
    if cli.dm_min >= cli.dm_max {
        return Err(anyhow!(
            "--dm-min ({}) must be below --dm-max ({})",
            cli.dm_min,
            cli.dm_max
        ));
    }
    let zap = zap::parse_zap_ranges(&cli.zap)?;
    let order = if cli.descending {
        ChannelOrder::Descending
    } else {
        ChannelOrder::Ascending
    };
    let plan = FrequencyPlan::from_dm_range(cli.fmin, cli.fmax, cli.tsamp, cli.dm_max)?.with_order(order);
    let ds_min = dm::delay_samples(cli.dm_min, cli.fmin, cli.fmax, cli.tsamp)?;
    let axis = DmAxis::new(cli.fmin, cli.fmax, cli.tsamp)?;
    let correction = if cli.no_correction {
        MidpointCorrection::disabled()
    } else {
        MidpointCorrection {
            from_level: Some(cli.correction_from_level),
            fraction: cli.correction_fraction,
        }
    };
    let chunks = ChunkPlan::new(cli.chunk, cli.overlap)?;

    let mut image = load_input(&cli.input, cli.nchan)?;
    let (n_chan, n_total) = image.dim();
    info!(
        input = %cli.input.display(),
        n_chan,
        n_total,
        ds_min,
        ds_max = plan.ds_max(),
        "loaded power matrix"
    );
    zap_channels(&mut image, &zap);

    let engine = Fdmt::new(plan, n_chan, FdmtConfig { correction })?;
    let output_dir = shared::prepare_output_directory(&cli.input, cli.output.as_deref())?;
    let stem = shared::output_stem(&cli.input);

    let kind = NumericKind::from(cli.dtype);
    let threads = determine_effective_cpu_count(cli.cpu);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    info!(threads, levels = engine.levels(), dtype = %kind, "starting search");

    let mut records = Vec::new();
    for chunk in chunks.windows(n_total) {
        if chunk.len() <= plan.ds_max() {
            warn!(
                start = chunk.start,
                len = chunk.len(),
                ds_max = plan.ds_max(),
                "window shorter than the maximum delay, skipped"
            );
            continue;
        }
        debug!(start = chunk.start, end = chunk.end, "processing window");

        let mut window = image.slice(s![.., chunk.start..chunk.end]).to_owned();
        normalize_channels(&mut window);
        let dmt = pool.install(|| engine.transform_kind(window.view(), kind))?;
        let mut dmt = crop_dm_time(dmt.to_f64().view(), ds_min, plan.ds_max())?;
        standardize_rows(&mut dmt);

        let Some(hit) = detect(dmt.view(), cli.threshold) else {
            warn!(start = chunk.start, "window has no finite samples after standardization");
            continue;
        };
        let row = ds_min + hit.row;
        let record = ChunkRecord {
            start: chunk.start,
            end: chunk.end,
            peak: hit.peak,
            row,
            col: hit.col,
            dm: axis.dm_of_row(row),
            time_s: (chunk.start + plan.ds_max() + hit.col) as f64 * cli.tsamp,
            triggered: hit.triggered,
        };
        if hit.triggered {
            info!(
                start = chunk.start,
                peak = record.peak,
                dm = record.dm,
                time_s = record.time_s,
                "candidate above threshold"
            );
            if cli.save_dmt {
                let path = output_dir.join(shared::window_file_name(&stem, chunk.start, "npy"));
                write_npy_2d(&path, dmt.view())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            if !cli.no_plot {
                let path = output_dir.join(shared::window_file_name(&stem, chunk.start, "png"));
                let extent = DmTimeExtent {
                    t_start: (chunk.start + plan.ds_max()) as f64 * cli.tsamp,
                    t_end: chunk.end as f64 * cli.tsamp,
                    dm_start: axis.dm_of_row(ds_min),
                    dm_end: axis.dm_of_row(plan.ds_max()),
                };
                let title = format!("{stem} @ {} (peak {:.1} sigma)", chunk.start, hit.peak);
                plot::plot_dm_time(&path, dmt.view(), extent, &title)
                    .with_context(|| format!("failed to render {}", path.display()))?;
                debug!(path = %path.display(), "heatmap written");
            }
        } else {
            debug!(start = chunk.start, peak = record.peak, "below threshold");
        }
        records.push(record);
    }

    let csv_path = output_dir.join("candidates.csv");
    shared::write_candidates_csv(&csv_path, &records)?;
    print_summary(&cli, &plan, n_chan, n_total, &records, &csv_path);
    Ok(())
}

fn print_summary(
    cli: &Cli,
    plan: &FrequencyPlan,
    n_chan: usize,
    n_total: usize,
    records: &[ChunkRecord],
    csv_path: &Path,
) {
    println!("Input file       : {}", cli.input.display());
    println!("Channels         : {}", n_chan);
    println!(
        "Samples          : {} ({:.3} s)",
        n_total,
        n_total as f64 * cli.tsamp
    );
    println!("Band             : {:.3} - {:.3} MHz", plan.f_min(), plan.f_max());
    println!(
        "DM range         : {:.1} - {:.1} pc cm^-3 ({} delay rows)",
        cli.dm_min,
        cli.dm_max,
        plan.ds_max()
    );
    println!("Accumulation     : {}", NumericKind::from(cli.dtype));
    println!("Windows searched : {}", records.len());
    let triggered: Vec<&ChunkRecord> = records.iter().filter(|r| r.triggered).collect();
    println!("Candidates       : {}", triggered.len());
    if let Some(best) = records
        .iter()
        .max_by(|a, b| a.peak.total_cmp(&b.peak))
    {
        println!(
            "Strongest peak   : {:.2} sigma at DM {:.2}, t = {:.4} s",
            best.peak, best.dm, best.time_s
        );
    }
    println!("Results          : {}", csv_path.display());
}
