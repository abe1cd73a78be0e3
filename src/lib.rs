//! Fast Dispersion Measure Transform (FDMT) for dispersed radio transient searches.
//!
//! The engine turns a calibrated power matrix `I(f, t)` into a DM-time matrix in
//! `O(N_f · N_t · log2 N_f)` (Zackay & Ofek 2014, Algorithm 1). The remaining
//! modules are the driver-side stages around it: DM axis bookkeeping, chunking,
//! normalization, detection and array I/O.

pub mod chunk;
pub mod delay;
pub mod detect;
pub mod dm;
pub mod engine;
pub mod error;
pub mod io;
pub mod normalize;
pub mod plan;
pub mod reference;

pub use delay::{DelayModel, MidpointCorrection};
pub use engine::{transform, transform_kind, DmTimeMatrix, Fdmt, FdmtConfig, NumericKind, Power, State};
pub use error::{FdmtError, Result};
pub use plan::{ChannelOrder, FrequencyPlan};
