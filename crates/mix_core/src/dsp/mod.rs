//! Effect and estimation leaves used by the standard stages.
//!
//! Everything here is a pure function over sample buffers. Stages decide
//! *when* and *how much*; these leaves only know *how*. None of them touch
//! the job context.

mod dynamics;
mod filters;
mod resample;
mod saturation;
mod spectral;

pub use dynamics::{compress, limit, CompressorParams, LimiterParams};
pub use filters::{high_pass, high_shelf, low_pass, low_shelf};
pub use resample::resample_linear;
pub use saturation::saturate;
pub use spectral::{band_energies, detect_key, estimate_tempo_bpm, BandEnergies, KeyEstimate};
