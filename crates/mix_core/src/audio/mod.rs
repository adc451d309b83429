//! PCM audio primitives shared by the whole pipeline.
//!
//! Everything here is pure in-memory data plus a handful of side-effect-free
//! helpers. Stages receive these types through the job context; no module in
//! this tree performs I/O except [`wav`], which converts to and from byte
//! buffers (the actual persistence goes through the ports).

mod buffer;
mod loudness;
mod metrics;
mod mixdown;
pub mod wav;

pub use buffer::AudioBuffer;
pub use loudness::{integrated_lufs, loudness_range_lu, true_peak_dbfs};
pub use metrics::{
    channel_loudness_diff_db, crest_factor_db, db_to_linear, dc_offset_per_channel, linear_to_db,
    peak_dbfs, rms_dbfs, stereo_correlation,
};
pub use mixdown::mix_stems;
