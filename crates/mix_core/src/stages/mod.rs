//! The stage interface and the standard stage set.
//!
//! One file per stage. Each stage is a stateless value; everything it
//! needs arrives through the contract (targets, limits) and the job
//! context (audio, metadata, earlier records).

mod bus_color;
mod dc_offset;
mod final_limits;
mod key_detection;
mod manual_correction;
mod master_gain;
mod mixbus_headroom;
mod registry;
mod session_format;
mod stage;
mod stem_dynamics;
mod stem_filters;
mod stem_loudness;
mod tonal_balance;

pub use bus_color::BusColorStage;
pub use dc_offset::DcOffsetStage;
pub use final_limits::FinalLimitsStage;
pub use key_detection::KeyDetectionStage;
pub use manual_correction::ManualCorrectionStage;
pub use master_gain::MasterGainStage;
pub use mixbus_headroom::MixbusHeadroomStage;
pub use registry::StageRegistry;
pub use session_format::SessionFormatStage;
pub use stage::Stage;
pub use stem_dynamics::StemDynamicsStage;
pub use stem_filters::StemFiltersStage;
pub use stem_loudness::StemLoudnessStage;
pub use tonal_balance::TonalBalanceStage;
