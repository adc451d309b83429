//! Stage registry: contract id to stage value.

use std::collections::HashMap;

use super::stage::Stage;
use super::{
    BusColorStage, DcOffsetStage, FinalLimitsStage, KeyDetectionStage, ManualCorrectionStage,
    MasterGainStage, MixbusHeadroomStage, SessionFormatStage, StemDynamicsStage, StemFiltersStage,
    StemLoudnessStage, TonalBalanceStage,
};

/// Maps contract ids to the stage values that implement them.
///
/// Populated once at process start; which concrete stage implements which
/// id is fixed per build - there is no dynamic discovery and no
/// import-time I/O.
pub struct StageRegistry {
    stages: HashMap<String, Box<dyn Stage>>,
}

impl StageRegistry {
    /// An empty registry (test harnesses build their own stage sets).
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// The standard stage set matching the built-in contract document.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("S0_SESSION_FORMAT", SessionFormatStage::new());
        registry.register("S1_STEM_DC_OFFSET", DcOffsetStage::new());
        registry.register("S1_STEM_WORKING_LOUDNESS", StemLoudnessStage::new());
        registry.register("S1_KEY_DETECTION", KeyDetectionStage::new());
        registry.register("S3_MIXBUS_HEADROOM", MixbusHeadroomStage::new());
        registry.register("S4_STEM_HPF_LPF", StemFiltersStage::new());
        registry.register("S5_STEM_DYNAMICS", StemDynamicsStage::new());
        registry.register("S6_MANUAL_CORRECTION", ManualCorrectionStage::new());
        registry.register("S7_MIXBUS_TONAL_BALANCE", TonalBalanceStage::new());
        registry.register("S8_MIXBUS_COLOR", BusColorStage::new());
        registry.register("S9_MASTER", MasterGainStage::new());
        registry.register("S10_MASTER_FINAL_LIMITS", FinalLimitsStage::new());
        registry
    }

    /// Register a stage under a contract id.
    pub fn register<S: Stage + 'static>(&mut self, id: impl Into<String>, stage: S) {
        self.stages.insert(id.into(), Box::new(stage));
    }

    /// Look up the stage for a contract id.
    pub fn get(&self, id: &str) -> Option<&dyn Stage> {
        self.stages.get(id).map(Box::as_ref)
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
