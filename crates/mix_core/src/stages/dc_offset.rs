//! Stem DC offset removal (stems-DSP).

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::dc_offset_per_channel;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

/// Fallback threshold when the contract does not declare `max_dc_offset`.
const DEFAULT_THRESHOLD: f64 = 0.002;

pub struct DcOffsetStage;

impl DcOffsetStage {
    pub fn new() -> Self {
        Self
    }

    fn threshold(contract: &Contract) -> f64 {
        contract.metric("max_dc_offset").unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Largest per-channel absolute offset of a stem.
    fn worst_offset(offsets: &[f64]) -> f64 {
        offsets.iter().fold(0.0f64, |m, &o| m.max(o.abs()))
    }
}

impl Default for DcOffsetStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for DcOffsetStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let threshold = Self::threshold(contract);

        let mut worst_session = 0.0f64;
        let mut flagged = 0u32;
        for stem in ctx.stems().values() {
            let offsets = dc_offset_per_channel(&stem.buffer);
            let worst = Self::worst_offset(&offsets);
            worst_session = worst_session.max(worst);
            if worst > threshold {
                flagged += 1;
            }
            record.push_stem(
                StemAnalysis::new(&stem.name)
                    .with("dc_offset", worst)
                    .with("needs_correction", worst > threshold),
            );
        }

        record.set_session("max_dc_offset_measured", worst_session);
        record.set_session("dc_offset_threshold", threshold);
        record.set_parameter("stems_to_correct", flagged as f64);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        _pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let threshold = Self::threshold(contract);

        let names: Vec<String> = ctx.stems().keys().cloned().collect();
        for name in names {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            let stem = ctx
                .stems_mut()
                .get_mut(&name)
                .expect("stem disappeared mid-stage");

            let offsets = dc_offset_per_channel(&stem.buffer);
            if Self::worst_offset(&offsets) <= threshold {
                continue;
            }

            let channels = stem.buffer.channels() as usize;
            for frame in stem.buffer.samples_mut().chunks_exact_mut(channels) {
                for (ch, s) in frame.iter_mut().enumerate() {
                    *s -= offsets[ch] as f32;
                }
            }
        }
        Ok(())
    }
}
