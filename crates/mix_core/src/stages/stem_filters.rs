//! Stem spectral cleanup: per-profile high-pass and low-pass (stems-DSP).

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::{high_pass, low_pass};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::stem_loudness::resolve_profile;
use crate::stages::Stage;

/// Cleanup cutoffs for an instrument profile: `(high-pass, low-pass)` Hz.
///
/// High-pass clears rumble under the instrument's useful range; the
/// low-pass is only applied where hiss above the range is all that's left.
fn cutoffs_for_profile(profile: &str) -> (Option<f64>, Option<f64>) {
    match profile {
        "Lead_Vocal" | "Backing_Vocal" => (Some(90.0), None),
        "Kick" => (Some(28.0), None),
        "Bass" => (Some(30.0), Some(8_000.0)),
        "Drums" | "Percussion" => (Some(40.0), None),
        "Guitar" | "Keys" | "Synth" => (Some(70.0), None),
        _ => (Some(60.0), None),
    }
}

pub struct StemFiltersStage;

impl StemFiltersStage {
    pub fn new() -> Self {
        Self
    }

    /// Contract limits bound how aggressive the cleanup may be: the
    /// high-pass never rises above `max_hpf_hz`, the low-pass never drops
    /// below `min_lpf_hz`.
    fn bounded_cutoffs(contract: &Contract, profile: &str) -> (Option<f64>, Option<f64>) {
        let (hpf, lpf) = cutoffs_for_profile(profile);
        let hpf = hpf.map(|hz| match contract.limit("max_hpf_hz") {
            Some(max) => hz.min(max),
            None => hz,
        });
        let lpf = lpf.map(|hz| match contract.limit("min_lpf_hz") {
            Some(min) => hz.max(min),
            None => hz,
        });
        (hpf, lpf)
    }
}

impl Default for StemFiltersStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for StemFiltersStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let mut filtered = 0u32;
        for stem in ctx.stems().values() {
            let profile = resolve_profile(ctx.metadata(), &stem.name).to_string();
            let (hpf, lpf) = Self::bounded_cutoffs(contract, &profile);
            if hpf.is_some() || lpf.is_some() {
                filtered += 1;
            }
            let mut block = StemAnalysis::new(&stem.name)
                .with("instrument_profile", profile)
                .with("rms_dbfs", crate::audio::rms_dbfs(&stem.buffer));
            if let Some(hz) = hpf {
                block = block.with("hpf_hz", hz);
            }
            if let Some(hz) = lpf {
                block = block.with("lpf_hz", hz);
            }
            record.push_stem(block);
        }
        record.set_parameter("stems_to_filter", filtered as f64);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        _pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let rate = ctx.sample_rate();
        let names: Vec<String> = ctx.stems().keys().cloned().collect();

        for name in names {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            let profile = resolve_profile(ctx.metadata(), &name).to_string();
            let (hpf, lpf) = Self::bounded_cutoffs(contract, &profile);

            let stem = ctx
                .stems_mut()
                .get_mut(&name)
                .expect("stem disappeared mid-stage");
            if let Some(hz) = hpf {
                high_pass(&mut stem.buffer, rate, hz);
            }
            if let Some(hz) = lpf {
                low_pass(&mut stem.buffer, rate, hz);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{rms_dbfs, AudioBuffer};
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;
    use crate::models::meta_keys;

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S4_STEM_HPF_LPF")
            .unwrap()
            .clone()
    }

    fn rumble_stem(rate: u32) -> AudioBuffer {
        let frames = rate as usize / 2;
        AudioBuffer::new(
            1,
            (0..frames)
                .map(|i| {
                    0.5 * (2.0 * std::f64::consts::PI * 20.0 * i as f64 / rate as f64).sin()
                        as f32
                })
                .collect(),
        )
    }

    #[test]
    fn vocal_profile_clears_rumble() {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(48_000);
        ctx.stems_mut().insert(
            "vox.wav".to_string(),
            Stem::new("vox.wav", 48_000, rumble_stem(48_000)),
        );
        ctx.apply_metadata(
            serde_json::json!({ (meta_keys::PROFILES_BY_NAME): {"vox.wav": "Lead_Vocal"} })
                .as_object()
                .unwrap(),
        );

        let before = rms_dbfs(&ctx.stems()["vox.wav"].buffer);
        let stage = StemFiltersStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        assert_eq!(
            pre.stem("vox.wav").unwrap().values["hpf_hz"].as_number(),
            Some(90.0)
        );

        stage.process(&mut ctx, &contract(), &pre).unwrap();
        let after = rms_dbfs(&ctx.stems()["vox.wav"].buffer);
        assert!(after < before - 20.0, "{before} -> {after}");
    }

    #[test]
    fn limits_bound_the_cutoffs() {
        let mut contract = contract();
        contract.limits.insert("max_hpf_hz".to_string(), 50.0);
        let (hpf, _) = StemFiltersStage::bounded_cutoffs(&contract, "Lead_Vocal");
        assert_eq!(hpf, Some(50.0));
    }
}
