//! Musical key detection (analysis-only).

use crate::analysis::AnalysisRecord;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::detect_key;
use crate::orchestrator::errors::StageResult;
use crate::stages::Stage;

/// Estimates key and scale from the current mixdown via chromagram
/// profile matching. Purely informational: the result lands in the record
/// (and later in the report's final metrics) and nothing downstream
/// depends on it.
pub struct KeyDetectionStage;

impl KeyDetectionStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeyDetectionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for KeyDetectionStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let estimate = ctx
            .mixdown()
            .and_then(|mix| detect_key(mix, ctx.sample_rate()));

        match estimate {
            Some(estimate) => {
                record.set_session("is_tonal", true);
                record.set_session("detected_key", estimate.key);
                record.set_session("detected_scale", estimate.scale);
                record.set_session("key_confidence", estimate.confidence);
            }
            None => {
                record.set_session("is_tonal", false);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S1_KEY_DETECTION")
            .unwrap()
            .clone()
    }

    #[test]
    fn tonal_mixdown_reports_a_key() {
        let rate = 44_100u32;
        let frames = rate as usize * 2;
        // C major triad.
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f64 / rate as f64;
                let two_pi = 2.0 * std::f64::consts::PI;
                (((two_pi * 261.63 * t).sin()
                    + (two_pi * 329.63 * t).sin()
                    + (two_pi * 392.0 * t).sin())
                    / 3.0) as f32
            })
            .collect();

        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(rate);
        ctx.stems_mut().insert(
            "keys.wav".to_string(),
            Stem::new("keys.wav", rate, AudioBuffer::new(1, samples)),
        );
        ctx.refresh_mixdown();

        let record = KeyDetectionStage::new().analyse(&ctx, &contract()).unwrap();
        assert_eq!(
            record.session_value("detected_key").unwrap().as_text(),
            Some("C")
        );
    }

    #[test]
    fn silence_reports_atonal() {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(44_100);
        let record = KeyDetectionStage::new().analyse(&ctx, &contract()).unwrap();
        assert_eq!(
            record.session_value("is_tonal"),
            Some(&crate::analysis::MetricValue::Flag(false))
        );
        assert!(record.session_value("detected_key").is_none());
    }
}
