//! Per-job mutable state.
//!
//! The [`JobContext`] owns every stem buffer, the working mixdown, the
//! analysis records and the staged artifacts for exactly one job. It is
//! single-writer: only the stage runner (on behalf of the orchestrator)
//! mutates it, and stages receive it by reference for the duration of one
//! call. Nothing here performs I/O; byte buffers come in from the media
//! source and leave through the artifact sink.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::analysis::AnalysisRecord;
use crate::audio::{mix_stems, wav, AudioBuffer};

/// Context-level failures, mapped into the pipeline error taxonomy by the
/// layer that observes them.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("no stems resolvable from the job inputs")]
    InputMissing,

    #[error("stage '{0}' already has an analysis record in this pass")]
    DuplicateAnalysis(String),
}

/// Handle for requesting cooperative cancellation of a job.
///
/// The flag is monotonic: once set it never clears. Stages observe it via
/// [`JobContext::is_cancelled`] at their natural checkpoints.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// A fresh, un-cancelled handle.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation; the job stops at its next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One input track: immutable identity plus a mutable PCM buffer.
#[derive(Debug, Clone)]
pub struct Stem {
    /// Original file name; the stem's identity for records and diffs.
    pub name: String,
    /// The rate this stem's buffer is currently sampled at. Matches the
    /// context rate except between ingest and the structural format stage.
    pub rate_hz: u32,
    /// Sample data, mono or stereo.
    pub buffer: AudioBuffer,
}

impl Stem {
    pub fn new(name: impl Into<String>, rate_hz: u32, buffer: AudioBuffer) -> Self {
        Self {
            name: name.into(),
            rate_hz,
            buffer,
        }
    }
}

/// Wall-clock duration of one executed stage.
#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage_id: String,
    pub duration: Duration,
}

/// All mutable state for one job.
pub struct JobContext {
    job_id: String,
    sample_rate: u32,
    stems: BTreeMap<String, Stem>,
    mixdown: Option<AudioBuffer>,
    metadata: Map<String, Value>,
    analysis_results: BTreeMap<String, AnalysisRecord>,
    timings: Vec<StageTiming>,
    artifacts: BTreeMap<String, Vec<u8>>,
    cancelled: CancelHandle,
}

impl JobContext {
    /// Create an empty context for a job.
    pub fn new(job_id: impl Into<String>, cancel: CancelHandle) -> Self {
        Self {
            job_id: job_id.into(),
            sample_rate: 0,
            stems: BTreeMap::new(),
            mixdown: None,
            metadata: Map::new(),
            analysis_results: BTreeMap::new(),
            timings: Vec::new(),
            artifacts: BTreeMap::new(),
            cancelled: cancel,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The authoritative session sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Rewrite the session sample rate. Reserved for structural stages;
    /// all later stages observe the new rate without conversion.
    pub fn set_sample_rate(&mut self, rate_hz: u32) {
        self.sample_rate = rate_hz;
    }

    // ---- stems -----------------------------------------------------------

    /// Populate the stems from named WAV byte buffers.
    ///
    /// `full_song.wav` and non-WAV names are skipped; undecodable buffers
    /// are logged and skipped (a bad upload should not sink the stems that
    /// did decode). The first stem read establishes the session sample
    /// rate; later stems keep their own rate on the side for the
    /// structural format stage to reconcile.
    ///
    /// Fails with [`ContextError::InputMissing`] when nothing decodes.
    pub fn load_stems(
        &mut self,
        sources: &BTreeMap<String, Vec<u8>>,
    ) -> Result<usize, ContextError> {
        let mut loaded = 0usize;
        for (name, bytes) in sources {
            if name.eq_ignore_ascii_case("full_song.wav") {
                continue;
            }
            if !name.to_ascii_lowercase().ends_with(".wav") {
                continue;
            }
            let decoded = match wav::decode(bytes) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, stem = %name, "skipping undecodable stem: {e}");
                    continue;
                }
            };
            if self.sample_rate == 0 {
                self.sample_rate = decoded.sample_rate;
            } else if decoded.sample_rate != self.sample_rate {
                tracing::warn!(
                    job_id = %self.job_id,
                    stem = %name,
                    rate = decoded.sample_rate,
                    session_rate = self.sample_rate,
                    "stem sample rate differs from session; the format stage will resample"
                );
            }
            self.stems.insert(
                name.clone(),
                Stem::new(name.clone(), decoded.sample_rate, decoded.buffer),
            );
            loaded += 1;
        }

        if loaded == 0 {
            return Err(ContextError::InputMissing);
        }
        Ok(loaded)
    }

    pub fn stems(&self) -> &BTreeMap<String, Stem> {
        &self.stems
    }

    pub fn stems_mut(&mut self) -> &mut BTreeMap<String, Stem> {
        &mut self.stems
    }

    /// Longest stem length in frames (0 with no stems).
    pub fn max_stem_frames(&self) -> usize {
        self.stems
            .values()
            .map(|s| s.buffer.frames())
            .max()
            .unwrap_or(0)
    }

    // ---- mixdown ---------------------------------------------------------

    /// Recompute the mixdown as the stereo sum of the current stems.
    ///
    /// Pure function of the current stems: zero-padded to the longest stem,
    /// mono duplicated to both channels, no level normalization.
    pub fn refresh_mixdown(&mut self) {
        self.mixdown = mix_stems(&self.stems);
    }

    pub fn mixdown(&self) -> Option<&AudioBuffer> {
        self.mixdown.as_ref()
    }

    pub fn mixdown_mut(&mut self) -> Option<&mut AudioBuffer> {
        self.mixdown.as_mut()
    }

    /// Replace the mixdown buffer (mixdown-DSP stages rewrite in place or
    /// via this).
    pub fn set_mixdown(&mut self, buffer: AudioBuffer) {
        self.mixdown = Some(buffer);
    }

    // ---- metadata --------------------------------------------------------

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Merge submission metadata into the context.
    pub fn apply_metadata(&mut self, metadata: &Map<String, Value>) {
        for (key, value) in metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// String metadata lookup.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)?.as_str()
    }

    // ---- analysis records ------------------------------------------------

    /// Insert a record; append-only within a job.
    pub fn record_analysis(
        &mut self,
        stage_id: impl Into<String>,
        record: AnalysisRecord,
    ) -> Result<(), ContextError> {
        let stage_id = stage_id.into();
        if self.analysis_results.contains_key(&stage_id) {
            return Err(ContextError::DuplicateAnalysis(stage_id));
        }
        self.analysis_results.insert(stage_id, record);
        Ok(())
    }

    pub fn analysis_results(&self) -> &BTreeMap<String, AnalysisRecord> {
        &self.analysis_results
    }

    pub fn analysis(&self, stage_id: &str) -> Option<&AnalysisRecord> {
        self.analysis_results.get(stage_id)
    }

    pub fn has_analysis(&self, stage_id: &str) -> bool {
        self.analysis_results.contains_key(stage_id)
    }

    // ---- timings ---------------------------------------------------------

    pub fn record_timing(&mut self, stage_id: impl Into<String>, duration: Duration) {
        self.timings.push(StageTiming {
            stage_id: stage_id.into(),
            duration,
        });
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    // ---- artifacts -------------------------------------------------------

    /// Stage an artifact in memory. Staging may overwrite (the mixdown is
    /// re-rendered after every stage); the store-side write-once rule
    /// applies when the orchestrator flushes.
    pub fn put_artifact(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts.insert(name.into(), bytes);
    }

    pub fn get_artifact(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn artifacts(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.artifacts
    }

    // ---- cancellation ----------------------------------------------------

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancelled.clone()
    }

    pub fn request_cancel(&self) {
        self.cancelled.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}
