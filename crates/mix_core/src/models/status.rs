//! Status blobs published to the job store.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as seen by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are never overwritten by a later `running`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failure => write!(f, "failure"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final mixdown measurements attached to a terminal `success` status and
/// to the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalMetrics {
    /// Integrated loudness of the mixdown (LUFS).
    pub integrated_lufs: f64,
    /// Oversampled true peak (dBTP).
    pub true_peak_dbtp: f64,
    /// Loudness range (LU).
    pub loudness_range_lu: f64,
    /// Estimated tempo, when the material is periodic enough to tell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<f64>,
    /// Detected tonic, e.g. `"A"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Detected scale, `"major"` or `"minor"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    /// Absolute loudness difference between channels (dB).
    pub channel_loudness_diff_db: f64,
    /// Pearson correlation between the stereo channels.
    pub stereo_correlation: f64,
}

/// The job store value summarizing a job's current or terminal state.
///
/// Written whole on every update; last writer wins, and the worker loop
/// guarantees per-job write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBlob {
    pub job_id: String,
    pub status: JobStatus,
    /// Stages completed so far (0 before the first stage finishes).
    pub stage_index: u32,
    /// Stages in the resolved plan (0 while the plan is still unknown).
    pub total_stages: u32,
    /// Contract id of the most recent stage, or a lifecycle marker such as
    /// `"initializing"` / `"finished"`.
    pub stage_key: String,
    /// Human-readable progress line.
    pub message: String,
    /// Percentage in `[0, 100]`; exactly 100 iff the job succeeded.
    pub progress: f64,
    /// Mixdown metrics, present on terminal success only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FinalMetrics>,
    /// Names of the published artifacts, present on terminal success only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
    /// Error classification, present on terminal failure only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Stage that failed, when the failure is attributable to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<String>,
}

impl StatusBlob {
    /// A `running` blob for the given position in the plan.
    pub fn running(
        job_id: impl Into<String>,
        stage_index: u32,
        total_stages: u32,
        stage_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let progress = if total_stages == 0 {
            0.0
        } else {
            f64::from(stage_index) / f64::from(total_stages) * 100.0
        };
        Self {
            job_id: job_id.into(),
            status: JobStatus::Running,
            stage_index,
            total_stages,
            stage_key: stage_key.into(),
            message: message.into(),
            progress,
            metrics: None,
            artifacts: None,
            error_kind: None,
            error_stage: None,
        }
    }

    /// Terminal success blob; progress is pinned at 100.
    pub fn success(
        job_id: impl Into<String>,
        total_stages: u32,
        metrics: FinalMetrics,
        artifacts: Vec<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Success,
            stage_index: total_stages,
            total_stages,
            stage_key: "finished".to_string(),
            message: "Mix pipeline finished successfully.".to_string(),
            progress: 100.0,
            metrics: Some(metrics),
            artifacts: Some(artifacts),
            error_kind: None,
            error_stage: None,
        }
    }

    /// Terminal failure blob. Progress is clamped below 100 so that
    /// `progress == 100` remains equivalent to success even when the
    /// failure happened after the last stage.
    pub fn failure(
        job_id: impl Into<String>,
        stage_index: u32,
        total_stages: u32,
        error_kind: impl Into<String>,
        error_stage: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let progress = if total_stages == 0 {
            0.0
        } else {
            (f64::from(stage_index) / f64::from(total_stages) * 100.0).min(99.0)
        };
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failure,
            stage_index,
            total_stages,
            stage_key: "failed".to_string(),
            message: message.into(),
            progress,
            metrics: None,
            artifacts: None,
            error_kind: Some(error_kind.into()),
            error_stage,
        }
    }

    /// Terminal cancelled blob; progress reflects the last completed stage
    /// and is clamped below 100.
    pub fn cancelled(job_id: impl Into<String>, stage_index: u32, total_stages: u32) -> Self {
        let progress = if total_stages == 0 {
            0.0
        } else {
            (f64::from(stage_index) / f64::from(total_stages) * 100.0).min(99.0)
        };
        Self {
            job_id: job_id.into(),
            status: JobStatus::Cancelled,
            stage_index,
            total_stages,
            stage_key: "cancelled".to_string(),
            message: "Job cancelled.".to_string(),
            progress,
            metrics: None,
            artifacts: None,
            error_kind: None,
            error_stage: None,
        }
    }
}
