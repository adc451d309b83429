//! Error taxonomy for the pipeline runtime.
//!
//! Stages return [`StageError`]; the stage runner catches those and
//! classifies them into [`PipelineError`]. Above the runner, errors travel
//! as values: the orchestrator publishes a terminal `failure` status with
//! the error kind and returns, and the worker loop acknowledges the queue
//! message without retrying.

use thiserror::Error;

/// Leaf error a stage's `analyse` or `process` call may raise.
#[derive(Error, Debug)]
pub enum StageError {
    /// A record this stage needs was not found in the context.
    #[error("required analysis record '{stage_id}' not found")]
    MissingRecord { stage_id: String },

    /// Session metadata was present but unusable.
    #[error("bad metadata for {what}: {message}")]
    BadMetadata { what: String, message: String },

    /// Audio data violated an assumption (empty mixdown, zero rate, ...).
    #[error("audio precondition not met: {0}")]
    Precondition(String),

    /// The stage observed the cancellation flag at a checkpoint.
    #[error("stage observed cancellation")]
    Cancelled,

    /// Anything else, with a message.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn missing_record(stage_id: impl Into<String>) -> Self {
        Self::MissingRecord {
            stage_id: stage_id.into(),
        }
    }

    pub fn bad_metadata(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadMetadata {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Surface-level error taxonomy; each variant carries the stage id where
/// one is attributable.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Contract id not declared in the registry.
    #[error("unknown stage '{stage_id}'")]
    UnknownStage { stage_id: String },

    /// An enabled stage's dependency is missing from the enabled set.
    #[error("invalid plan: '{stage_id}' requires '{dependency}' which is not enabled")]
    InvalidPlan {
        stage_id: String,
        dependency: String,
    },

    /// No stems resolvable from the job's media reference.
    #[error("no input stems: {message}")]
    InputMissing { message: String },

    /// A stage ran before its declared prerequisite produced a record.
    #[error("stage '{stage_id}' ran before dependency '{dependency}' produced a record")]
    DependencyMissing {
        stage_id: String,
        dependency: String,
    },

    /// The stage's analyse call failed.
    #[error("analysis failed in '{stage_id}': {source}")]
    AnalysisFailed {
        stage_id: String,
        #[source]
        source: StageError,
    },

    /// The stage's process call failed.
    #[error("processing failed in '{stage_id}': {source}")]
    ProcessFailed {
        stage_id: String,
        #[source]
        source: StageError,
    },

    /// The job store refused an artifact write.
    #[error("failed to write artifact '{name}': {message}")]
    ArtifactWriteFailed { name: String, message: String },

    /// Cooperative cancellation was observed.
    #[error("job cancelled{}", stage_id.as_deref().map(|s| format!(" during '{s}'")).unwrap_or_default())]
    Cancelled { stage_id: Option<String> },
}

impl PipelineError {
    pub fn unknown_stage(stage_id: impl Into<String>) -> Self {
        Self::UnknownStage {
            stage_id: stage_id.into(),
        }
    }

    pub fn invalid_plan(stage_id: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::InvalidPlan {
            stage_id: stage_id.into(),
            dependency: dependency.into(),
        }
    }

    pub fn input_missing(message: impl Into<String>) -> Self {
        Self::InputMissing {
            message: message.into(),
        }
    }

    pub fn dependency_missing(stage_id: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::DependencyMissing {
            stage_id: stage_id.into(),
            dependency: dependency.into(),
        }
    }

    pub fn analysis_failed(stage_id: impl Into<String>, source: StageError) -> Self {
        Self::AnalysisFailed {
            stage_id: stage_id.into(),
            source,
        }
    }

    pub fn process_failed(stage_id: impl Into<String>, source: StageError) -> Self {
        Self::ProcessFailed {
            stage_id: stage_id.into(),
            source,
        }
    }

    pub fn artifact_write_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArtifactWriteFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(stage_id: Option<String>) -> Self {
        Self::Cancelled { stage_id }
    }

    /// Stable kind name for status blobs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnknownStage { .. } => "UnknownStage",
            PipelineError::InvalidPlan { .. } => "InvalidPlan",
            PipelineError::InputMissing { .. } => "InputMissing",
            PipelineError::DependencyMissing { .. } => "DependencyMissing",
            PipelineError::AnalysisFailed { .. } => "AnalysisFailed",
            PipelineError::ProcessFailed { .. } => "ProcessFailed",
            PipelineError::ArtifactWriteFailed { .. } => "ArtifactWriteFailed",
            PipelineError::Cancelled { .. } => "Cancelled",
        }
    }

    /// The stage this error is attributable to, when there is one.
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            PipelineError::UnknownStage { stage_id }
            | PipelineError::InvalidPlan { stage_id, .. }
            | PipelineError::DependencyMissing { stage_id, .. }
            | PipelineError::AnalysisFailed { stage_id, .. }
            | PipelineError::ProcessFailed { stage_id, .. } => Some(stage_id),
            PipelineError::Cancelled { stage_id } => stage_id.as_deref(),
            _ => None,
        }
    }

    /// True for the cancellation outcome (terminal `cancelled`, not
    /// `failure`).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_chain_stage_context() {
        let err = PipelineError::process_failed(
            "S5_STEM_DYNAMICS",
            StageError::precondition("empty mixdown"),
        );
        let msg = err.to_string();
        assert!(msg.contains("S5_STEM_DYNAMICS"));
        assert_eq!(err.kind(), "ProcessFailed");
        assert_eq!(err.stage_id(), Some("S5_STEM_DYNAMICS"));
    }

    #[test]
    fn cancellation_is_not_a_failure_kind() {
        let err = PipelineError::cancelled(Some("S9_MASTER".to_string()));
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("S9_MASTER"));
    }

    #[test]
    fn invalid_plan_names_both_sides() {
        let err = PipelineError::invalid_plan("X", "Y");
        let msg = err.to_string();
        assert!(msg.contains('X') && msg.contains('Y'));
    }
}
