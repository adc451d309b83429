//! Pipeline orchestrator: runs a full job from ingest to report.
//!
//! ```text
//! resolve plan -> ingest -> initial mixdown -> run stages -> finalize
//! ```
//!
//! The orchestrator is transport-free: inputs come from a [`MediaSource`],
//! progress goes to a [`ProgressSink`], artifacts to an [`ArtifactSink`].
//! The worker loop provides the store-backed implementations of all three.
//!
//! [`MediaSource`]: crate::ports::MediaSource
//! [`ProgressSink`]: crate::ports::ProgressSink
//! [`ArtifactSink`]: crate::ports::ArtifactSink

pub mod errors;
mod pipeline;
mod plan;
mod report;

pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{JobOutcome, Orchestrator};
pub use plan::resolve_plan;
pub use report::{
    build_report, compute_final_metrics, PipelineDurations, Report, StageDuration,
    StageReportEntry, StageReportStatus, REPORT_ARTIFACT,
};
