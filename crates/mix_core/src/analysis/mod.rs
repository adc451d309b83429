//! Analysis records and pre/post stage diffs.
//!
//! Every stage's `analyse` call produces an [`AnalysisRecord`]; the runner
//! stores the pre-process record under the stage id and the post-process
//! record under `<stage_id>:post`, then derives a [`StageDiff`] from the
//! pair. Records are append-only within a job.

mod diff;
mod record;

pub use diff::{compute_diff, FieldDiff, StageDiff};
pub use record::{AnalysisRecord, MetricValue, StemAnalysis, POST_RECORD_SUFFIX};
