//! Per-job logging.
//!
//! Process-level diagnostics go through `tracing`; each job additionally
//! gets its own [`JobLogger`] that writes a human-readable log file and
//! can mirror lines to a callback (the HTTP surface streams these to the
//! client). Stages never log directly - the runner and orchestrator own
//! the narrative.

mod job_logger;
mod types;

pub use job_logger::JobLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};
