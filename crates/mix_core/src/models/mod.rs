//! Wire-facing data types: job envelopes and status blobs.
//!
//! Everything here is plain serde data. The queue payload and the status
//! value stored per job are both JSON documents; non-finite metric values
//! serialize as `null` (serde_json's behavior), so a blob is always
//! encodable no matter what the meters measured.

mod envelope;
mod status;

pub use envelope::{meta_keys, JobEnvelope};
pub use status::{FinalMetrics, JobStatus, StatusBlob};
