//! The queue message describing a submitted job.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata keys the pipeline recognizes in a job envelope.
///
/// Anything else in the metadata map is carried through untouched and
/// ignored by the standard stages.
pub mod meta_keys {
    /// Mix/master style preset name (e.g. `"Flamenco_Rumba"`).
    pub const STYLE_PRESET: &str = "style_preset";
    /// Map of stem file name to instrument profile name.
    pub const PROFILES_BY_NAME: &str = "profiles_by_name";
    /// Map of bus name to space/depth style choice.
    pub const BUS_STYLES: &str = "bus_styles";
    /// Hints about how the stems were uploaded (single file vs multitrack).
    pub const UPLOAD_MODE: &str = "upload_mode";
    /// Per-stem manual corrections applied by the structural adjustment stage.
    pub const MANUAL_CORRECTIONS: &str = "manual_corrections";
}

/// A job submission popped from the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Globally unique job identifier (assigned by the submitter).
    pub job_id: String,

    /// Opaque locator understood by the configured media source
    /// (a directory name, a store reference, ...).
    pub media_ref: String,

    /// Stages to run, in any order (plan order comes from the contracts).
    /// `None` means "run everything"; an empty list is a valid passthrough
    /// job that only ingests and renders the raw mixdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_stage_ids: Option<Vec<String>>,

    /// Free-form session metadata; see [`meta_keys`] for recognized keys.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl JobEnvelope {
    /// Create an envelope that runs the full standard plan.
    pub fn new(job_id: impl Into<String>, media_ref: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            media_ref: media_ref.into(),
            enabled_stage_ids: None,
            metadata: Map::new(),
        }
    }

    /// Restrict the plan to the given stage ids.
    pub fn with_stages<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_stage_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a metadata value.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The style preset, if the submitter chose one.
    pub fn style_preset(&self) -> Option<&str> {
        self.metadata.get(meta_keys::STYLE_PRESET)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let envelope = JobEnvelope::new("job-1", "uploads/job-1")
            .with_stages(["S1_STEM_WORKING_LOUDNESS"])
            .with_meta(meta_keys::STYLE_PRESET, Value::from("Pop_Modern"));

        let json = serde_json::to_string(&envelope).unwrap();
        let back: JobEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "job-1");
        assert_eq!(back.enabled_stage_ids.as_deref().unwrap().len(), 1);
        assert_eq!(back.style_preset(), Some("Pop_Modern"));
    }

    #[test]
    fn missing_optional_fields_default() {
        let back: JobEnvelope =
            serde_json::from_str(r#"{"job_id":"j","media_ref":"m"}"#).unwrap();
        assert!(back.enabled_stage_ids.is_none());
        assert!(back.metadata.is_empty());
    }
}
