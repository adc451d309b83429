//! Contract data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a stage interacts with the audio in the job context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Measures only; must not mutate audio, metadata or artifacts.
    AnalysisOnly,
    /// Rewrites stem buffers in place; the runner refreshes the mixdown
    /// afterwards.
    StemsDsp,
    /// Rewrites the mixdown in place; no automatic refresh.
    MixdownDsp,
    /// May replace or add stems and change the session sample rate; the
    /// runner refreshes the mixdown afterwards.
    Structural,
}

impl StageKind {
    /// Whether the runner must rebuild the mixdown after `process`.
    pub fn refreshes_mixdown(&self) -> bool {
        matches!(self, StageKind::StemsDsp | StageKind::Structural)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::AnalysisOnly => write!(f, "analysis-only"),
            StageKind::StemsDsp => write!(f, "stems-dsp"),
            StageKind::MixdownDsp => write!(f, "mixdown-dsp"),
            StageKind::Structural => write!(f, "structural"),
        }
    }
}

/// Static declaration of one stage.
///
/// Contracts are read-only after load; stages receive a reference and copy
/// the `metrics`/`limits` tables into their analysis records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Unique id, matches the stage code registered for it.
    pub id: String,

    /// Default plan position; ascending, ties broken by id.
    pub ordinal: u32,

    /// Human-readable stage name for logs and the report.
    pub name: String,

    /// Interaction class.
    pub kind: StageKind,

    /// Stages that must have produced an analysis record before this one
    /// runs.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Targets the stage tries to achieve (name -> value).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Hard bounds on how much the stage may change per run.
    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
}

impl Contract {
    /// Look up a metric target.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// Look up a change limit.
    pub fn limit(&self, key: &str) -> Option<f64> {
        self.limits.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&StageKind::AnalysisOnly).unwrap(),
            r#""analysis-only""#
        );
        assert_eq!(
            serde_json::to_string(&StageKind::StemsDsp).unwrap(),
            r#""stems-dsp""#
        );
    }

    #[test]
    fn refresh_rules_follow_kind() {
        assert!(StageKind::StemsDsp.refreshes_mixdown());
        assert!(StageKind::Structural.refreshes_mixdown());
        assert!(!StageKind::MixdownDsp.refreshes_mixdown());
        assert!(!StageKind::AnalysisOnly.refreshes_mixdown());
    }

    #[test]
    fn contract_parses_with_defaults() {
        let contract: Contract = serde_json::from_str(
            r#"{"id":"X","ordinal":5,"name":"X stage","kind":"analysis-only"}"#,
        )
        .unwrap();
        assert!(contract.depends_on.is_empty());
        assert!(contract.metric("anything").is_none());
    }
}
