//! The structured measurement output of one analyse call.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::contracts::Contract;

/// Shadow-key suffix under which post-process records are stored.
pub const POST_RECORD_SUFFIX: &str = ":post";

/// A single measured or decided value inside an analysis record.
///
/// Numbers keep their full `f64` range internally (`-inf` is a meaningful
/// level for silence); serialization sanitizes non-finite values to `null`
/// so records stay JSON-encodable.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl MetricValue {
    /// The numeric value, when this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text value, when this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Flag(value)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            MetricValue::Number(_) => serializer.serialize_none(),
            MetricValue::Text(t) => serializer.serialize_str(t),
            MetricValue::Flag(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => Ok(MetricValue::Number(
                n.as_f64().ok_or_else(|| D::Error::custom("number out of f64 range"))?,
            )),
            serde_json::Value::String(s) => Ok(MetricValue::Text(s)),
            serde_json::Value::Bool(b) => Ok(MetricValue::Flag(b)),
            // Sanitized non-finite values come back as null.
            serde_json::Value::Null => Ok(MetricValue::Number(f64::NAN)),
            other => Err(D::Error::custom(format!(
                "unsupported metric value: {other}"
            ))),
        }
    }
}

/// Per-stem measurement block. `file_name` is the stem key; everything
/// else is stage-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemAnalysis {
    pub file_name: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, MetricValue>,
}

impl StemAnalysis {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style value insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// Output of one `analyse` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Contract this record was produced under.
    pub contract_id: String,
    /// Stage id; equals `contract_id` for every standard stage.
    pub stage_id: String,
    /// Copy of the contract's metric targets at analysis time.
    pub metrics_from_contract: BTreeMap<String, f64>,
    /// Copy of the contract's change limits at analysis time.
    pub limits_from_contract: BTreeMap<String, f64>,
    /// Session-level (aggregate) measurements.
    pub session: BTreeMap<String, MetricValue>,
    /// Processing parameters the stage decided on (what `process` will
    /// apply, or applied). Empty for pure measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, MetricValue>,
    /// Per-stem measurements, ordered by file name.
    pub stems: Vec<StemAnalysis>,
}

impl AnalysisRecord {
    /// Start a record for the given contract, copying its targets and
    /// limits.
    pub fn for_contract(contract: &Contract) -> Self {
        Self {
            contract_id: contract.id.clone(),
            stage_id: contract.id.clone(),
            metrics_from_contract: contract.metrics.clone(),
            limits_from_contract: contract.limits.clone(),
            session: BTreeMap::new(),
            parameters: BTreeMap::new(),
            stems: Vec::new(),
        }
    }

    /// Insert a session-level value.
    pub fn set_session(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.session.insert(key.into(), value.into());
    }

    /// Insert a decided processing parameter.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Append a per-stem block, keeping the list sorted by file name.
    pub fn push_stem(&mut self, stem: StemAnalysis) {
        let at = self
            .stems
            .partition_point(|s| s.file_name < stem.file_name);
        self.stems.insert(at, stem);
    }

    /// Session value lookup.
    pub fn session_value(&self, key: &str) -> Option<&MetricValue> {
        self.session.get(key)
    }

    /// Numeric session value lookup.
    pub fn session_number(&self, key: &str) -> Option<f64> {
        self.session.get(key).and_then(MetricValue::as_number)
    }

    /// Numeric parameter lookup.
    pub fn parameter_number(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(MetricValue::as_number)
    }

    /// Per-stem block lookup.
    pub fn stem(&self, file_name: &str) -> Option<&StemAnalysis> {
        self.stems.iter().find(|s| s.file_name == file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::StageKind;

    fn contract() -> Contract {
        Contract {
            id: "S_TEST".to_string(),
            ordinal: 1,
            name: "Test stage".to_string(),
            kind: StageKind::AnalysisOnly,
            depends_on: Vec::new(),
            metrics: BTreeMap::from([("target_lufs".to_string(), -14.0)]),
            limits: BTreeMap::from([("max_gain_db".to_string(), 6.0)]),
        }
    }

    #[test]
    fn record_copies_contract_tables() {
        let record = AnalysisRecord::for_contract(&contract());
        assert_eq!(record.metrics_from_contract["target_lufs"], -14.0);
        assert_eq!(record.limits_from_contract["max_gain_db"], 6.0);
    }

    #[test]
    fn stems_stay_sorted_by_file_name() {
        let mut record = AnalysisRecord::for_contract(&contract());
        record.push_stem(StemAnalysis::new("b.wav"));
        record.push_stem(StemAnalysis::new("a.wav"));
        record.push_stem(StemAnalysis::new("c.wav"));
        let names: Vec<_> = record.stems.iter().map(|s| s.file_name.clone()).collect();
        assert_eq!(names, vec!["a.wav", "b.wav", "c.wav"]);
    }

    #[test]
    fn non_finite_serializes_as_null() {
        let mut record = AnalysisRecord::for_contract(&contract());
        record.set_session("peak_dbfs", f64::NEG_INFINITY);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""peak_dbfs":null"#));
    }

    #[test]
    fn mixed_value_kinds_round_trip() {
        let mut record = AnalysisRecord::for_contract(&contract());
        record.set_session("detected_key", "A");
        record.set_session("is_tonal", true);
        record.set_session("lufs", -12.5);

        let json = serde_json::to_string(&record).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_value("detected_key").unwrap().as_text(), Some("A"));
        assert_eq!(back.session_number("lufs"), Some(-12.5));
    }
}
