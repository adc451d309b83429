//! Pairwise numeric comparison of pre- and post-analysis records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::record::{AnalysisRecord, MetricValue};

/// Threshold below which a numeric change counts as "unchanged".
const CHANGE_EPSILON: f64 = 1e-3;

/// Before/after comparison of one numeric field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub before: MetricValue,
    pub after: MetricValue,
    pub delta: MetricValue,
    pub changed: bool,
}

impl FieldDiff {
    fn numeric(before: f64, after: f64) -> Self {
        // Equal values (including two infinities of the same sign) did not
        // change; a transition between non-finite and finite is an infinite
        // jump, always a change.
        let delta = if before == after {
            0.0
        } else if before.is_finite() && after.is_finite() {
            after - before
        } else if after == f64::INFINITY || before == f64::NEG_INFINITY {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        let changed = delta.abs() >= CHANGE_EPSILON;
        Self {
            before: before.into(),
            after: after.into(),
            delta: delta.into(),
            changed,
        }
    }
}

/// Structured difference between two analysis records of the same stage.
///
/// Session fields are keyed lexicographically, stems by file name; only
/// numeric fields present in both records are compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageDiff {
    pub session: BTreeMap<String, FieldDiff>,
    pub stems: BTreeMap<String, BTreeMap<String, FieldDiff>>,
}

impl StageDiff {
    /// True when no compared field changed.
    pub fn is_unchanged(&self) -> bool {
        self.session.values().all(|d| !d.changed)
            && self
                .stems
                .values()
                .all(|fields| fields.values().all(|d| !d.changed))
    }

    /// Total number of changed fields across session and stems.
    pub fn changed_count(&self) -> usize {
        self.session.values().filter(|d| d.changed).count()
            + self
                .stems
                .values()
                .flat_map(|fields| fields.values())
                .filter(|d| d.changed)
                .count()
    }
}

fn diff_value_maps(
    pre: &BTreeMap<String, MetricValue>,
    post: &BTreeMap<String, MetricValue>,
) -> BTreeMap<String, FieldDiff> {
    let mut out = BTreeMap::new();
    for (key, pre_value) in pre {
        let (Some(before), Some(after)) = (
            pre_value.as_number(),
            post.get(key).and_then(MetricValue::as_number),
        ) else {
            continue;
        };
        if before.is_nan() || after.is_nan() {
            continue;
        }
        out.insert(key.clone(), FieldDiff::numeric(before, after));
    }
    out
}

/// Compare two records of the same stage field-by-field.
pub fn compute_diff(pre: &AnalysisRecord, post: &AnalysisRecord) -> StageDiff {
    let session = diff_value_maps(&pre.session, &post.session);

    let mut stems = BTreeMap::new();
    for pre_stem in &pre.stems {
        let Some(post_stem) = post.stem(&pre_stem.file_name) else {
            continue;
        };
        let fields = diff_value_maps(&pre_stem.values, &post_stem.values);
        if !fields.is_empty() {
            stems.insert(pre_stem.file_name.clone(), fields);
        }
    }

    StageDiff { session, stems }
}
