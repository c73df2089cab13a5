use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizationReport;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A typed cell value after normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(s.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text rendering used for comparison and length; `None` for null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(Cow::Borrowed(s)),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

/// Integers without decimals, everything else as-is.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Where a record came from: source table id and 0-based data row index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub row: usize,
}

/// One row keyed by canonical field name. Holds every field of the applied template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub provenance: Provenance,
    pub values: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    /// Value of `field`; null when the field is unknown.
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn source(&self) -> &str {
        &self.provenance.source
    }

    pub fn row(&self) -> usize {
        self.provenance.row
    }
}

/// Records judged to be the same entity.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCluster {
    pub id: usize,
    pub members: Vec<NormalizedRecord>,
    /// Score of the weakest link that formed the cluster, in [0,1].
    pub confidence: f64,
}

impl MatchCluster {
    pub fn singleton(id: usize, record: NormalizedRecord) -> Self {
        Self {
            id,
            members: vec![record],
            confidence: 1.0,
        }
    }

    /// The founding record, compared against incoming records.
    pub fn representative(&self) -> &NormalizedRecord {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn push(&mut self, record: NormalizedRecord, score: f64) {
        self.confidence = self.confidence.min(score);
        self.members.push(record);
    }
}

// ---------------------------------------------------------------------------
// Merge output
// ---------------------------------------------------------------------------

/// A candidate value that lost resolution for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictNote {
    pub field: String,
    pub value: Value,
    pub source: String,
    pub row: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub cluster_id: usize,
    pub values: BTreeMap<String, Value>,
    /// Losing candidates per field; fields without conflicts are absent.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conflicts: BTreeMap<String, Vec<ConflictNote>>,
    pub members: Vec<Provenance>,
    pub member_count: usize,
    pub confidence: f64,
    /// Per-field sums of numeric values across the cluster.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub totals: BTreeMap<String, f64>,
}

impl MergedRecord {
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Conflict notes for one field (empty when the field resolved cleanly).
    pub fn conflicts_for(&self, field: &str) -> &[ConflictNote] {
        self.conflicts.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(Vec::len).sum()
    }
}

/// Two or more clusters tied for an incoming record; resolved by the tie-break.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousMatch {
    pub record: Provenance,
    pub score: f64,
    /// Cluster ids that shared the best score, winner first.
    pub candidates: Vec<usize>,
    pub chosen: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeMeta {
    pub session: String,
    pub template_id: String,
    pub sources: Vec<String>,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    pub total_input_rows: usize,
    pub rows_per_source: BTreeMap<String, usize>,
    pub clusters: usize,
    pub merged_rows: usize,
    pub unmatched_rows: usize,
    pub rows_with_conflicts: usize,
    pub conflict_notes: usize,
    pub ambiguous_matches: usize,
    pub normalization_warnings: usize,
    pub unmapped_columns: BTreeMap<String, Vec<String>>,
    pub missing_required: BTreeMap<String, Vec<String>>,
    /// Sum of every aggregated field across all records.
    pub field_totals: BTreeMap<String, f64>,
}

/// Complete, inspectable outcome of one merge session.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub meta: MergeMeta,
    /// Canonical fields in template order.
    pub fields: Vec<String>,
    /// One record per cluster with two or more members.
    pub merged: Vec<MergedRecord>,
    /// Singleton clusters.
    pub unmatched: Vec<MergedRecord>,
    pub reports: Vec<NormalizationReport>,
    pub ambiguous: Vec<AmbiguousMatch>,
    pub stats: MergeStats,
}

impl MergeResult {
    /// Merged records followed by unmatched ones.
    pub fn all_records(&self) -> impl Iterator<Item = &MergedRecord> {
        self.merged.iter().chain(self.unmatched.iter())
    }

    /// Warnings, conflicts and ambiguous matches recorded during the session.
    pub fn warning_count(&self) -> usize {
        self.stats.normalization_warnings + self.stats.conflict_notes + self.stats.ambiguous_matches
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    pub fn report_for(&self, source: &str) -> Option<&NormalizationReport> {
        self.reports.iter().find(|r| r.source_id == source)
    }
}
