use std::collections::BTreeMap;

use crate::model::{AmbiguousMatch, MergeStats, MergedRecord};
use crate::normalize::NormalizationReport;

/// Compute session statistics from the resolved output.
pub fn compute_stats(
    reports: &[NormalizationReport],
    merged: &[MergedRecord],
    unmatched: &[MergedRecord],
    ambiguous: &[AmbiguousMatch],
) -> MergeStats {
    let mut rows_per_source = BTreeMap::new();
    let mut unmapped_columns = BTreeMap::new();
    let mut missing_required = BTreeMap::new();
    let mut normalization_warnings = 0;

    for report in reports {
        rows_per_source.insert(report.source_id.clone(), report.row_count);
        normalization_warnings += report.warnings.len();
        if !report.unmapped.is_empty() {
            unmapped_columns.insert(report.source_id.clone(), report.unmapped.clone());
        }
        if !report.missing_required.is_empty() {
            missing_required.insert(report.source_id.clone(), report.missing_required.clone());
        }
    }

    let mut rows_with_conflicts = 0;
    let mut conflict_notes = 0;
    let mut field_totals: BTreeMap<String, f64> = BTreeMap::new();

    for record in merged.iter().chain(unmatched) {
        if record.has_conflicts() {
            rows_with_conflicts += 1;
        }
        conflict_notes += record.conflict_count();
        for (field, total) in &record.totals {
            *field_totals.entry(field.clone()).or_insert(0.0) += total;
        }
    }

    MergeStats {
        total_input_rows: rows_per_source.values().sum(),
        rows_per_source,
        clusters: merged.len() + unmatched.len(),
        merged_rows: merged.len(),
        unmatched_rows: unmatched.len(),
        rows_with_conflicts,
        conflict_notes,
        ambiguous_matches: ambiguous.len(),
        normalization_warnings,
        unmapped_columns,
        missing_required,
        field_totals,
    }
}
