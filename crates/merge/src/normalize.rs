//! Applies a header template to a raw table.
//!
//! Every row becomes one `NormalizedRecord` holding every canonical field of the
//! template. Nothing is dropped silently: unmapped columns, missing fields and
//! unparsable numbers are written to the `NormalizationReport`.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;

use crate::model::{NormalizedRecord, Provenance, Value};
use crate::table::RawTable;
use crate::template::{FieldKind, HeaderTemplate};

/// How one source column was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub column: usize,
    pub header: String,
    /// Canonical field the column feeds; `None` when unmapped or shadowed.
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    /// No canonical field accepts this header; its values are dropped.
    UnmappedColumn { column: usize, header: String },
    /// Several canonical fields claim the header; the first declared wins.
    AmbiguousAlias {
        header: String,
        chosen: String,
        also_claimed_by: Vec<String>,
    },
    /// A second column maps to an already-mapped field; the first column wins.
    DuplicateColumn {
        column: usize,
        header: String,
        field: String,
        kept_column: usize,
    },
    /// Required field absent from the headers; every row carries null for it.
    MissingRequiredField { field: String },
    /// Number field whose cell could not be parsed; kept as text.
    UnparsableNumber {
        row: usize,
        field: String,
        raw: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizationReport {
    pub source_id: String,
    pub template_id: String,
    pub row_count: usize,
    pub columns: Vec<ColumnMapping>,
    pub unmapped: Vec<String>,
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
    pub warnings: Vec<NormalizationWarning>,
}

impl NormalizationReport {
    pub fn mapped_fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|c| c.field.as_deref())
    }

    pub fn mapped_field_count(&self) -> usize {
        self.mapped_fields().count()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Normalize `table` against `template`. Row order is preserved; no row is dropped.
pub fn normalize(
    table: &RawTable,
    template: &HeaderTemplate,
) -> (Vec<NormalizedRecord>, NormalizationReport) {
    let mut warnings = Vec::new();
    let mut columns = Vec::with_capacity(table.headers().len());
    let mut unmapped = Vec::new();
    // field index -> source column feeding it
    let mut feeds: BTreeMap<usize, usize> = BTreeMap::new();

    for (column, header) in table.headers().iter().enumerate() {
        let claimants = template.claimants(header);
        let Some(field_idx) = template.resolve_header(header) else {
            unmapped.push(header.clone());
            warnings.push(NormalizationWarning::UnmappedColumn {
                column,
                header: header.clone(),
            });
            columns.push(ColumnMapping {
                column,
                header: header.clone(),
                field: None,
            });
            continue;
        };

        let field_name = template.fields[field_idx].name.clone();
        if claimants.len() > 1 {
            warnings.push(NormalizationWarning::AmbiguousAlias {
                header: header.clone(),
                chosen: field_name.clone(),
                also_claimed_by: claimants[1..].iter().map(|s| s.to_string()).collect(),
            });
        }

        if let Some(&kept_column) = feeds.get(&field_idx) {
            warnings.push(NormalizationWarning::DuplicateColumn {
                column,
                header: header.clone(),
                field: field_name,
                kept_column,
            });
            columns.push(ColumnMapping {
                column,
                header: header.clone(),
                field: None,
            });
            continue;
        }

        feeds.insert(field_idx, column);
        columns.push(ColumnMapping {
            column,
            header: header.clone(),
            field: Some(field_name),
        });
    }

    let mut missing_required = Vec::new();
    let mut missing_optional = Vec::new();
    for (idx, field) in template.fields.iter().enumerate() {
        if feeds.contains_key(&idx) {
            continue;
        }
        if field.required {
            missing_required.push(field.name.clone());
            warnings.push(NormalizationWarning::MissingRequiredField {
                field: field.name.clone(),
            });
        } else {
            missing_optional.push(field.name.clone());
        }
    }

    if !unmapped.is_empty() {
        warn!(
            "source '{}': {} unmapped column(s) dropped: {}",
            table.source_id,
            unmapped.len(),
            unmapped.join(", ")
        );
    }
    if !missing_required.is_empty() {
        warn!(
            "source '{}': missing required field(s) {}; rows carry null",
            table.source_id,
            missing_required.join(", ")
        );
    }

    let mut records = Vec::with_capacity(table.row_count());
    for (row_idx, row) in table.rows().iter().enumerate() {
        let mut values = BTreeMap::new();
        for (field_idx, field) in template.fields.iter().enumerate() {
            let value = match feeds.get(&field_idx) {
                None => Value::Null,
                Some(&col) => {
                    let raw = row.get(col).map(String::as_str).unwrap_or("");
                    convert_cell(raw, field.kind).unwrap_or_else(|| {
                        warnings.push(NormalizationWarning::UnparsableNumber {
                            row: row_idx,
                            field: field.name.clone(),
                            raw: raw.to_string(),
                        });
                        Value::text(raw.trim())
                    })
                }
            };
            values.insert(field.name.clone(), value);
        }
        records.push(NormalizedRecord {
            provenance: Provenance {
                source: table.source_id.clone(),
                row: row_idx,
            },
            values,
        });
    }

    debug!(
        "source '{}': normalized {} row(s) with template '{}' ({} of {} field(s) mapped, {} warning(s))",
        table.source_id,
        records.len(),
        template.id,
        feeds.len(),
        template.fields.len(),
        warnings.len()
    );

    let report = NormalizationReport {
        source_id: table.source_id.clone(),
        template_id: template.id.clone(),
        row_count: records.len(),
        columns,
        unmapped,
        missing_required,
        missing_optional,
        warnings,
    };

    (records, report)
}

/// Blank → null. Number fields parse or return `None`.
fn convert_cell(raw: &str, kind: FieldKind) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        FieldKind::Text => Some(Value::text(trimmed)),
        FieldKind::Number => parse_number(trimmed).map(Value::Number),
    }
}

/// Parse a number written with either decimal point or decimal comma.
///
/// Spaces and apostrophes are digit-group separators. When both `.` and `,`
/// appear, the last one is the decimal separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => {
            if cleaned.matches(',').count() > 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        _ => cleaned,
    };

    canonical
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}
