// Merge result export (CSV directory or XLSX workbook)

use std::path::{Path, PathBuf};

use listmerge_engine::{MergeResult, MergedRecord, Value};
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::IoError;

pub const MERGED_CSV: &str = "merged.csv";
pub const UNMATCHED_CSV: &str = "unmatched.csv";
pub const CONFLICTS_CSV: &str = "conflicts.csv";

/// Files written by an export.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub records: usize,
    pub conflicts: usize,
}

// ---------------------------------------------------------------------------
// Shared table layout
// ---------------------------------------------------------------------------

/// Columns of the merged/unmatched tables: bookkeeping, fields, totals, provenance.
fn record_header(result: &MergeResult) -> Vec<String> {
    let mut header = vec![
        "cluster_id".to_string(),
        "member_count".to_string(),
        "confidence".to_string(),
    ];
    header.extend(result.fields.iter().cloned());
    header.extend(total_fields(result).iter().map(|f| format!("total_{f}")));
    header.push("sources".to_string());
    header
}

fn total_fields(result: &MergeResult) -> Vec<String> {
    result.stats.field_totals.keys().cloned().collect()
}

fn record_cells(result: &MergeResult, record: &MergedRecord) -> Vec<Value> {
    let mut cells = vec![
        Value::Number(record.cluster_id as f64),
        Value::Number(record.member_count as f64),
        Value::Number(record.confidence),
    ];
    cells.extend(result.fields.iter().map(|f| record.value(f).clone()));
    cells.extend(
        total_fields(result)
            .iter()
            .map(|f| record.totals.get(f).map_or(Value::Null, |t| Value::Number(*t))),
    );
    cells.push(Value::Text(provenance_list(record)));
    cells
}

/// `source:row` pairs, rows 1-based as a user sees them.
fn provenance_list(record: &MergedRecord) -> String {
    record
        .members
        .iter()
        .map(|p| format!("{}:{}", p.source, p.row + 1))
        .collect::<Vec<_>>()
        .join("; ")
}

const CONFLICT_HEADER: [&str; 6] = ["cluster_id", "field", "chosen", "value", "source", "row"];

fn conflict_rows(result: &MergeResult) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    for record in result.all_records() {
        for (field, notes) in &record.conflicts {
            for note in notes {
                rows.push(vec![
                    Value::Number(record.cluster_id as f64),
                    Value::Text(field.clone()),
                    record.value(field).clone(),
                    note.value.clone(),
                    Value::Text(note.source.clone()),
                    Value::Number((note.row + 1) as f64),
                ]);
            }
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write `merged.csv`, `unmatched.csv` and `conflicts.csv` into `dir`.
pub fn write_csv(result: &MergeResult, dir: &Path) -> Result<ExportSummary, IoError> {
    std::fs::create_dir_all(dir).map_err(|e| IoError::write(dir, e))?;

    let header = record_header(result);
    let to_rows = |records: &[MergedRecord]| -> Vec<Vec<Value>> {
        records.iter().map(|r| record_cells(result, r)).collect()
    };
    let conflicts = conflict_rows(result);

    let mut summary = ExportSummary {
        records: result.merged.len() + result.unmatched.len(),
        conflicts: conflicts.len(),
        ..Default::default()
    };

    let targets = [
        (MERGED_CSV, header.clone(), to_rows(&result.merged)),
        (UNMATCHED_CSV, header, to_rows(&result.unmatched)),
        (
            CONFLICTS_CSV,
            CONFLICT_HEADER.iter().map(|s| s.to_string()).collect(),
            conflicts,
        ),
    ];

    for (name, header, rows) in targets {
        let path = dir.join(name);
        write_csv_file(&path, &header, &rows)?;
        summary.files.push(path);
    }
    Ok(summary)
}

fn write_csv_file(path: &Path, header: &[String], rows: &[Vec<Value>]) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| IoError::write(path, e))?;
    writer
        .write_record(header)
        .map_err(|e| IoError::write(path, e))?;
    for row in rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| IoError::write(path, e))?;
    }
    writer.flush().map_err(|e| IoError::write(path, e))
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

/// Write one workbook with `Merged`, `Unmatched`, `Conflicts` and `Sources` sheets.
pub fn write_xlsx(result: &MergeResult, path: &Path) -> Result<ExportSummary, IoError> {
    let err = |e: rust_xlsxwriter::XlsxError| IoError::write(path, e);
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let header = record_header(result);
    for (name, records) in [("Merged", &result.merged), ("Unmatched", &result.unmatched)] {
        let ws = workbook.add_worksheet().set_name(name).map_err(err)?;
        write_header(ws, &header, &bold).map_err(err)?;
        for (i, record) in records.iter().enumerate() {
            write_row(ws, i as u32 + 1, &record_cells(result, record)).map_err(err)?;
        }
        ws.set_freeze_panes(1, 0).map_err(err)?;
    }

    let conflicts = conflict_rows(result);
    let ws = workbook.add_worksheet().set_name("Conflicts").map_err(err)?;
    let conflict_header: Vec<String> = CONFLICT_HEADER.iter().map(|s| s.to_string()).collect();
    write_header(ws, &conflict_header, &bold).map_err(err)?;
    for (i, row) in conflicts.iter().enumerate() {
        write_row(ws, i as u32 + 1, row).map_err(err)?;
    }

    let ws = workbook.add_worksheet().set_name("Sources").map_err(err)?;
    let source_header: Vec<String> = [
        "source",
        "template",
        "rows",
        "mapped_fields",
        "unmapped_columns",
        "missing_required",
        "warnings",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    write_header(ws, &source_header, &bold).map_err(err)?;
    for (i, report) in result.reports.iter().enumerate() {
        let row = vec![
            Value::Text(report.source_id.clone()),
            Value::Text(report.template_id.clone()),
            Value::Number(report.row_count as f64),
            Value::Number(report.mapped_field_count() as f64),
            Value::Text(report.unmapped.join(", ")),
            Value::Text(report.missing_required.join(", ")),
            Value::Number(report.warnings.len() as f64),
        ];
        write_row(ws, i as u32 + 1, &row).map_err(err)?;
    }

    workbook.save(path).map_err(err)?;

    Ok(ExportSummary {
        files: vec![path.to_path_buf()],
        records: result.merged.len() + result.unmatched.len(),
        conflicts: conflicts.len(),
    })
}

fn write_header(
    ws: &mut Worksheet,
    header: &[String],
    bold: &Format,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    for (col, name) in header.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, name, bold)?;
    }
    Ok(())
}

fn write_row(ws: &mut Worksheet, row: u32, cells: &[Value]) -> Result<(), rust_xlsxwriter::XlsxError> {
    for (col, cell) in cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            Value::Null => {}
            Value::Number(n) => {
                ws.write_number(row, col, *n)?;
            }
            Value::Text(s) => {
                ws.write_string(row, col, s)?;
            }
        }
    }
    Ok(())
}
