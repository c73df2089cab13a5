// Source file -> RawTable

use std::path::Path;

use listmerge_engine::{HeaderPosition, RawTable, TemplateStore};
use log::debug;

use crate::error::IoError;

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// CSV delimiter; sniffed when unset.
    pub delimiter: Option<u8>,
    /// Spreadsheet sheet name; first sheet when unset.
    pub sheet: Option<String>,
    pub header_position: HeaderPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(Self::Delimited),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Read a source file into a table, locating the header row per `options`.
pub fn read_table(path: &Path, source_id: &str, options: &ReadOptions) -> Result<RawTable, IoError> {
    let rows = read_raw_rows(path, options)?;
    let table = table_from_rows(source_id, rows, options.header_position);
    log_table(path, &table);
    Ok(table)
}

/// Read a source file whose template is not known yet.
///
/// The header row is taken from wherever the best-covering template in
/// `store` expects it; `options.header_position` is ignored.
pub fn read_table_detected(
    path: &Path,
    source_id: &str,
    options: &ReadOptions,
    store: &TemplateStore,
) -> Result<RawTable, IoError> {
    let rows = read_raw_rows(path, options)?;
    let position = detect_header_position(&rows, store);
    debug!("{}: header row expected {:?}", path.display(), position);
    let table = table_from_rows(source_id, rows, position);
    log_table(path, &table);
    Ok(table)
}

/// Every record of a source file as raw strings, header row included.
pub fn read_raw_rows(path: &Path, options: &ReadOptions) -> Result<Vec<Vec<String>>, IoError> {
    let kind = FileKind::from_path(path).ok_or_else(|| IoError::Unsupported {
        path: path.to_path_buf(),
    })?;

    match kind {
        FileKind::Delimited => {
            let delimiter = options.delimiter.or_else(|| {
                let is_tsv = path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
                is_tsv.then_some(b'\t')
            });
            crate::csv::read_rows(path, delimiter)
        }
        FileKind::Spreadsheet => crate::xlsx::read_rows(path, options.sheet.as_deref()),
    }
}

fn log_table(path: &Path, table: &RawTable) {
    debug!(
        "read {} as '{}': {} column(s), {} row(s)",
        path.display(),
        table.source_id,
        table.headers().len(),
        table.row_count()
    );
}

/// Header position of the template that best covers `rows`.
///
/// Templates reading headers first are scored against the first non-blank row,
/// the others against the last one. Highest coverage wins, ties go to the
/// earlier template id. Nothing covered falls back to the first row.
pub fn detect_header_position(rows: &[Vec<String>], store: &TemplateStore) -> HeaderPosition {
    let mut non_blank = rows.iter().filter(|r| !is_blank(r));
    let Some(first) = non_blank.next() else {
        return HeaderPosition::default();
    };
    let last = non_blank.last().unwrap_or(first);

    let mut best: Option<(HeaderPosition, usize)> = None;
    for template in store.iter() {
        let candidate = match template.header_position {
            HeaderPosition::First => first,
            HeaderPosition::Last => last,
        };
        let score = template.coverage(candidate);
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((template.header_position, score));
        }
    }
    best.map(|(position, _)| position).unwrap_or_default()
}

/// Build a table from raw records: blank rows are skipped and the header is the
/// first (or last) remaining row.
///
/// Trailing columns are dropped only when both the header cell and every data
/// cell are blank. A filled column under a blank header is kept with an empty
/// name so it shows up as unmapped.
pub fn table_from_rows(
    source_id: &str,
    rows: Vec<Vec<String>>,
    header_position: HeaderPosition,
) -> RawTable {
    let mut rows: Vec<Vec<String>> = rows.into_iter().filter(|r| !is_blank(r)).collect();
    if rows.is_empty() {
        return RawTable::new(source_id, Vec::new(), Vec::new());
    }

    let header_idx = match header_position {
        HeaderPosition::First => 0,
        HeaderPosition::Last => rows.len() - 1,
    };
    let mut headers = rows.remove(header_idx);
    let width = std::iter::once(&headers)
        .chain(rows.iter())
        .filter_map(|r| r.iter().rposition(|c| !c.trim().is_empty()))
        .max()
        .map_or(0, |i| i + 1);
    headers.resize(width, String::new());

    RawTable::new(source_id, headers, rows)
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}
