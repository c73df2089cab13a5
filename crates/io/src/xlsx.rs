// Spreadsheet reading (xlsx, xlsm, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};

use crate::error::IoError;

/// Read one worksheet as raw strings; the first sheet unless `sheet` names another.
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>, IoError> {
    let excel_err = |message: String| IoError::Excel {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| excel_err(format!("failed to open: {e}")))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| excel_err("workbook contains no sheets".into()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| excel_err(format!("failed to read sheet '{sheet_name}': {e}")))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Text of one cell as a user would see it in a CSV export.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{e:?}"),
        // serial date number, 1900 system
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use tempfile::tempdir;

    #[test]
    fn reads_first_sheet_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.xlsx");

        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "Name").unwrap();
        ws.write_string(0, 1, "Amount").unwrap();
        ws.write_string(1, 0, "Jane").unwrap();
        ws.write_number(1, 1, 42.0).unwrap();
        ws.write_string(2, 0, "Bob").unwrap();
        ws.write_number(2, 1, 2.5).unwrap();
        ws.write_boolean(3, 0, true).unwrap();
        let other = workbook.add_worksheet();
        other.write_string(0, 0, "ignored").unwrap();
        workbook.save(&path).unwrap();

        let rows = read_rows(&path, None).unwrap();
        assert_eq!(rows[0], vec!["Name", "Amount"]);
        assert_eq!(rows[1], vec!["Jane", "42"]);
        assert_eq!(rows[2], vec!["Bob", "2.5"]);
        assert_eq!(rows[3][0], "TRUE");
    }

    #[test]
    fn named_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "first").unwrap();
        workbook
            .add_worksheet()
            .set_name("Data")
            .unwrap()
            .write_string(0, 0, "second")
            .unwrap();
        workbook.save(&path).unwrap();

        let rows = read_rows(&path, Some("Data")).unwrap();
        assert_eq!(rows[0][0], "second");
        assert!(read_rows(&path, Some("Missing")).is_err());
    }

    #[test]
    fn not_a_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(read_rows(&path, None), Err(IoError::Excel { .. })));
    }
}
