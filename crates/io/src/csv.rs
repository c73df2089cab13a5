// Delimited-text reading

use std::path::Path;

use crate::error::IoError;

const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_LINES: usize = 10;

/// Read every record of a delimited file as raw strings.
///
/// `delimiter: None` sniffs it from the first lines.
pub fn read_rows(path: &Path, delimiter: Option<u8>) -> Result<Vec<Vec<String>>, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    parse_rows(&content, delimiter).map_err(|message| IoError::Csv {
        path: path.to_path_buf(),
        message,
    })
}

pub fn parse_rows(content: &str, delimiter: u8) -> Result<Vec<Vec<String>>, String> {
    // A UTF-8 BOM would otherwise stick to the first header.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    reader
        .records()
        .map(|r| {
            r.map(|record| record.iter().map(str::to_string).collect())
                .map_err(|e| e.to_string())
        })
        .collect()
}

/// Pick the delimiter giving the most consistent multi-field split of the sample lines.
///
/// Each candidate scores `lines agreeing with line 1 * fields on line 1`; a candidate
/// that leaves line 1 as a single field is skipped. Falls back to `;`, the export
/// default of the spreadsheet tools these lists usually come from.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best = b';';
    let mut best_score = 0usize;

    for delim in DELIMITERS {
        let widths: Vec<usize> = sample.iter().map(|line| field_count(line, delim)).collect();
        let Some(&first) = widths.first() else {
            break;
        };
        if first <= 1 {
            continue;
        }
        let score = widths.iter().filter(|&&w| w == first).count() * first;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map_or(1, |r| r.len())
}

/// Read a file as UTF-8, falling back to Windows-1252 for legacy exports.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::read(path, e))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}
