use serde::{Deserialize, Serialize};

/// One parsed input table, as handed over by the table-reading collaborator.
///
/// Rows are positional against `headers`; together they form the ordered
/// header → value mapping of each row. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub source_id: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Rows shorter than the header are padded with empty cells, longer ones truncated.
    pub fn new(source_id: &str, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self {
            source_id: source_id.to_string(),
            headers,
            rows,
        }
    }

    /// Convenience constructor for string literals.
    pub fn from_rows(source_id: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            source_id,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Ordered (header, value) pairs of one row.
    pub fn row(&self, index: usize) -> Option<impl Iterator<Item = (&str, &str)>> {
        self.rows.get(index).map(|r| {
            self.headers
                .iter()
                .map(String::as_str)
                .zip(r.iter().map(String::as_str))
        })
    }
}
