use std::path::PathBuf;

use listmerge_engine::MergeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {message}", path.display())]
    Csv { path: PathBuf, message: String },

    #[error("cannot read spreadsheet {}: {message}", path.display())]
    Excel { path: PathBuf, message: String },

    #[error("invalid JSON in {}: {message}", path.display())]
    Json { path: PathBuf, message: String },

    #[error("cannot write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("unsupported file type: {}", path.display())]
    Unsupported { path: PathBuf },

    /// A catalog file parsed but its template is unusable.
    #[error("template file {}: {source}", path.display())]
    Catalog {
        path: PathBuf,
        #[source]
        source: MergeError,
    },
}

impl IoError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
