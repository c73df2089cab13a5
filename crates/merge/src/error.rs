use thiserror::Error;

use crate::template::TemplateIssue;

/// Errors that abort a merge session.
///
/// Everything else (unmapped columns, missing required fields, ambiguous
/// matches, value conflicts) is accumulated in the `MergeResult`.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Requested template id is not in the catalog.
    #[error("template not found: '{id}'")]
    TemplateNotFound { id: String },

    /// Template failed structural validation.
    #[error("template '{id}' is invalid: {}", join_issues(.issues))]
    TemplateInvalid { id: String, issues: Vec<TemplateIssue> },

    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad threshold, duplicate source, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// Session was cancelled between sources.
    #[error("merge session cancelled after {completed_sources} source(s)")]
    Cancelled { completed_sources: usize },
}

fn join_issues(issues: &[TemplateIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
