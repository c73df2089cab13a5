//! Post-merge checks against caller-supplied expectations.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::model::MergeResult;

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationContext {
    /// Largest accepted difference between rounded expected and actual sums.
    #[serde(default = "default_tolerance")]
    pub sum_tolerance: f64,
    /// Decimal places both sums are rounded to before comparing.
    #[serde(default = "default_scale")]
    pub sum_scale: u32,
    /// When set, a source or sum field without an expectation is only logged.
    #[serde(default = "default_true")]
    pub missing_expectation_is_warning: bool,
    #[serde(default)]
    pub expected_rows: BTreeMap<String, usize>,
    #[serde(default)]
    pub expected_sums: BTreeMap<String, f64>,
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_scale() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            sum_tolerance: default_tolerance(),
            sum_scale: default_scale(),
            missing_expectation_is_warning: true,
            expected_rows: BTreeMap::new(),
            expected_sums: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    EmptyResult,
    CountMismatch,
    SumMismatch,
    MissingExpectedRowCount,
    MissingExpectedSum,
    RowConservation,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyResult => "EMPTY_RESULT",
            Self::CountMismatch => "COUNT_MISMATCH",
            Self::SumMismatch => "SUM_MISMATCH",
            Self::MissingExpectedRowCount => "MISSING_EXPECTED_ROW_COUNT",
            Self::MissingExpectedSum => "MISSING_EXPECTED_SUM",
            Self::RowConservation => "ROW_CONSERVATION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    /// Source id or field the issue is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}

impl ValidationIssue {
    fn new(code: IssueCode, message: String) -> Self {
        Self {
            code,
            message,
            subject: None,
            expected: None,
            actual: None,
        }
    }

    fn about(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    fn values(mut self, expected: Option<f64>, actual: f64) -> Self {
        self.expected = expected;
        self.actual = Some(actual);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Check a finished merge against expected row counts and field sums.
pub fn validate(result: &MergeResult, ctx: &ValidationContext) -> ValidationReport {
    let mut issues = Vec::new();
    let stats = &result.stats;

    if result.merged.is_empty() && result.unmatched.is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::EmptyResult,
            "merge produced no records".into(),
        ));
    }

    for source in &result.meta.sources {
        let actual = stats.rows_per_source.get(source).copied().unwrap_or(0);
        match ctx.expected_rows.get(source) {
            Some(&expected) if expected != actual => issues.push(
                ValidationIssue::new(
                    IssueCode::CountMismatch,
                    format!("source '{source}' has {actual} row(s), expected {expected}"),
                )
                .about(source)
                .values(Some(expected as f64), actual as f64),
            ),
            Some(_) => {}
            None if ctx.missing_expectation_is_warning => {
                warn!("no expected row count for source '{source}'");
            }
            None => issues.push(
                ValidationIssue::new(
                    IssueCode::MissingExpectedRowCount,
                    format!("no expected row count for source '{source}'"),
                )
                .about(source)
                .values(None, actual as f64),
            ),
        }
    }

    for (field, &total) in &stats.field_totals {
        let actual = round_to(total, ctx.sum_scale);
        match ctx.expected_sums.get(field) {
            Some(&expected) => {
                let expected = round_to(expected, ctx.sum_scale);
                if (expected - actual).abs() > ctx.sum_tolerance {
                    issues.push(
                        ValidationIssue::new(
                            IssueCode::SumMismatch,
                            format!("sum of '{field}' is {actual}, expected {expected}"),
                        )
                        .about(field)
                        .values(Some(expected), actual),
                    );
                }
            }
            None if ctx.missing_expectation_is_warning => {
                warn!("no expected sum for field '{field}'");
            }
            None => issues.push(
                ValidationIssue::new(
                    IssueCode::MissingExpectedSum,
                    format!("no expected sum for field '{field}'"),
                )
                .about(field)
                .values(None, actual),
            ),
        }
    }

    let placed: usize = result.all_records().map(|r| r.member_count).sum();
    if placed != stats.total_input_rows {
        issues.push(
            ValidationIssue::new(
                IssueCode::RowConservation,
                format!(
                    "{placed} row(s) placed in output, {} read",
                    stats.total_input_rows
                ),
            )
            .values(Some(stats.total_input_rows as f64), placed as f64),
        );
    }

    ValidationReport {
        valid: issues.is_empty(),
        issues,
    }
}

/// Round half away from zero to `scale` decimals.
pub fn round_to(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}
