//! Header templates: canonical fields and the source headers that map onto them.
//!
//! Alias matching is exact after `normalize_header` (trim, collapse internal
//! whitespace, lowercase). Ambiguous column naming is settled by curating the
//! template, never by runtime heuristics.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MergeError;

/// Normalize a header (or key value) for comparison.
pub fn normalize_header(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Field definitions
// ---------------------------------------------------------------------------

/// Value type a canonical field carries after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
}

/// Where the header row sits in files exported with this template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPosition {
    #[default]
    #[serde(alias = "FIRST", alias = "First")]
    First,
    #[serde(alias = "LAST", alias = "Last")]
    Last,
}

/// Accepted header spellings for one canonical field.
///
/// Keeps the declared spellings for display and their normalized forms for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AliasSet {
    declared: Vec<String>,
    normalized: Vec<String>,
}

impl AliasSet {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let declared: Vec<String> = aliases.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        let normalized = declared
            .iter()
            .map(|a| normalize_header(a))
            .filter(|n| seen.insert(n.clone()))
            .collect();
        Self { declared, normalized }
    }

    pub fn contains(&self, header: &str) -> bool {
        let needle = normalize_header(header);
        self.normalized.iter().any(|n| *n == needle)
    }

    /// Spellings as written in the template.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Distinct normalized spellings, in declaration order.
    pub fn normalized(&self) -> &[String] {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.iter().all(String::is_empty)
    }
}

impl From<Vec<String>> for AliasSet {
    fn from(v: Vec<String>) -> Self {
        Self::new(v)
    }
}

impl From<AliasSet> for Vec<String> {
    fn from(a: AliasSet) -> Self {
        a.declared
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub aliases: AliasSet,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn text<I, S>(name: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            aliases: AliasSet::new(aliases),
            required: false,
            kind: FieldKind::Text,
        }
    }

    pub fn number<I, S>(name: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: FieldKind::Number,
            ..Self::text(name, aliases)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderTemplate {
    pub id: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub header_position: HeaderPosition,
}

/// A structural problem found by `HeaderTemplate::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum TemplateIssue {
    #[error("template id is blank")]
    BlankId,
    #[error("template declares no fields")]
    NoFields,
    #[error("field #{index} has a blank name")]
    BlankFieldName { index: usize },
    #[error("canonical field '{field}' declared more than once")]
    DuplicateField { field: String },
    #[error("required field '{field}' has no aliases")]
    EmptyRequiredAliases { field: String },
    #[error("field '{field}' has a blank alias")]
    BlankAlias { field: String },
    #[error("alias '{alias}' claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    #[error("canonical fields differ from session template '{session_template}'")]
    FieldSetMismatch { session_template: String },
}

impl HeaderTemplate {
    pub fn new(id: &str, fields: Vec<FieldDef>) -> Self {
        Self {
            id: id.to_string(),
            fields,
            header_position: HeaderPosition::First,
        }
    }

    pub fn with_header_position(mut self, position: HeaderPosition) -> Self {
        self.header_position = position;
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Index of the first declared field whose aliases contain `header`.
    pub fn resolve_header(&self, header: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.aliases.contains(header))
    }

    /// Canonical fields claiming `header`, in declaration order.
    pub fn claimants(&self, header: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.aliases.contains(header))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Number of distinct canonical fields the given headers map to.
    pub fn coverage(&self, headers: &[String]) -> usize {
        headers
            .iter()
            .filter_map(|h| self.resolve_header(h))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Structural validation. An empty list means the template is usable.
    pub fn validate(&self) -> Vec<TemplateIssue> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push(TemplateIssue::BlankId);
        }
        if self.fields.is_empty() {
            issues.push(TemplateIssue::NoFields);
        }

        let mut names: HashSet<&str> = HashSet::new();
        let mut alias_owner: HashMap<&str, &str> = HashMap::new();

        for (index, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                issues.push(TemplateIssue::BlankFieldName { index });
            } else if !names.insert(field.name.as_str()) {
                issues.push(TemplateIssue::DuplicateField {
                    field: field.name.clone(),
                });
            }

            if field.required && field.aliases.is_empty() {
                issues.push(TemplateIssue::EmptyRequiredAliases {
                    field: field.name.clone(),
                });
            }

            for alias in field.aliases.normalized() {
                if alias.is_empty() {
                    issues.push(TemplateIssue::BlankAlias {
                        field: field.name.clone(),
                    });
                    continue;
                }
                match alias_owner.get(alias.as_str()) {
                    Some(owner) if *owner != field.name => {
                        issues.push(TemplateIssue::DuplicateAlias {
                            alias: alias.clone(),
                            first: (*owner).to_string(),
                            second: field.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        alias_owner.insert(alias.as_str(), field.name.as_str());
                    }
                }
            }
        }

        issues
    }

    /// True when both templates declare the same canonical field names.
    pub fn same_fields(&self, other: &HeaderTemplate) -> bool {
        let mine: HashSet<&str> = self.field_names().collect();
        let theirs: HashSet<&str> = other.field_names().collect();
        mine == theirs
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Immutable catalog of templates keyed by id.
///
/// Built once by the caller and passed into each session.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, HeaderTemplate>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from templates; a later template replaces an earlier one with the same id.
    pub fn from_templates<I>(templates: I) -> Self
    where
        I: IntoIterator<Item = HeaderTemplate>,
    {
        let mut store = Self::new();
        for t in templates {
            store.insert(t);
        }
        store
    }

    /// Insert, returning the replaced template if the id was taken.
    pub fn insert(&mut self, template: HeaderTemplate) -> Option<HeaderTemplate> {
        self.templates.insert(template.id.clone(), template)
    }

    pub fn resolve(&self, id: &str) -> Result<&HeaderTemplate, MergeError> {
        self.templates
            .get(id)
            .ok_or_else(|| MergeError::TemplateNotFound { id: id.to_string() })
    }

    /// Resolve and reject templates with structural issues.
    pub fn resolve_valid(&self, id: &str) -> Result<&HeaderTemplate, MergeError> {
        let template = self.resolve(id)?;
        let issues = Self::validate(template);
        if !issues.is_empty() {
            return Err(MergeError::TemplateInvalid {
                id: id.to_string(),
                issues,
            });
        }
        Ok(template)
    }

    pub fn validate(template: &HeaderTemplate) -> Vec<TemplateIssue> {
        template.validate()
    }

    /// Pick the template whose aliases cover the most distinct canonical fields.
    ///
    /// Ties go to the lowest id. Returns `None` when nothing maps.
    pub fn detect(&self, headers: &[String]) -> Option<&HeaderTemplate> {
        let mut best: Option<(&HeaderTemplate, usize)> = None;
        for template in self.templates.values() {
            let score = template.coverage(headers);
            if score == 0 {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((template, score));
            }
        }
        best.map(|(t, _)| t)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
