use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::template::{FieldKind, HeaderTemplate};
use crate::validate::ValidationContext;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Template id; `None` means detect from the sources' headers.
    #[serde(default)]
    pub template: Option<String>,
    /// Normalize all sources on worker threads before matching.
    #[serde(default)]
    pub parallel_normalize: bool,
    /// Processing order = declaration order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub matching: MatchConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    #[serde(default)]
    pub validation: Option<ValidationContext>,
}

fn default_name() -> String {
    "merge".into()
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    /// Input file, resolved by the caller. The engine never opens it.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Per-source template; must declare the session template's canonical fields.
    #[serde(default)]
    pub template: Option<String>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MatchConfig {
    /// Overall weighted score a candidate cluster must reach.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub keys: Vec<KeyField>,
}

fn default_threshold() -> f64 {
    0.85
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyField {
    pub field: String,
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default)]
    pub algorithm: SimilarityAlgorithm,
    /// Per-field floor; a fuzzy similarity below it rules the candidate out.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Trim, collapse whitespace and case-fold before comparing.
    #[serde(default = "default_true")]
    pub normalize: bool,
}

fn default_min_similarity() -> f64 {
    0.8
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl KeyField {
    pub fn exact(field: &str) -> Self {
        Self {
            field: field.to_string(),
            fuzzy: false,
            algorithm: SimilarityAlgorithm::default(),
            min_similarity: default_min_similarity(),
            weight: default_weight(),
            normalize: true,
        }
    }

    pub fn fuzzy(field: &str, min_similarity: f64) -> Self {
        Self {
            fuzzy: true,
            min_similarity,
            ..Self::exact(field)
        }
    }

    pub fn with_algorithm(mut self, algorithm: SimilarityAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.normalize = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    #[default]
    JaroWinkler,
    Levenshtein,
}

// ---------------------------------------------------------------------------
// Resolution + aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Value from the earliest-processed source wins.
    #[default]
    #[serde(alias = "preferFirstSource")]
    PreferFirstSource,
    /// Longest text wins; ties go to the first source.
    #[serde(alias = "preferLongest")]
    PreferLongest,
    /// Most frequent value wins; ties go to the first source.
    #[serde(alias = "preferMostFrequent")]
    PreferMostFrequent,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferFirstSource => write!(f, "prefer_first_source"),
            Self::PreferLongest => write!(f, "prefer_longest"),
            Self::PreferMostFrequent => write!(f, "prefer_most_frequent"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub policy: ConflictPolicy,
    /// Per-field overrides of `policy`.
    #[serde(default)]
    pub fields: BTreeMap<String, ConflictPolicy>,
}

impl ResolutionConfig {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            fields: BTreeMap::new(),
        }
    }

    pub fn policy_for(&self, field: &str) -> ConflictPolicy {
        self.fields.get(field).copied().unwrap_or(self.policy)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregateConfig {
    /// Number fields whose values are totalled per merged record.
    #[serde(default)]
    pub sum_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SessionConfig {
    /// Minimal config: exact matching on `keys`, default policy.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_keys(keys.into_iter().map(|k| KeyField::exact(k.as_ref())).collect())
    }

    pub fn with_keys(keys: Vec<KeyField>) -> Self {
        Self {
            name: default_name(),
            template: None,
            parallel_normalize: false,
            sources: Vec::new(),
            matching: MatchConfig {
                threshold: default_threshold(),
                keys,
            },
            resolution: ResolutionConfig::default(),
            aggregate: AggregateConfig::default(),
            validation: None,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, MergeError> {
        let config: SessionConfig =
            toml::from_str(input).map_err(|e| MergeError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        let mut ids = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(MergeError::ConfigValidation("source id must not be blank".into()));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(MergeError::ConfigValidation(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        if self.matching.keys.is_empty() {
            return Err(MergeError::ConfigValidation(
                "at least one match key is required".into(),
            ));
        }
        check_unit_interval("matching.threshold", self.matching.threshold)?;

        let mut key_fields = HashSet::new();
        for key in &self.matching.keys {
            if !key_fields.insert(key.field.as_str()) {
                return Err(MergeError::ConfigValidation(format!(
                    "match key '{}' listed more than once",
                    key.field
                )));
            }
            check_unit_interval(&format!("min_similarity of '{}'", key.field), key.min_similarity)?;
            if !key.weight.is_finite() || key.weight <= 0.0 {
                return Err(MergeError::ConfigValidation(format!(
                    "weight of '{}' must be positive, got {}",
                    key.field, key.weight
                )));
            }
        }

        let mut sums = HashSet::new();
        for field in &self.aggregate.sum_fields {
            if !sums.insert(field.as_str()) {
                return Err(MergeError::ConfigValidation(format!(
                    "sum field '{field}' listed more than once"
                )));
            }
        }

        if let Some(ref validation) = self.validation {
            if !validation.sum_tolerance.is_finite() || validation.sum_tolerance < 0.0 {
                return Err(MergeError::ConfigValidation(format!(
                    "validation.sum_tolerance must be >= 0, got {}",
                    validation.sum_tolerance
                )));
            }
            for field in validation.expected_sums.keys() {
                if !sums.contains(field.as_str()) {
                    return Err(MergeError::ConfigValidation(format!(
                        "validation.expected_sums names '{field}', which is not in aggregate.sum_fields"
                    )));
                }
            }
            if !self.sources.is_empty() {
                for source in validation.expected_rows.keys() {
                    if !ids.contains(source.as_str()) {
                        return Err(MergeError::ConfigValidation(format!(
                            "validation.expected_rows names unknown source '{source}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Every field the config names must exist in `template`; sum fields must be numbers.
    pub fn check_against(&self, template: &HeaderTemplate) -> Result<(), MergeError> {
        let unknown = |what: &str, field: &str| {
            MergeError::ConfigValidation(format!(
                "{what} '{field}' is not a canonical field of template '{}'",
                template.id
            ))
        };

        for key in &self.matching.keys {
            if !template.has_field(&key.field) {
                return Err(unknown("match key", &key.field));
            }
        }
        for field in self.resolution.fields.keys() {
            if !template.has_field(field) {
                return Err(unknown("resolution field", field));
            }
        }
        for field in &self.aggregate.sum_fields {
            match template.field(field) {
                None => return Err(unknown("sum field", field)),
                Some(def) if def.kind != FieldKind::Number => {
                    return Err(MergeError::ConfigValidation(format!(
                        "sum field '{field}' must be a number field"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

fn check_unit_interval(what: &str, value: f64) -> Result<(), MergeError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MergeError::ConfigValidation(format!(
            "{what} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
