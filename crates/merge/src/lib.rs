//! `listmerge-engine`: header-template matching and record-merge engine.
//!
//! Pure engine crate: receives already-parsed tables and a template catalog,
//! returns merged records with provenance and conflicts. No CLI or IO dependencies.

pub mod config;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod session;
pub mod stats;
pub mod table;
pub mod template;
pub mod validate;

pub use config::{ConflictPolicy, KeyField, SessionConfig, SimilarityAlgorithm};
pub use error::MergeError;
pub use model::{ConflictNote, MergeResult, MergedRecord, NormalizedRecord, Provenance, Value};
pub use normalize::{normalize, NormalizationReport, NormalizationWarning};
pub use session::{run, CancelToken, MergeSession};
pub use table::RawTable;
pub use template::{FieldDef, FieldKind, HeaderPosition, HeaderTemplate, TemplateIssue, TemplateStore};
pub use validate::{validate, ValidationContext, ValidationReport};
