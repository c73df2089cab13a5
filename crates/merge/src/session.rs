use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::MergeError;
use crate::matcher::Matcher;
use crate::model::{MergeMeta, MergeResult, NormalizedRecord};
use crate::normalize::{normalize, NormalizationReport};
use crate::resolve::Resolver;
use crate::stats::compute_stats;
use crate::table::RawTable;
use crate::template::{HeaderTemplate, TemplateIssue, TemplateStore};

/// Cooperative cancellation flag, checked between sources.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One merge run: a validated config bound to an immutable template catalog.
pub struct MergeSession<'a> {
    config: &'a SessionConfig,
    store: &'a TemplateStore,
}

impl<'a> MergeSession<'a> {
    pub fn new(config: &'a SessionConfig, store: &'a TemplateStore) -> Result<Self, MergeError> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    /// Session template: the configured one, or the best match for all headers combined.
    pub fn session_template(&self, tables: &[RawTable]) -> Result<&'a HeaderTemplate, MergeError> {
        if let Some(ref id) = self.config.template {
            return self.store.resolve_valid(id);
        }

        let headers: Vec<String> = tables
            .iter()
            .flat_map(|t| t.headers().iter().cloned())
            .collect();
        let detected = self
            .store
            .detect(&headers)
            .ok_or_else(|| MergeError::TemplateNotFound {
                id: "(auto-detect)".into(),
            })?;
        info!("detected template '{}'", detected.id);
        self.store.resolve_valid(&detected.id)
    }

    /// Template applied to one source; overrides must share the session's canonical fields.
    fn source_template(
        &self,
        table: &RawTable,
        session_template: &'a HeaderTemplate,
    ) -> Result<&'a HeaderTemplate, MergeError> {
        let Some(id) = self
            .config
            .source(&table.source_id)
            .and_then(|s| s.template.as_deref())
        else {
            return Ok(session_template);
        };

        let template = self.store.resolve_valid(id)?;
        if !template.same_fields(session_template) {
            return Err(MergeError::TemplateInvalid {
                id: id.to_string(),
                issues: vec![TemplateIssue::FieldSetMismatch {
                    session_template: session_template.id.clone(),
                }],
            });
        }
        Ok(template)
    }

    fn check_sources(&self, tables: &[RawTable]) -> Result<(), MergeError> {
        let mut seen = HashSet::new();
        for table in tables {
            if !seen.insert(table.source_id.as_str()) {
                return Err(MergeError::ConfigValidation(format!(
                    "source '{}' supplied more than once",
                    table.source_id
                )));
            }
            if !self.config.sources.is_empty() && self.config.source(&table.source_id).is_none() {
                return Err(MergeError::ConfigValidation(format!(
                    "source '{}' is not declared in the session config",
                    table.source_id
                )));
            }
        }
        Ok(())
    }

    pub fn run(&self, tables: &[RawTable]) -> Result<MergeResult, MergeError> {
        self.run_with_cancel(tables, &CancelToken::new())
    }

    /// Normalize, match and resolve `tables` in the order given.
    pub fn run_with_cancel(
        &self,
        tables: &[RawTable],
        cancel: &CancelToken,
    ) -> Result<MergeResult, MergeError> {
        self.run_observed(tables, cancel, |_| {})
    }

    /// Like `run_with_cancel`, calling `on_source` once each source has been matched.
    pub fn run_observed<F>(
        &self,
        tables: &[RawTable],
        cancel: &CancelToken,
        mut on_source: F,
    ) -> Result<MergeResult, MergeError>
    where
        F: FnMut(&NormalizationReport),
    {
        self.check_sources(tables)?;
        let template = self.session_template(tables)?;
        self.config.check_against(template)?;
        let templates = tables
            .iter()
            .map(|t| self.source_template(t, template))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "session '{}': {} source(s), template '{}'",
            self.config.name,
            tables.len(),
            template.id
        );

        let mut prepared = if self.config.parallel_normalize {
            Some(normalize_parallel(tables, &templates).into_iter())
        } else {
            None
        };

        let mut matcher = Matcher::new(&self.config.matching);
        let mut reports = Vec::with_capacity(tables.len());

        for (i, table) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("session '{}' cancelled after {i} source(s)", self.config.name);
                return Err(MergeError::Cancelled { completed_sources: i });
            }

            let (records, report) = match prepared.as_mut().and_then(|it| it.next()) {
                Some(done) => done,
                None => normalize(table, templates[i]),
            };
            debug!(
                "source '{}': {} row(s), {} of {} column(s) mapped",
                table.source_id,
                report.row_count,
                report.mapped_field_count(),
                report.columns.len()
            );
            if report.mapped_field_count() == 0 && !table.headers().is_empty() {
                warn!(
                    "source '{}': no column maps to template '{}'; all fields will be null",
                    table.source_id, templates[i].id
                );
            }

            matcher.add_source(records);
            on_source(&report);
            reports.push(report);
        }

        if cancel.is_cancelled() {
            info!("session '{}' cancelled before resolution", self.config.name);
            return Err(MergeError::Cancelled {
                completed_sources: tables.len(),
            });
        }

        let outcome = matcher.finish();
        let fields: Vec<String> = template.field_names().map(str::to_string).collect();
        let resolver = Resolver::new(
            &fields,
            &self.config.resolution,
            &self.config.aggregate.sum_fields,
        );

        let (merged, unmatched): (Vec<_>, Vec<_>) = resolver
            .resolve_all(&outcome.clusters)
            .into_iter()
            .partition(|r| r.member_count > 1);

        let stats = compute_stats(&reports, &merged, &unmatched, &outcome.ambiguous);
        info!(
            "session '{}' done: {} row(s) -> {} merged, {} unmatched, {} conflict(s)",
            self.config.name,
            stats.total_input_rows,
            stats.merged_rows,
            stats.unmatched_rows,
            stats.conflict_notes
        );

        Ok(MergeResult {
            meta: MergeMeta {
                session: self.config.name.clone(),
                template_id: template.id.clone(),
                sources: tables.iter().map(|t| t.source_id.clone()).collect(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            fields,
            merged,
            unmatched,
            reports,
            ambiguous: outcome.ambiguous,
            stats,
        })
    }
}

/// Run one session with no cancellation.
pub fn run(
    config: &SessionConfig,
    store: &TemplateStore,
    tables: &[RawTable],
) -> Result<MergeResult, MergeError> {
    MergeSession::new(config, store)?.run(tables)
}

/// Normalize every table on its own scoped thread; output keeps input order.
fn normalize_parallel(
    tables: &[RawTable],
    templates: &[&HeaderTemplate],
) -> Vec<(Vec<NormalizedRecord>, NormalizationReport)> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = tables
            .iter()
            .zip(templates)
            .map(|(table, template)| scope.spawn(move || normalize(table, template)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;
    use crate::model::Value;
    use crate::template::FieldDef;

    fn store() -> TemplateStore {
        TemplateStore::from_templates([
            HeaderTemplate::new(
                "person",
                vec![
                    FieldDef::text("name", ["name", "Full Name"]).required(),
                    FieldDef::text("email", ["email", "E-mail"]),
                ],
            ),
            HeaderTemplate::new(
                "person-alt",
                vec![
                    FieldDef::text("name", ["Naam"]).required(),
                    FieldDef::text("email", ["Mail"]),
                ],
            ),
            HeaderTemplate::new("product", vec![FieldDef::text("sku", ["SKU"]).required()]),
        ])
    }

    fn tables() -> Vec<RawTable> {
        vec![
            RawTable::from_rows("a", &["Full Name", "Email"], &[&["Jane", "jane@x.com"]]),
            RawTable::from_rows("b", &["name", "E-mail"], &[&["Jane", "j@x.com"], &["Bob", ""]]),
        ]
    }

    #[test]
    fn detects_template_and_merges() {
        let config = SessionConfig::new(["name"]);
        let result = run(&config, &store(), &tables()).unwrap();

        assert_eq!(result.meta.template_id, "person");
        assert_eq!(result.meta.sources, vec!["a", "b"]);
        assert_eq!(result.fields, vec!["name", "email"]);
        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.unmatched.len(), 1);
        assert_eq!(result.merged[0].value("email"), &Value::text("jane@x.com"));
        assert_eq!(result.stats.total_input_rows, 3);
        assert!(result.has_warnings());
    }

    #[test]
    fn unknown_template_is_fatal() {
        let mut config = SessionConfig::new(["name"]);
        config.template = Some("nope".into());
        let err = run(&config, &store(), &tables()).unwrap_err();
        assert!(matches!(err, MergeError::TemplateNotFound { .. }));
    }

    #[test]
    fn nothing_detected_is_fatal() {
        let config = SessionConfig::new(["name"]);
        let t = vec![RawTable::from_rows("a", &["Foo"], &[&["1"]])];
        assert!(matches!(
            run(&config, &store(), &t),
            Err(MergeError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn key_must_be_canonical() {
        let config = SessionConfig::new(["phone"]);
        assert!(matches!(
            run(&config, &store(), &tables()),
            Err(MergeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn per_source_template_override() {
        let mut config = SessionConfig::from_toml(
            r#"
template = "person"
[[sources]]
id = "a"
[[sources]]
id = "b"
template = "person-alt"
[[matching.keys]]
field = "name"
"#,
        )
        .unwrap();
        let t = vec![
            RawTable::from_rows("a", &["name", "email"], &[&["Jane", "jane@x.com"]]),
            RawTable::from_rows("b", &["Naam", "Mail"], &[&["Jane", "jane@x.com"]]),
        ];
        let result = run(&config, &store(), &t).unwrap();
        assert_eq!(result.merged.len(), 1);
        assert!(!result.merged[0].has_conflicts());
        assert_eq!(result.report_for("b").unwrap().template_id, "person-alt");

        config.sources[1].template = Some("product".into());
        let err = run(&config, &store(), &t).unwrap_err();
        assert!(matches!(err, MergeError::TemplateInvalid { .. }));
    }

    #[test]
    fn undeclared_or_repeated_source_is_rejected() {
        let config = SessionConfig::new(["name"]);
        let mut t = tables();
        t.push(t[0].clone());
        assert!(matches!(
            run(&config, &store(), &t),
            Err(MergeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn cancelled_before_first_source() {
        let config = SessionConfig::new(["name"]);
        let binding = store();
        let session = MergeSession::new(&config, &binding).unwrap();
        let cancel = CancelToken::new();
        let handle = cancel.clone();
        handle.cancel();
        let err = session.run_with_cancel(&tables(), &cancel).unwrap_err();
        assert!(matches!(err, MergeError::Cancelled { completed_sources: 0 }));
    }

    #[test]
    fn cancelled_between_sources() {
        let config = SessionConfig::new(["name"]);
        let binding = store();
        let session = MergeSession::new(&config, &binding).unwrap();
        let cancel = CancelToken::new();
        let handle = cancel.clone();
        let mut seen = Vec::new();

        let err = session
            .run_observed(&tables(), &cancel, |report| {
                seen.push(report.source_id.clone());
                handle.cancel();
            })
            .unwrap_err();

        assert!(matches!(err, MergeError::Cancelled { completed_sources: 1 }));
        assert_eq!(seen, vec!["a"]);
    }

    #[test]
    fn cancelled_before_resolution() {
        let config = SessionConfig::new(["name"]);
        let binding = store();
        let session = MergeSession::new(&config, &binding).unwrap();
        let cancel = CancelToken::new();
        let handle = cancel.clone();

        let err = session
            .run_observed(&tables(), &cancel, |report| {
                if report.source_id == "b" {
                    handle.cancel();
                }
            })
            .unwrap_err();

        assert!(matches!(err, MergeError::Cancelled { completed_sources: 2 }));
    }

    #[test]
    fn parallel_normalize_matches_sequential() {
        let mut config = SessionConfig::new(["name"]);
        config.resolution.policy = ConflictPolicy::PreferLongest;
        let sequential = run(&config, &store(), &tables()).unwrap();
        config.parallel_normalize = true;
        let parallel = run(&config, &store(), &tables()).unwrap();

        assert_eq!(
            serde_json::to_value(&sequential.merged).unwrap(),
            serde_json::to_value(&parallel.merged).unwrap()
        );
        assert_eq!(sequential.stats.normalization_warnings, parallel.stats.normalization_warnings);
    }

    #[test]
    fn zero_mapped_columns_still_completes() {
        let mut config = SessionConfig::new(["name"]);
        config.template = Some("person".into());
        let t = vec![RawTable::from_rows("a", &["X", "Y"], &[&["1", "2"], &["3", "4"]])];
        let result = run(&config, &store(), &t).unwrap();
        assert_eq!(result.unmatched.len(), 2);
        assert!(result.unmatched.iter().all(|r| r.value("name").is_null()));
        assert_eq!(result.stats.missing_required["a"], vec!["name".to_string()]);
    }
}
