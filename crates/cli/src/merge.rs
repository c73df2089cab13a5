//! `listmerge run` and `listmerge validate`: config-driven list merging.

use std::path::{Path, PathBuf};

use listmerge_engine::{
    validate, HeaderPosition, MergeResult, MergeSession, RawTable, SessionConfig, TemplateStore,
    ValidationReport,
};
use listmerge_io::{read_table, read_table_detected, ReadOptions};
use log::{debug, warn};
use serde::Serialize;

use crate::exit_codes::{EXIT_CONFLICTS, EXIT_ERROR, EXIT_TEMPLATE, EXIT_VALIDATION};
use crate::{CatalogArgs, CliError};

pub struct RunArgs {
    pub config: PathBuf,
    pub catalog: CatalogArgs,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub fail_on_conflict: bool,
}

/// JSON document written by `run --json` / `--output`.
#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    result: &'a MergeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<&'a ValidationReport>,
}

fn read_config(path: &Path) -> Result<SessionConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::usage(format!("cannot read config {}: {e}", path.display()))
    })?;
    Ok(SessionConfig::from_toml(&text)?)
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = read_config(&args.config)?;
    if config.sources.is_empty() {
        return Err(CliError::config(format!(
            "session '{}' declares no [[sources]]",
            config.name
        )));
    }
    let store = args.catalog.load()?;

    // Resolve file paths relative to config file's directory
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let tables = load_sources(&config, &store, base_dir)?;

    let session = MergeSession::new(&config, &store)?;
    let result = session.run(&tables)?;
    let report = config.validation.as_ref().map(|ctx| validate(&result, ctx));

    let output = RunOutput { result: &result, validation: report.as_ref() };
    let json_str = serde_json::to_string_pretty(&output)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        println!("{json_str}");
    }

    if let Some(ref path) = args.export {
        let summary = if is_workbook(path) {
            listmerge_io::write_xlsx(&result, path)?
        } else {
            listmerge_io::write_csv(&result, path)?
        };
        for file in &summary.files {
            eprintln!("wrote {}", file.display());
        }
    }

    print_summary(&result, report.as_ref());

    if let Some(report) = report.filter(|r| !r.valid) {
        return Err(CliError::new(
            EXIT_VALIDATION,
            format!("validation failed with {} issue(s)", report.issues.len()),
        ));
    }
    if args.fail_on_conflict && result.stats.conflict_notes > 0 {
        return Err(CliError::new(
            EXIT_CONFLICTS,
            format!("{} conflicting value(s) recorded", result.stats.conflict_notes),
        ));
    }
    Ok(())
}

/// Read every declared source, locating its header row per its template.
fn load_sources(
    config: &SessionConfig,
    store: &TemplateStore,
    base_dir: &Path,
) -> Result<Vec<RawTable>, CliError> {
    let mut tables = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let file = source.file.as_deref().ok_or_else(|| {
            CliError::config(format!("source '{}' has no file", source.id))
        })?;
        let delimiter = match source.delimiter {
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => {
                return Err(CliError::config(format!(
                    "source '{}': delimiter '{c}' is not a single-byte character",
                    source.id
                )))
            }
            None => None,
        };

        let path = base_dir.join(file);
        debug!("reading source '{}' from {}", source.id, path.display());
        let table = match pinned_header_position(config, store, &source.id) {
            Some(header_position) => {
                let options = ReadOptions { delimiter, sheet: None, header_position };
                read_table(&path, &source.id, &options)?
            }
            None => {
                let options = ReadOptions { delimiter, ..Default::default() };
                read_table_detected(&path, &source.id, &options, store)?
            }
        };
        tables.push(table);
    }
    Ok(tables)
}

/// Header position of the template pinned for `source_id`, if any.
///
/// `None` means no template is named and the catalog decides per file.
/// Unknown ids fall back to the first row; the session reports them properly.
fn pinned_header_position(
    config: &SessionConfig,
    store: &TemplateStore,
    source_id: &str,
) -> Option<HeaderPosition> {
    let id = config
        .source(source_id)
        .and_then(|s| s.template.as_deref())
        .or(config.template.as_deref())?;
    Some(store.resolve(id).map(|t| t.header_position).unwrap_or_default())
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

fn print_summary(result: &MergeResult, report: Option<&ValidationReport>) {
    let s = &result.stats;
    eprintln!(
        "merge '{}' with template '{}': {} row(s) from {} source(s) -> {} record(s), {} merged, {} unmatched",
        result.meta.session,
        result.meta.template_id,
        s.total_input_rows,
        result.meta.sources.len(),
        s.clusters,
        result.merged.len(),
        result.unmatched.len(),
    );
    eprintln!(
        "conflicts: {} value(s) in {} record(s); {} ambiguous match(es); {} normalization warning(s)",
        s.conflict_notes, s.rows_with_conflicts, s.ambiguous_matches, s.normalization_warnings,
    );
    for (source, columns) in &s.unmapped_columns {
        eprintln!("  {source}: unmapped column(s): {}", columns.join(", "));
    }
    for (source, fields) in &s.missing_required {
        eprintln!("  {source}: missing required field(s): {}", fields.join(", "));
    }
    for (field, total) in &s.field_totals {
        eprintln!("  total {field}: {total}");
    }

    if let Some(report) = report {
        if report.valid {
            eprintln!("validation: ok");
        } else {
            for issue in &report.issues {
                eprintln!("  {}: {}", issue.code, issue.message);
            }
        }
    }
}

pub fn cmd_validate(config_path: PathBuf, catalog: CatalogArgs) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let store = catalog.load()?;

    let template = match config.template.as_deref() {
        Some(id) => {
            let template = store.resolve_valid(id)?;
            config.check_against(template)?;
            for source in &config.sources {
                if let Some(ref override_id) = source.template {
                    let other = store.resolve_valid(override_id)?;
                    if !other.same_fields(template) {
                        return Err(CliError::new(
                            EXIT_TEMPLATE,
                            format!(
                                "source '{}': template '{override_id}' has different fields than '{}'",
                                source.id, template.id
                            ),
                        ));
                    }
                }
            }
            template.id.clone()
        }
        None => "(auto-detect)".to_string(),
    };

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    for source in &config.sources {
        match source.file.as_deref() {
            Some(file) if !base_dir.join(file).is_file() => {
                warn!("source '{}': {} does not exist", source.id, base_dir.join(file).display());
            }
            Some(_) => {}
            None => warn!("source '{}' has no file", source.id),
        }
    }

    eprintln!(
        "valid: session '{}' with {} source(s), {} key field(s), template {}",
        config.name,
        config.sources.len(),
        config.matching.keys.len(),
        template,
    );
    Ok(())
}
