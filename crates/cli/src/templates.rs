//! `listmerge templates`: catalog inspection.

use std::path::PathBuf;

use clap::Subcommand;
use listmerge_engine::{FieldKind, HeaderTemplate, TemplateStore};
use listmerge_io::{read_table_detected, ReadOptions};
use serde::Serialize;

use crate::exit_codes::{EXIT_ERROR, EXIT_TEMPLATE};
use crate::{CatalogArgs, CliError};

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List loaded templates
    #[command(after_help = "\
Examples:
  listmerge templates list --templates ./templates
  listmerge templates list --templates ./templates --overrides ~/.listmerge --json")]
    List {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Load every template and report structural problems
    Check {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Show which template best matches a file's header row
    #[command(after_help = "\
Examples:
  listmerge templates detect export.csv --templates ./templates")]
    Detect {
        /// CSV or spreadsheet file to inspect
        file: PathBuf,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_templates(cmd: TemplateCommands) -> Result<(), CliError> {
    match cmd {
        TemplateCommands::List { catalog, json } => cmd_list(&catalog.load()?, json),
        TemplateCommands::Check { catalog } => cmd_check(&catalog.load()?),
        TemplateCommands::Detect { file, catalog, json } => cmd_detect(&catalog.load()?, file, json),
    }
}

#[derive(Serialize)]
struct TemplateSummary<'a> {
    id: &'a str,
    fields: usize,
    required: Vec<&'a str>,
    numeric: Vec<&'a str>,
    header_position: listmerge_engine::HeaderPosition,
}

impl<'a> From<&'a HeaderTemplate> for TemplateSummary<'a> {
    fn from(t: &'a HeaderTemplate) -> Self {
        Self {
            id: &t.id,
            fields: t.fields.len(),
            required: t.fields.iter().filter(|f| f.required).map(|f| f.name.as_str()).collect(),
            numeric: t
                .fields
                .iter()
                .filter(|f| f.kind == FieldKind::Number)
                .map(|f| f.name.as_str())
                .collect(),
            header_position: t.header_position,
        }
    }
}

fn cmd_list(store: &TemplateStore, json: bool) -> Result<(), CliError> {
    let summaries: Vec<TemplateSummary> = store.iter().map(TemplateSummary::from).collect();
    if json {
        let out = serde_json::to_string_pretty(&summaries)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{out}");
        return Ok(());
    }

    if summaries.is_empty() {
        eprintln!("no templates loaded");
        return Ok(());
    }
    for s in &summaries {
        println!(
            "{:<24} {:>3} field(s)  required: {}",
            s.id,
            s.fields,
            if s.required.is_empty() { "-".to_string() } else { s.required.join(", ") },
        );
    }
    Ok(())
}

fn cmd_check(store: &TemplateStore) -> Result<(), CliError> {
    let mut failures = 0;
    for template in store.iter() {
        let issues = TemplateStore::validate(template);
        for issue in &issues {
            eprintln!("  {}: {issue}", template.id);
        }
        if !issues.is_empty() {
            failures += 1;
        }
    }
    if failures > 0 {
        return Err(CliError::new(
            EXIT_TEMPLATE,
            format!("{failures} invalid template(s)"),
        ));
    }
    eprintln!("ok: {} template(s) valid", store.len());
    Ok(())
}

#[derive(Serialize)]
struct Detection<'a> {
    template: &'a str,
    coverage: usize,
    fields: usize,
    columns: Vec<ColumnMatch<'a>>,
}

#[derive(Serialize)]
struct ColumnMatch<'a> {
    header: &'a str,
    field: Option<&'a str>,
}

fn cmd_detect(store: &TemplateStore, file: PathBuf, json: bool) -> Result<(), CliError> {
    let table = read_table_detected(&file, "input", &ReadOptions::default(), store)?;
    let template = store.detect(table.headers()).ok_or_else(|| {
        CliError::new(
            EXIT_TEMPLATE,
            format!("no template matches the headers of {}", file.display()),
        )
        .with_hint("run `listmerge templates list` to see the loaded catalog")
    })?;

    let detection = Detection {
        template: &template.id,
        coverage: template.coverage(table.headers()),
        fields: template.fields.len(),
        columns: table
            .headers()
            .iter()
            .map(|h| ColumnMatch {
                header: h,
                field: template.resolve_header(h).map(|i| template.fields[i].name.as_str()),
            })
            .collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&detection)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "{} ({} of {} field(s) covered)",
        detection.template, detection.coverage, detection.fields
    );
    for col in &detection.columns {
        println!("  {:<24} -> {}", col.header, col.field.unwrap_or("(unmapped)"));
    }
    Ok(())
}
