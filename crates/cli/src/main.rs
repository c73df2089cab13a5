// listmerge CLI - merge tabular lists with differing headers into one list

mod exit_codes;
mod merge;
mod templates;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use listmerge_engine::MergeError;
use listmerge_io::IoError;

use exit_codes::{EXIT_CONFIG, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_TEMPLATE, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "listmerge")]
#[command(about = "Merge CSV/Excel lists with differing headers into one de-duplicated list")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Where header templates are loaded from.
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Bundled template directory (contains index.json)
    #[arg(long, env = "LISTMERGE_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Directory of user templates overriding bundled ones by id
    #[arg(long, env = "LISTMERGE_TEMPLATE_OVERRIDES")]
    overrides: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<listmerge_engine::TemplateStore, CliError> {
        let store = listmerge_io::load_catalog(self.templates.as_deref(), self.overrides.as_deref())?;
        log::info!("template catalog: {} template(s)", store.len());
        Ok(store)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the sources of a session config
    #[command(after_help = "\
Examples:
  listmerge run customers.toml --templates ./templates
  listmerge run customers.toml --templates ./templates --json
  listmerge run customers.toml --export merged.xlsx
  listmerge run customers.toml --export out/ --fail-on-conflict")]
    Run {
        /// Path to the session .toml config
        config: PathBuf,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Print the merge result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON result to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Export merged lists: a .xlsx path, or a directory for CSV files
        #[arg(long)]
        export: Option<PathBuf>,

        /// Exit with code 6 when any field conflict was recorded
        #[arg(long)]
        fail_on_conflict: bool,
    },

    /// Validate a session config and its template without reading sources
    #[command(after_help = "\
Examples:
  listmerge validate customers.toml --templates ./templates")]
    Validate {
        config: PathBuf,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Inspect the template catalog
    #[command(subcommand)]
    Templates(templates::TemplateCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            catalog,
            json,
            output,
            export,
            fail_on_conflict,
        } => merge::cmd_run(merge::RunArgs {
            config,
            catalog,
            json,
            output,
            export,
            fail_on_conflict,
        }),
        Commands::Validate { config, catalog } => merge::cmd_validate(config, catalog),
        Commands::Templates(cmd) => templates::cmd_templates(cmd),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<MergeError> for CliError {
    fn from(err: MergeError) -> Self {
        let message = err.to_string();
        match err {
            MergeError::TemplateNotFound { .. } => Self::new(EXIT_TEMPLATE, message).with_hint(
                "point --templates at a catalog directory, or name a template in the config",
            ),
            MergeError::TemplateInvalid { .. } => Self::new(EXIT_TEMPLATE, message),
            MergeError::ConfigParse(_) | MergeError::ConfigValidation(_) => Self::config(message),
            MergeError::Cancelled { .. } => Self::new(EXIT_ERROR, message),
        }
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        let code = match err {
            IoError::Catalog { .. } | IoError::Json { .. } => EXIT_TEMPLATE,
            _ => EXIT_IO,
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_errors_map_to_exit_codes() {
        let err: CliError = MergeError::TemplateNotFound { id: "x".into() }.into();
        assert_eq!(err.code, EXIT_TEMPLATE);
        assert!(err.hint.is_some());

        let err: CliError = MergeError::ConfigValidation("bad".into()).into();
        assert_eq!(err.code, EXIT_CONFIG);

        let err: CliError = MergeError::Cancelled { completed_sources: 1 }.into();
        assert_eq!(err.code, EXIT_ERROR);
    }

    #[test]
    fn io_errors_map_to_exit_codes() {
        let err: CliError = IoError::Unsupported { path: "a.pdf".into() }.into();
        assert_eq!(err.code, EXIT_IO);
    }
}
