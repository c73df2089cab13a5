//! CLI Exit Code Registry
//!
//! Single source of truth for `listmerge` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified, cancelled session)       |
//! | 2    | CLI usage error (bad args, unreadable config path)   |
//! | 3    | Template not found or structurally invalid           |
//! | 4    | Session config failed to parse or validate           |
//! | 5    | Source file could not be read, or export failed      |
//! | 6    | Merge completed with conflicts (`--fail-on-conflict`)|
//! | 7    | Post-merge validation reported issues                |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `CliError` construction

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Template id unknown, auto-detection found nothing, or a template file is invalid.
pub const EXIT_TEMPLATE: u8 = 3;

/// Session config TOML did not parse or failed validation.
pub const EXIT_CONFIG: u8 = 4;

/// Reading a source file or writing output failed.
pub const EXIT_IO: u8 = 5;

/// `run --fail-on-conflict` and at least one conflict was recorded.
pub const EXIT_CONFLICTS: u8 = 6;

/// `[validation]` expectations were not met.
pub const EXIT_VALIDATION: u8 = 7;
