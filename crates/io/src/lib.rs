//! `listmerge-io`: template catalog loading, source table reading and
//! merge result export for the engine.

pub mod catalog;
pub mod csv;
pub mod error;
pub mod export;
pub mod table;
pub mod xlsx;

pub use catalog::{load_catalog, load_template};
pub use error::IoError;
pub use export::{write_csv, write_xlsx, ExportSummary};
pub use table::{
    detect_header_position, read_raw_rows, read_table, read_table_detected, table_from_rows,
    ReadOptions,
};
