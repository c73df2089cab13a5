//! Template catalog loading.
//!
//! Bundled templates live in a directory with an `index.json` listing the
//! template files to load. An optional external directory holds user templates;
//! every `*.json` there is loaded and replaces a bundled template with the same id.

use std::path::{Path, PathBuf};

use listmerge_engine::{HeaderTemplate, MergeError, TemplateStore};
use log::{info, warn};

use crate::error::IoError;

pub const INDEX_FILE: &str = "index.json";

/// Load bundled templates (via `index.json`) and then external overrides.
pub fn load_catalog(
    bundled_dir: Option<&Path>,
    external_dir: Option<&Path>,
) -> Result<TemplateStore, IoError> {
    let mut store = TemplateStore::new();

    if let Some(dir) = bundled_dir {
        for path in bundled_files(dir)? {
            if !path.is_file() {
                warn!("template {} listed in index but missing, skipped", path.display());
                continue;
            }
            store.insert(load_template(&path)?);
        }
    }

    if let Some(dir) = external_dir {
        for path in json_files(dir)? {
            let template = load_template(&path)?;
            let id = template.id.clone();
            if store.insert(template).is_some() {
                info!("template '{id}' overridden by {}", path.display());
            }
        }
    }

    Ok(store)
}

/// Parse and validate one template file.
pub fn load_template(path: &Path) -> Result<HeaderTemplate, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::read(path, e))?;
    let template: HeaderTemplate = serde_json::from_str(&text).map_err(|e| IoError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let issues = template.validate();
    if !issues.is_empty() {
        return Err(IoError::Catalog {
            path: path.to_path_buf(),
            source: MergeError::TemplateInvalid {
                id: template.id,
                issues,
            },
        });
    }
    Ok(template)
}

fn bundled_files(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    let index = dir.join(INDEX_FILE);
    if !index.is_file() {
        warn!("no {} in {}, no bundled templates loaded", INDEX_FILE, dir.display());
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(&index).map_err(|e| IoError::read(&index, e))?;
    let names: Vec<String> = serde_json::from_str(&text).map_err(|e| IoError::Json {
        path: index.clone(),
        message: e.to_string(),
    })?;
    Ok(names.iter().map(|name| dir.join(name)).collect())
}

/// `*.json` files in `dir` except the index, sorted by file name.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    if !dir.is_dir() {
        warn!("template directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| IoError::read(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| IoError::read(dir, e))?.path();
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let is_index = path.file_name().is_some_and(|n| n == INDEX_FILE);
        if path.is_file() && is_json && !is_index {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
