//! Work enumeration: turns command-line descriptors and source paths into
//! the queue's work items.

use anyhow::{Context, Result};
use ingest_common::WorkItem;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// File name endings read by the record source.
const RECORD_SUFFIXES: [&str; 4] = [".json", ".ndjson", ".json.gz", ".ndjson.gz"];

/// Descriptor items first, then source files. Directories are walked
/// recursively and their record files added in path order.
pub fn enumerate_items(descriptors: &[String], sources: &[PathBuf]) -> Result<Vec<WorkItem>> {
    let mut items: Vec<WorkItem> = descriptors.iter().map(WorkItem::descriptor).collect();

    for source in sources {
        if source.is_dir() {
            let files = record_files(source)?;
            info!(dir = %source.display(), files = files.len(), "Enumerated source directory");
            items.extend(files.into_iter().map(WorkItem::Source));
        } else {
            anyhow::ensure!(source.is_file(), "Source not found: {}", source.display());
            items.push(WorkItem::source(source.clone()));
        }
    }

    Ok(items)
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_record_file(entry.path()) {
            files.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "Skipping non-record file");
        }
    }
    Ok(files)
}

fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .map_or(false, |name| RECORD_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}
