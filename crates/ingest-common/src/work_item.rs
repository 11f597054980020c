//! Work items handed from the enumerator to the ingest workers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Suffix appended to a work item's locator to name its file-mode output.
pub const OUTPUT_FILE_SUFFIX: &str = ".json";

/// One unit of ingest work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "locator", rename_all = "snake_case")]
pub enum WorkItem {
    /// Id of an ingest descriptor held in the document store.
    Descriptor(String),
    /// Path of a raw record file.
    Source(PathBuf),
}

impl WorkItem {
    pub fn descriptor(id: impl Into<String>) -> Self {
        WorkItem::Descriptor(id.into())
    }

    pub fn source(path: impl Into<PathBuf>) -> Self {
        WorkItem::Source(path.into())
    }

    /// Human readable locator, used in logs.
    pub fn locator(&self) -> String {
        match self {
            WorkItem::Descriptor(id) => id.clone(),
            WorkItem::Source(path) => path.display().to_string(),
        }
    }

    /// File name used when documents are written to local disk.
    ///
    /// Source items keep their file name; descriptor ids are flattened so
    /// they cannot escape the output directory.
    pub fn output_file_name(&self) -> String {
        let stem = match self {
            WorkItem::Source(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| sanitize(&path.display().to_string())),
            WorkItem::Descriptor(id) => sanitize(id),
        };
        format!("{}{}", stem, OUTPUT_FILE_SUFFIX)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Descriptor(id) => write!(f, "descriptor:{}", id),
            WorkItem::Source(path) => write!(f, "source:{}", path.display()),
        }
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_name_for_source() {
        let item = WorkItem::source("/data/obs/20240115_1200.ndjson");
        assert_eq!(item.output_file_name(), "20240115_1200.ndjson.json");
    }

    #[test]
    fn test_output_file_name_for_descriptor() {
        let item = WorkItem::descriptor("MD:V01:METAR:obs");
        assert_eq!(item.output_file_name(), "MD_V01_METAR_obs.json");
    }

    #[test]
    fn test_work_item_serialization() {
        let item = WorkItem::descriptor("JOB:V01:CTC");
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, r#"{"kind":"descriptor","locator":"JOB:V01:CTC"}"#);

        let parsed: WorkItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
