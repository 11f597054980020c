//! Ingest descriptors: which builder to run, with which template.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommonError, CommonResult};
use crate::work_item::WorkItem;

/// Configuration naming a builder type, its template and domain parameters.
///
/// Descriptors are fetched from the store (or seeded from configuration)
/// and shared read-only by every item a worker processes with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDescriptor {
    pub id: String,
    pub builder_type: String,
    pub template: Map<String, Value>,
    #[serde(default)]
    pub subset: Option<String>,
    /// Record locator used when the work item is the descriptor id itself.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl IngestDescriptor {
    /// Parse a descriptor document fetched under `id`.
    pub fn from_value(id: &str, value: Value) -> CommonResult<Self> {
        serde_json::from_value(value).map_err(|e| CommonError::InvalidDescriptor {
            id: id.to_string(),
            message: e.to_string(),
        })
    }

    /// Deserialize the free-form `parameters` into a builder's typed view.
    pub fn parameters_as<T: DeserializeOwned>(&self) -> CommonResult<T> {
        serde_json::from_value(Value::Object(self.parameters.clone())).map_err(|e| {
            CommonError::InvalidDescriptor {
                id: self.id.clone(),
                message: format!("parameters: {}", e),
            }
        })
    }

    /// Where to read records for `item`.
    pub fn source_for(&self, item: &WorkItem) -> CommonResult<std::path::PathBuf> {
        match item {
            WorkItem::Source(path) => Ok(path.clone()),
            WorkItem::Descriptor(_) => self
                .source
                .as_ref()
                .map(std::path::PathBuf::from)
                .ok_or_else(|| CommonError::MissingSource(self.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor_json() -> Value {
        json!({
            "id": "MD:V01:METAR:obs",
            "builder_type": "ObsBuilder",
            "subset": "METAR",
            "template": {"id": "DD:V01:METAR:obs:*fcstValidEpoch", "type": "DD"},
            "parameters": {"cadence_secs": 3600, "delta_secs": 900}
        })
    }

    #[derive(Debug, Deserialize)]
    struct Cadence {
        cadence_secs: i64,
        delta_secs: i64,
    }

    #[test]
    fn test_from_value() {
        let descriptor = IngestDescriptor::from_value("MD:V01:METAR:obs", descriptor_json()).unwrap();
        assert_eq!(descriptor.builder_type, "ObsBuilder");
        assert_eq!(descriptor.subset.as_deref(), Some("METAR"));
        assert!(descriptor.source.is_none());

        let cadence: Cadence = descriptor.parameters_as().unwrap();
        assert_eq!(cadence.cadence_secs, 3600);
        assert_eq!(cadence.delta_secs, 900);
    }

    #[test]
    fn test_from_value_missing_template() {
        let err = IngestDescriptor::from_value("bad", json!({"id": "bad", "builder_type": "X"}))
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_source_for() {
        let mut descriptor =
            IngestDescriptor::from_value("MD:V01:METAR:obs", descriptor_json()).unwrap();
        let file = WorkItem::source("/tmp/obs.json");
        assert_eq!(
            descriptor.source_for(&file).unwrap(),
            std::path::PathBuf::from("/tmp/obs.json")
        );

        let by_id = WorkItem::descriptor("MD:V01:METAR:obs");
        assert!(descriptor.source_for(&by_id).is_err());

        descriptor.source = Some("/data/metar.ndjson".to_string());
        assert_eq!(
            descriptor.source_for(&by_id).unwrap(),
            std::path::PathBuf::from("/data/metar.ndjson")
        );
    }
}
