//! Contingency table count builder.
//!
//! Input rows pair a model forecast with the matching observation at one
//! station, valid time and lead. One document is built per valid time and
//! lead; `data` maps each threshold to its 2x2 contingency counts for the
//! event `value < threshold`.

use std::collections::{BTreeMap, HashMap};

use ingest_common::{value_to_epoch, CommonError, Context, IngestDescriptor, WorkItem};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::builder::{DocumentBuilder, TemplateBuilder};
use crate::builders::convert;
use crate::builders::layered;
use crate::error::{BuildResult, RecordError, RecordResult};
use crate::functions::{epoch, FunctionRegistry};
use crate::records::read_records;
use crate::resolve::Resolver;

const PAIRS_KEY: &str = "pairs";
const SECONDS_PER_HOUR: i64 = 3600;

static FUNCTIONS: Lazy<FunctionRegistry<CtcBuilder>> = Lazy::new(|| {
    FunctionRegistry::new()
        .with("iso_time", |_, p| convert::iso_time(p))
        .with("fcst_issue_epoch", |_, p| {
            let valid = epoch(p, "fcstValidEpoch")?;
            let lead = epoch(p, "fcstLen")?;
            Ok(Value::from(valid - lead * SECONDS_PER_HOUR))
        })
});

/// Descriptor parameters understood by [`CtcBuilder`].
#[derive(Debug, Clone, Deserialize)]
pub struct CtcParameters {
    pub thresholds: Vec<f64>,
    #[serde(default = "default_forecast_field")]
    pub forecast_field: String,
    #[serde(default = "default_observed_field")]
    pub observed_field: String,
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Row field holding the forecast lead in hours.
    #[serde(default = "default_lead_field")]
    pub lead_field: String,
}

fn default_forecast_field() -> String {
    "fcst".to_string()
}

fn default_observed_field() -> String {
    "obs".to_string()
}

fn default_time_field() -> String {
    "fcstValidEpoch".to_string()
}

fn default_lead_field() -> String {
    "fcstLen".to_string()
}

/// 2x2 contingency counts at one threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Contingency {
    pub hits: u64,
    pub misses: u64,
    pub false_alarms: u64,
    pub correct_negatives: u64,
}

impl Contingency {
    pub fn record(&mut self, forecast: f64, observed: f64, threshold: f64) {
        match (forecast < threshold, observed < threshold) {
            (true, true) => self.hits += 1,
            (true, false) => self.false_alarms += 1,
            (false, true) => self.misses += 1,
            (false, false) => self.correct_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.false_alarms + self.correct_negatives
    }
}

/// Builds one contingency document per (valid time, lead).
///
/// Thresholds are parsed once per descriptor and cached for the life of
/// the builder.
#[derive(Debug, Default)]
pub struct CtcBuilder {
    thresholds: HashMap<String, Vec<f64>>,
}

impl CtcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn construct(descriptor: &IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>> {
        let mut builder = Self::new();
        builder
            .thresholds_for(descriptor)
            .map_err(|message| CommonError::InvalidDescriptor {
                id: descriptor.id.clone(),
                message,
            })?;
        Ok(Box::new(builder))
    }

    /// Cached thresholds for `descriptor`, parsed on first use.
    fn thresholds_for(&mut self, descriptor: &IngestDescriptor) -> Result<Vec<f64>, String> {
        if let Some(thresholds) = self.thresholds.get(&descriptor.id) {
            return Ok(thresholds.clone());
        }

        let params: CtcParameters = descriptor.parameters_as().map_err(|e| e.to_string())?;
        if params.thresholds.is_empty() {
            return Err("at least one threshold is required".to_string());
        }
        if params.thresholds.iter().any(|t| !t.is_finite()) {
            return Err(format!("thresholds must be finite: {:?}", params.thresholds));
        }
        debug!(descriptor = %descriptor.id, thresholds = ?params.thresholds, "Cached thresholds");
        self.thresholds
            .insert(descriptor.id.clone(), params.thresholds.clone());
        Ok(params.thresholds)
    }
}

/// Threshold as a data key: integral values render without a fraction.
pub fn threshold_key(threshold: f64) -> String {
    if threshold.fract() == 0.0 {
        format!("{}", threshold as i64)
    } else {
        threshold.to_string()
    }
}

/// Count every usable pair in `pairs` at `threshold`.
fn count_pairs(pairs: &[Value], params: &CtcParameters, threshold: f64) -> Contingency {
    let mut counts = Contingency::default();
    for pair in pairs.iter().filter_map(Value::as_object) {
        let forecast = pair.get(&params.forecast_field).and_then(Value::as_f64);
        let observed = pair.get(&params.observed_field).and_then(Value::as_f64);
        if let (Some(forecast), Some(observed)) = (forecast, observed) {
            counts.record(forecast, observed, threshold);
        }
    }
    counts
}

fn counts_context(threshold: f64, counts: &Contingency) -> Context {
    let mut ctx = match serde_json::to_value(counts) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    ctx.insert("threshold".to_string(), Value::from(threshold));
    ctx.insert("total".to_string(), Value::from(counts.total()));
    ctx
}

impl TemplateBuilder for CtcBuilder {
    const BUILDER_TYPE: &'static str = "CtcBuilder";

    fn functions(&self) -> &FunctionRegistry<Self> {
        &FUNCTIONS
    }

    fn records(&mut self, descriptor: &IngestDescriptor, item: &WorkItem) -> BuildResult<Vec<Context>> {
        let params: CtcParameters = descriptor.parameters_as()?;
        let rows = read_records(&descriptor.source_for(item)?)?;

        let mut groups: BTreeMap<(i64, i64), Vec<Value>> = BTreeMap::new();
        for row in rows {
            let valid = row.get(&params.time_field).and_then(|v| value_to_epoch(v).ok());
            let lead = row.get(&params.lead_field).and_then(|v| value_to_epoch(v).ok());
            let (Some(valid), Some(lead)) = (valid, lead) else {
                debug!(
                    time_field = %params.time_field,
                    lead_field = %params.lead_field,
                    "Pair without valid time or lead dropped"
                );
                continue;
            };
            groups.entry((valid, lead)).or_default().push(Value::Object(row));
        }

        let contexts = groups
            .into_iter()
            .map(|((valid, lead), pairs)| {
                let mut ctx = Context::new();
                ctx.insert("fcstValidEpoch".to_string(), Value::from(valid));
                ctx.insert("fcstLen".to_string(), Value::from(lead));
                ctx.insert(
                    "subset".to_string(),
                    descriptor.subset.clone().map(Value::String).unwrap_or(Value::Null),
                );
                ctx.insert("pairCount".to_string(), Value::from(pairs.len()));
                ctx.insert(PAIRS_KEY.to_string(), Value::Array(pairs));
                ctx
            })
            .collect();

        Ok(contexts)
    }

    fn load_bulk_data(
        &mut self,
        descriptor: &IngestDescriptor,
        data_template: &Value,
        context: &Context,
    ) -> RecordResult<Value> {
        let thresholds = self.thresholds_for(descriptor).map_err(RecordError::BulkData)?;
        let params: CtcParameters = descriptor
            .parameters_as()
            .map_err(|e| RecordError::BulkData(e.to_string()))?;
        let pairs = context
            .get(PAIRS_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| RecordError::BulkData(format!("context has no '{}' rows", PAIRS_KEY)))?;

        let mut data = Map::new();
        for threshold in thresholds {
            let counts = count_pairs(pairs, &params, threshold);
            let counts_ctx = counts_context(threshold, &counts);

            let entry = if data_template.is_null() {
                Value::Object(counts_ctx)
            } else {
                let ctx = layered(context, &counts_ctx, PAIRS_KEY);
                let resolver = Resolver::new(&*self, self.functions(), &ctx);
                match resolver.resolve(data_template) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(threshold, error = %e, "Threshold skipped");
                        continue;
                    }
                }
            };
            data.insert(threshold_key(threshold), entry);
        }
        Ok(Value::Object(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_documents;
    use serde_json::json;

    const VALID: i64 = 1_705_320_000;

    fn descriptor(thresholds: Value) -> IngestDescriptor {
        IngestDescriptor::from_value(
            "MD:V01:HRRR:CTC:CEILING",
            json!({
                "id": "MD:V01:HRRR:CTC:CEILING",
                "builder_type": "CtcBuilder",
                "subset": "METAR",
                "parameters": {"thresholds": thresholds},
                "template": {
                    "id": "DD:V01:*subset:HRRR:ALL_HRRR:CTC:CEILING:*fcstValidEpoch:*fcstLen",
                    "fcstLen": "*fcstLen",
                    "validISO": "&iso_time|*fcstValidEpoch",
                    "issueEpoch": "&fcst_issue_epoch|*fcstValidEpoch,*fcstLen",
                    "data": null
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_contingency_counts() {
        let mut counts = Contingency::default();
        counts.record(100.0, 200.0, 500.0);
        counts.record(100.0, 900.0, 500.0);
        counts.record(900.0, 100.0, 500.0);
        counts.record(900.0, 900.0, 500.0);
        counts.record(900.0, 900.0, 500.0);
        assert_eq!(
            counts,
            Contingency {
                hits: 1,
                misses: 1,
                false_alarms: 1,
                correct_negatives: 2,
            }
        );
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_threshold_key() {
        assert_eq!(threshold_key(500.0), "500");
        assert_eq!(threshold_key(0.5), "0.5");
    }

    #[test]
    fn test_construct_requires_thresholds() {
        assert!(CtcBuilder::construct(&descriptor(json!([]))).is_err());
        assert!(CtcBuilder::construct(&descriptor(json!([500, 1000]))).is_ok());
    }

    #[test]
    fn test_documents_per_valid_time_and_lead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        let rows = json!([
            {"name": "KPDX", "fcstValidEpoch": VALID, "fcstLen": 6, "fcst": 300, "obs": 400},
            {"name": "KSEA", "fcstValidEpoch": VALID, "fcstLen": 6, "fcst": 3000, "obs": 200},
            {"name": "KBOI", "fcstValidEpoch": VALID, "fcstLen": 6, "fcst": null, "obs": 200},
            {"name": "KPDX", "fcstValidEpoch": VALID, "fcstLen": 12, "fcst": 300, "obs": 3000}
        ]);
        std::fs::write(&path, rows.to_string()).unwrap();

        let descriptor = descriptor(json!([500, 1000]));
        let mut builder = CtcBuilder::new();
        let docs = build_documents(&mut builder, &descriptor, &WorkItem::source(&path)).unwrap();

        assert_eq!(docs.len(), 2);
        let six = &docs[&format!("DD:V01:METAR:HRRR:ALL_HRRR:CTC:CEILING:{}:6", VALID)];
        assert_eq!(six["issueEpoch"], json!(VALID - 6 * 3600));
        assert_eq!(six["validISO"], "2024-01-15T12:00:00Z");
        assert_eq!(six["data"]["500"]["hits"], 1);
        assert_eq!(six["data"]["500"]["misses"], 1);
        assert_eq!(six["data"]["500"]["total"], 2);

        let twelve = &docs[&format!("DD:V01:METAR:HRRR:ALL_HRRR:CTC:CEILING:{}:12", VALID)];
        assert_eq!(twelve["data"]["1000"]["false_alarms"], 1);
    }

    #[test]
    fn test_data_template_sees_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        std::fs::write(
            &path,
            json!([{"fcstValidEpoch": VALID, "fcstLen": 1, "fcst": 10, "obs": 10}]).to_string(),
        )
        .unwrap();

        let mut descriptor = descriptor(json!([500]));
        descriptor.template.insert(
            "data".to_string(),
            json!({"hits": "*hits", "label": "*threshold ft"}),
        );
        let docs =
            build_documents(&mut CtcBuilder::new(), &descriptor, &WorkItem::source(&path)).unwrap();
        let doc = docs.values().next().unwrap();
        assert_eq!(doc["data"]["500"], json!({"hits": 1, "label": "500.0 ft"}));
    }
}
