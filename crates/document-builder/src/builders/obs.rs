//! Point observation builder.
//!
//! Observation rows (one station report each) are bucketed to the nearest
//! valid time on a fixed cadence. Each bucket becomes one document whose
//! `data` maps station name to that station's resolved data template.

use std::collections::BTreeMap;

use ingest_common::time::nearest_cadence;
use ingest_common::{value_to_epoch, CommonError, Context, IngestDescriptor, ParamMap, WorkItem};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::builder::{DocumentBuilder, TemplateBuilder};
use crate::builders::convert::{self, convert};
use crate::builders::entity_data;
use crate::error::{BuildResult, FunctionError, RecordResult};
use crate::functions::{float_value, number, FunctionRegistry};
use crate::records::read_records;

/// Context key holding the rows of one bucket.
const OBSERVATIONS_KEY: &str = "observations";

/// Closest report per station: distance from the valid time and the row.
type Stations = BTreeMap<String, (i64, Context)>;

static FUNCTIONS: Lazy<FunctionRegistry<ObsBuilder>> = Lazy::new(|| {
    FunctionRegistry::new()
        .with("kelvin_to_celsius", |_, p| convert(p, convert::kelvin_to_celsius))
        .with("kelvin_to_fahrenheit", |_, p| {
            convert(p, convert::kelvin_to_fahrenheit)
        })
        .with("ms_to_knots", |_, p| convert(p, convert::ms_to_knots))
        .with("round", |_, p| convert(p, |value| value))
        .with("iso_time", |_, p| convert::iso_time(p))
        .with("ceiling_agl", ObsBuilder::ceiling_agl)
});

/// Descriptor parameters understood by [`ObsBuilder`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObsParameters {
    /// Row field holding the observation epoch.
    pub time_field: String,
    /// Row field naming the station.
    pub entity_field: String,
    /// Spacing of valid times, in seconds.
    pub cadence_secs: i64,
    /// Largest accepted distance from a valid time, in seconds.
    pub delta_secs: i64,
}

impl Default for ObsParameters {
    fn default() -> Self {
        Self {
            time_field: "timeObs".to_string(),
            entity_field: "name".to_string(),
            cadence_secs: 3600,
            delta_secs: 1800,
        }
    }
}

impl ObsParameters {
    /// Reject a cadence or window the bucketing cannot use.
    pub fn validate(&self, id: &str) -> Result<(), CommonError> {
        if self.cadence_secs <= 0 || self.delta_secs < 0 {
            return Err(CommonError::InvalidDescriptor {
                id: id.to_string(),
                message: format!(
                    "cadence_secs must be positive and delta_secs non-negative (got {}, {})",
                    self.cadence_secs, self.delta_secs
                ),
            });
        }
        Ok(())
    }
}

/// Builds one document per observation valid time.
#[derive(Debug, Default)]
pub struct ObsBuilder;

impl ObsBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn construct(descriptor: &IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>> {
        let params: ObsParameters = descriptor.parameters_as()?;
        params.validate(&descriptor.id)?;
        Ok(Box::new(Self::new()))
    }

    /// Ceiling above ground: reported ceiling (MSL) minus station elevation.
    fn ceiling_agl(&self, params: &ParamMap) -> Result<Value, FunctionError> {
        let ceiling = number(params, "ceiling")?;
        let elevation = number(params, "elevation")?;
        if ceiling < elevation {
            return Err(FunctionError::Failed(format!(
                "ceiling {} below station elevation {}",
                ceiling, elevation
            )));
        }
        float_value(ceiling - elevation)
    }

    /// Bucket rows by valid time, keeping the report closest to the valid
    /// time for each station.
    fn bucket(params: &ObsParameters, rows: Vec<Context>) -> BTreeMap<i64, Stations> {
        let mut buckets: BTreeMap<i64, Stations> = BTreeMap::new();

        for row in rows {
            let Some(observed) = row.get(&params.time_field).and_then(|v| value_to_epoch(v).ok())
            else {
                debug!(field = %params.time_field, "Row without observation time dropped");
                continue;
            };
            let Some(station) = row.get(&params.entity_field).and_then(Value::as_str) else {
                debug!(field = %params.entity_field, "Row without station dropped");
                continue;
            };

            let Some(valid) = nearest_cadence(observed, params.cadence_secs) else {
                debug!(station = %station, observed, "Observation time out of range dropped");
                continue;
            };
            let Some(distance) = observed.checked_sub(valid).and_then(i64::checked_abs) else {
                debug!(station = %station, observed, valid, "Observation time out of range dropped");
                continue;
            };
            if distance > params.delta_secs {
                debug!(station = %station, observed, valid, "Observation outside valid window");
                continue;
            }

            let stations = buckets.entry(valid).or_default();
            let closer = stations
                .get(station)
                .map_or(true, |(best, _)| distance < *best);
            if closer {
                stations.insert(station.to_string(), (distance, row));
            }
        }

        buckets
    }
}

impl TemplateBuilder for ObsBuilder {
    const BUILDER_TYPE: &'static str = "ObsBuilder";

    fn functions(&self) -> &FunctionRegistry<Self> {
        &FUNCTIONS
    }

    fn records(&mut self, descriptor: &IngestDescriptor, item: &WorkItem) -> BuildResult<Vec<Context>> {
        let params: ObsParameters = descriptor.parameters_as()?;
        params.validate(&descriptor.id)?;
        let rows = read_records(&descriptor.source_for(item)?)?;

        let contexts = Self::bucket(&params, rows)
            .into_iter()
            .map(|(valid, stations)| {
                let mut ctx = Context::new();
                ctx.insert("fcstValidEpoch".to_string(), Value::from(valid));
                ctx.insert(
                    "subset".to_string(),
                    descriptor.subset.clone().map(Value::String).unwrap_or(Value::Null),
                );
                ctx.insert("stationCount".to_string(), Value::from(stations.len()));
                ctx.insert(
                    OBSERVATIONS_KEY.to_string(),
                    Value::Array(stations.into_values().map(|(_, row)| Value::Object(row)).collect()),
                );
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
        let params: ObsParameters = descriptor.parameters_as().unwrap_or_default();
        entity_data(&*self, OBSERVATIONS_KEY, &params.entity_field, data_template, context)
    }
}
