//! Upper-air sounding builder.
//!
//! A sounding row carries one station launch with its reported levels.
//! Every launch is interpolated (linearly in ln p) onto the configured
//! mandatory pressure levels; one document is built per valid time and
//! level, with `data` keyed by station.

use std::collections::BTreeMap;

use ingest_common::time::nearest_cadence;
use ingest_common::{value_to_epoch, CommonError, Context, IngestDescriptor, ParamMap, WorkItem};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::{DocumentBuilder, TemplateBuilder};
use crate::builders::convert::{self, convert};
use crate::builders::entity_data;
use crate::error::{BuildResult, FunctionError, RecordResult};
use crate::functions::{float_value, number, FunctionRegistry};
use crate::records::read_records;

const SOUNDINGS_KEY: &str = "soundings";
const WIND_DIRECTION_FIELD: &str = "windDirection";

static FUNCTIONS: Lazy<FunctionRegistry<SoundingBuilder>> = Lazy::new(|| {
    FunctionRegistry::new()
        .with("dewpoint_depression", |_, p| {
            float_value(convert::round2(
                number(p, "temperature")? - number(p, "dewpoint")?,
            ))
        })
        .with("ms_to_knots", |_, p| convert(p, convert::ms_to_knots))
        .with("wind_u", |_, p| wind_component(p, convert::wind_u))
        .with("wind_v", |_, p| wind_component(p, convert::wind_v))
        .with("iso_time", |_, p| convert::iso_time(p))
});

fn wind_component(params: &ParamMap, f: fn(f64, f64) -> f64) -> Result<Value, FunctionError> {
    let speed = number(params, "windSpeed")?;
    let direction = number(params, WIND_DIRECTION_FIELD)?;
    float_value(convert::round2(f(speed, direction)))
}

/// Descriptor parameters understood by [`SoundingBuilder`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoundingParameters {
    /// Target pressure levels in hPa.
    pub levels: Vec<f64>,
    pub station_field: String,
    pub time_field: String,
    /// Row field holding the reported levels.
    pub levels_field: String,
    /// Level field holding pressure in hPa.
    pub pressure_field: String,
    pub cadence_secs: i64,
}

impl Default for SoundingParameters {
    fn default() -> Self {
        Self {
            levels: vec![
                1000.0, 925.0, 850.0, 700.0, 500.0, 400.0, 300.0, 250.0, 200.0, 150.0, 100.0,
            ],
            station_field: "station".to_string(),
            time_field: "launchEpoch".to_string(),
            levels_field: "levels".to_string(),
            pressure_field: "pressure".to_string(),
            cadence_secs: 43_200,
        }
    }
}

impl SoundingParameters {
    pub fn validate(&self, id: &str) -> Result<(), CommonError> {
        if self.cadence_secs <= 0 || self.levels.is_empty() {
            return Err(CommonError::InvalidDescriptor {
                id: id.to_string(),
                message: "cadence_secs must be positive and levels non-empty".to_string(),
            });
        }
        if self.levels.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(CommonError::InvalidDescriptor {
                id: id.to_string(),
                message: format!("pressure levels must be positive: {:?}", self.levels),
            });
        }
        Ok(())
    }
}

/// Builds one document per (valid time, pressure level).
#[derive(Debug, Default)]
pub struct SoundingBuilder;

impl SoundingBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn construct(descriptor: &IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>> {
        let params: SoundingParameters = descriptor.parameters_as()?;
        params.validate(&descriptor.id)?;
        Ok(Box::new(Self::new()))
    }
}

/// Reported levels of one launch with a usable pressure, highest
/// pressure (lowest altitude) first.
fn reported_levels(row: &Context, params: &SoundingParameters) -> Vec<(f64, Map<String, Value>)> {
    let mut levels: Vec<(f64, Map<String, Value>)> = row
        .get(&params.levels_field)
        .and_then(Value::as_array)
        .map(|levels| {
            levels
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|level| {
                    let pressure = level.get(&params.pressure_field)?.as_f64()?;
                    (pressure > 0.0).then(|| (pressure, level.clone()))
                })
                .collect()
        })
        .unwrap_or_default();
    levels.sort_by(|a, b| b.0.total_cmp(&a.0));
    levels
}

/// Interpolate one launch onto `target` hPa. `None` when the target lies
/// outside the reported column.
pub fn interpolate_level(
    levels: &[(f64, Map<String, Value>)],
    target: f64,
    pressure_field: &str,
) -> Option<Map<String, Value>> {
    if let Some((_, exact)) = levels.iter().find(|(p, _)| (*p - target).abs() < 1e-6) {
        return Some(exact.clone());
    }

    // Levels are ordered by decreasing pressure.
    let upper = levels.iter().position(|(p, _)| *p < target)?;
    if upper == 0 {
        return None;
    }
    let (p_below, below) = &levels[upper - 1];
    let (p_above, above) = &levels[upper];

    let weight = (target.ln() - p_below.ln()) / (p_above.ln() - p_below.ln());
    let mut level = Map::new();
    for (key, low) in below {
        if key == pressure_field {
            continue;
        }
        let (Some(low), Some(high)) = (low.as_f64(), above.get(key).and_then(Value::as_f64)) else {
            continue;
        };
        let value = if key == WIND_DIRECTION_FIELD {
            interpolate_direction(low, high, weight)
        } else {
            low + (high - low) * weight
        };
        if let Some(number) = serde_json::Number::from_f64(convert::round2(value)) {
            level.insert(key.clone(), Value::Number(number));
        }
    }
    level.insert(pressure_field.to_string(), Value::from(target));
    Some(level)
}

/// Interpolate wind direction along the shorter arc.
fn interpolate_direction(low: f64, high: f64, weight: f64) -> f64 {
    let mut delta = (high - low) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    (low + delta * weight).rem_euclid(360.0)
}

/// Integral pressures render without a fractional part in ids.
fn level_value(level: f64) -> Value {
    if level.fract() == 0.0 && level.abs() < i64::MAX as f64 {
        Value::from(level as i64)
    } else {
        Value::from(level)
    }
}

impl TemplateBuilder for SoundingBuilder {
    const BUILDER_TYPE: &'static str = "SoundingBuilder";

    fn functions(&self) -> &FunctionRegistry<Self> {
        &FUNCTIONS
    }

    fn records(&mut self, descriptor: &IngestDescriptor, item: &WorkItem) -> BuildResult<Vec<Context>> {
        let params: SoundingParameters = descriptor.parameters_as()?;
        params.validate(&descriptor.id)?;
        let rows = read_records(&descriptor.source_for(item)?)?;

        // (valid time, level index) -> station rows
        let mut groups: BTreeMap<(i64, usize), Vec<Value>> = BTreeMap::new();
        for row in &rows {
            let Some(launch) = row.get(&params.time_field).and_then(|v| value_to_epoch(v).ok())
            else {
                debug!(field = %params.time_field, "Sounding without launch time dropped");
                continue;
            };
            let Some(station) = row.get(&params.station_field).filter(|v| !v.is_null()) else {
                debug!(field = %params.station_field, "Sounding without station dropped");
                continue;
            };

            let Some(valid) = nearest_cadence(launch, params.cadence_secs) else {
                debug!(launch, "Sounding launch time out of range dropped");
                continue;
            };
            let levels = reported_levels(row, &params);
            for (index, target) in params.levels.iter().enumerate() {
                let Some(mut level) = interpolate_level(&levels, *target, &params.pressure_field)
                else {
                    continue;
                };
                level.insert(params.station_field.clone(), station.clone());
                level.insert(params.time_field.clone(), Value::from(launch));
                groups.entry((valid, index)).or_default().push(Value::Object(level));
            }
        }

        let contexts = groups
            .into_iter()
            .map(|((valid, index), soundings)| {
                let mut ctx = Context::new();
                ctx.insert("fcstValidEpoch".to_string(), Value::from(valid));
                ctx.insert("level".to_string(), level_value(params.levels[index]));
                ctx.insert(
                    "subset".to_string(),
                    descriptor.subset.clone().map(Value::String).unwrap_or(Value::Null),
                );
                ctx.insert(SOUNDINGS_KEY.to_string(), Value::Array(soundings));
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
        let params: SoundingParameters = descriptor.parameters_as().unwrap_or_default();
        entity_data(&*self, SOUNDINGS_KEY, &params.station_field, data_template, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_documents;
    use serde_json::json;
    use test_utils::assert_approx_eq;

    const LAUNCH: i64 = 1_705_319_400; // 11:50Z, rounds to 12Z

    fn levels(value: Value) -> Vec<(f64, Map<String, Value>)> {
        let row = match json!({ "levels": value }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        reported_levels(&row, &SoundingParameters::default())
    }

    #[test]
    fn test_exact_level_passthrough() {
        let levels = levels(json!([
            {"pressure": 1000, "temperature": 290.0},
            {"pressure": 850, "temperature": 280.0}
        ]));
        let level = interpolate_level(&levels, 850.0, "pressure").unwrap();
        assert_eq!(level["temperature"], json!(280.0));
    }

    #[test]
    fn test_log_pressure_interpolation() {
        let levels = levels(json!([
            {"pressure": 900, "temperature": 280.0},
            {"pressure": 800, "temperature": 270.0}
        ]));
        let level = interpolate_level(&levels, 850.0, "pressure").unwrap();
        let expected = 280.0 - 10.0 * ((850f64.ln() - 900f64.ln()) / (800f64.ln() - 900f64.ln()));
        assert_approx_eq!(level["temperature"].as_f64().unwrap(), expected, 0.01);
        assert_eq!(level["pressure"], json!(850.0));
    }

    #[test]
    fn test_no_extrapolation() {
        let levels = levels(json!([
            {"pressure": 900, "temperature": 280.0},
            {"pressure": 800, "temperature": 270.0}
        ]));
        assert!(interpolate_level(&levels, 1000.0, "pressure").is_none());
        assert!(interpolate_level(&levels, 700.0, "pressure").is_none());
    }

    #[test]
    fn test_direction_takes_short_arc() {
        let d = interpolate_direction(350.0, 10.0, 0.5);
        assert!(d.abs() < 1e-9 || (d - 360.0).abs() < 1e-9);
        assert_approx_eq!(interpolate_direction(10.0, 350.0, 0.25), 5.0, 1e-9);
    }

    #[test]
    fn test_documents_per_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raob.json");
        let rows = json!([
            {"station": "72694", "launchEpoch": LAUNCH, "levels": [
                {"pressure": 1000, "temperature": 288.0, "dewpoint": 285.0, "windSpeed": 5.0, "windDirection": 270.0},
                {"pressure": 850, "temperature": 280.0, "dewpoint": 275.5, "windSpeed": 10.0, "windDirection": 280.0},
                {"pressure": 700, "temperature": 270.0, "dewpoint": 260.0, "windSpeed": 15.0, "windDirection": 290.0}
            ]},
            {"station": "72786", "launchEpoch": LAUNCH + 600, "levels": [
                {"pressure": 925, "temperature": 284.0, "dewpoint": 280.0, "windSpeed": 8.0, "windDirection": 200.0},
                {"pressure": 850, "temperature": 279.0, "dewpoint": 270.0, "windSpeed": 9.0, "windDirection": 210.0}
            ]}
        ]);
        std::fs::write(&path, rows.to_string()).unwrap();

        let descriptor = IngestDescriptor::from_value(
            "MD:V01:RAOB:obs",
            json!({
                "id": "MD:V01:RAOB:obs",
                "builder_type": "SoundingBuilder",
                "subset": "RAOB",
                "parameters": {"levels": [1000, 925, 850, 700]},
                "template": {
                    "id": "DD:V01:*subset:obs:*fcstValidEpoch:*level",
                    "level": "*level",
                    "data": {
                        "dewpointDepression": "&dewpoint_depression|*temperature,*dewpoint",
                        "u": "&wind_u|*windSpeed,*windDirection"
                    }
                }
            }),
        )
        .unwrap();

        let docs = build_documents(
            &mut SoundingBuilder::new(),
            &descriptor,
            &WorkItem::source(&path),
        )
        .unwrap();

        let valid = 1_705_320_000;
        assert_eq!(docs.len(), 4);
        let at_850 = &docs[&format!("DD:V01:RAOB:obs:{}:850", valid)];
        assert_eq!(at_850["level"], json!(850));
        assert_eq!(at_850["data"]["72694"]["dewpointDepression"], json!(4.5));
        assert_eq!(at_850["data"].as_object().unwrap().len(), 2);

        // Only 72694 reaches 1000 hPa.
        let at_1000 = &docs[&format!("DD:V01:RAOB:obs:{}:1000", valid)];
        assert_eq!(at_1000["data"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_launch_and_bad_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raob.json");
        let rows = json!([
            {"station": "72694", "launchEpoch": i64::MAX, "levels": [
                {"pressure": 850, "temperature": 280.0, "dewpoint": 275.5}
            ]}
        ]);
        std::fs::write(&path, rows.to_string()).unwrap();
        let mut descriptor = IngestDescriptor::from_value(
            "MD:V01:RAOB:obs",
            json!({
                "id": "MD:V01:RAOB:obs",
                "builder_type": "SoundingBuilder",
                "parameters": {"levels": [850]},
                "template": {"id": "DD:V01:obs:*fcstValidEpoch:*level"}
            }),
        )
        .unwrap();
        let item = WorkItem::source(&path);

        // Out-of-range launch is dropped, not a panic.
        let docs = build_documents(&mut SoundingBuilder::new(), &descriptor, &item).unwrap();
        assert!(docs.is_empty());

        descriptor.parameters.insert("levels".to_string(), json!([850, -10]));
        let err = build_documents(&mut SoundingBuilder::new(), &descriptor, &item).unwrap_err();
        assert!(err.to_string().contains("pressure levels must be positive"));
    }
}
