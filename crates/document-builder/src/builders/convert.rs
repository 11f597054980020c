//! Unit conversions and parameter helpers shared by the builders.

use ingest_common::{epoch_to_iso8601, ParamMap};
use serde_json::Value;

use crate::error::FunctionError;
use crate::functions::{epoch, float_value, number};

const KNOTS_PER_MS: f64 = 1.943_844_5;

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - 273.15) * 9.0 / 5.0 + 32.0
}

pub fn ms_to_knots(speed: f64) -> f64 {
    speed * KNOTS_PER_MS
}

/// Eastward wind component for meteorological direction (degrees the
/// wind blows from).
pub fn wind_u(speed: f64, direction_deg: f64) -> f64 {
    -speed * direction_deg.to_radians().sin()
}

/// Northward wind component.
pub fn wind_v(speed: f64, direction_deg: f64) -> f64 {
    -speed * direction_deg.to_radians().cos()
}

/// Round to two decimals, the precision documents are stored at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The name of a function's only parameter.
fn single_key(params: &ParamMap) -> Result<&str, FunctionError> {
    let mut keys = params.keys();
    match (keys.next(), keys.next()) {
        (Some(key), None) => Ok(key.as_str()),
        _ => Err(FunctionError::Failed(format!(
            "expected exactly one parameter, got {}",
            params.len()
        ))),
    }
}

/// The value of a single-parameter function, as a number.
pub fn single_number(params: &ParamMap) -> Result<f64, FunctionError> {
    number(params, single_key(params)?)
}

/// Apply a unary conversion to a single-parameter call.
pub fn convert(params: &ParamMap, f: fn(f64) -> f64) -> Result<Value, FunctionError> {
    float_value(round2(f(single_number(params)?)))
}

/// ISO-8601 text for a single epoch parameter.
pub fn iso_time(params: &ParamMap) -> Result<Value, FunctionError> {
    let seconds = epoch(params, single_key(params)?)?;
    epoch_to_iso8601(seconds)
        .map(Value::String)
        .map_err(|e| FunctionError::Failed(e.to_string()))
}
