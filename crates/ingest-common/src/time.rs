//! Epoch and ISO-8601 conversions used by templates and builders.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{CommonError, CommonResult};

/// Interpret a JSON value as an integer epoch in seconds.
///
/// Integral floats (`1705320000.0`) and numeric strings are accepted since
/// record readers do not always preserve integer types.
pub fn value_to_epoch(value: &Value) -> CommonResult<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
                _ => Err(CommonError::InvalidEpoch(n.to_string())),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CommonError::InvalidEpoch(s.clone())),
        other => Err(CommonError::InvalidEpoch(other.to_string())),
    }
}

/// Render an epoch (seconds) as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn epoch_to_iso8601(epoch: i64) -> CommonResult<String> {
    let dt: DateTime<Utc> =
        DateTime::from_timestamp(epoch, 0).ok_or(CommonError::EpochOutOfRange(epoch))?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Round an epoch to the nearest multiple of `cadence` seconds.
///
/// Returns `None` when the rounded value does not fit in an `i64`.
pub fn nearest_cadence(epoch: i64, cadence: i64) -> Option<i64> {
    if cadence <= 0 {
        return Some(epoch);
    }
    let lower = epoch.div_euclid(cadence).checked_mul(cadence)?;
    let offset = epoch - lower;
    if offset >= cadence - offset {
        lower.checked_add(cadence)
    } else {
        Some(lower)
    }
}
