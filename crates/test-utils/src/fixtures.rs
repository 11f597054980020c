//! Common test fixtures for ingest tests.
//!
//! Descriptors for each shipped builder, plus fixed epochs so expected
//! ids can be written out literally.

use ingest_common::IngestDescriptor;
use serde_json::{json, Value};

/// Fixed epochs used across the suite.
pub mod epochs {
    /// 2024-01-15T12:00:00Z
    pub const VALID_12Z: i64 = 1_705_320_000;

    /// 2024-01-15T13:00:00Z
    pub const VALID_13Z: i64 = VALID_12Z + 3600;

    /// 2024-01-16T00:00:00Z
    pub const VALID_00Z: i64 = VALID_12Z + 12 * 3600;
}

pub const OBS_DESCRIPTOR_ID: &str = "MD:V01:METAR:obs:ingest";
pub const SOUNDING_DESCRIPTOR_ID: &str = "MD:V01:RAOB:obs:ingest";
pub const CTC_DESCRIPTOR_ID: &str = "MD:V01:HRRR:CTC:CEILING:ingest";

/// Observation descriptor as stored, with an optional record source.
pub fn obs_descriptor_json(source: Option<&str>) -> Value {
    json!({
        "id": OBS_DESCRIPTOR_ID,
        "builder_type": "ObsBuilder",
        "subset": "METAR",
        "source": source,
        "parameters": {"cadence_secs": 3600, "delta_secs": 1800},
        "template": {
            "id": "DD:V01:*subset:obs:*fcstValidEpoch",
            "type": "DD",
            "docType": "obs",
            "fcstValidEpoch": "*fcstValidEpoch",
            "fcstValidISO": "{ISO}*fcstValidEpoch",
            "data": {
                "name": "*name",
                "temperature": "&kelvin_to_fahrenheit|*temperature",
                "windSpeed": "&ms_to_knots|*windSpeed"
            }
        }
    })
}

pub fn obs_descriptor(source: Option<&str>) -> IngestDescriptor {
    IngestDescriptor::from_value(OBS_DESCRIPTOR_ID, obs_descriptor_json(source))
        .expect("obs descriptor fixture is valid")
}

pub fn sounding_descriptor_json() -> Value {
    json!({
        "id": SOUNDING_DESCRIPTOR_ID,
        "builder_type": "SoundingBuilder",
        "subset": "RAOB",
        "parameters": {"levels": [850, 500]},
        "template": {
            "id": "DD:V01:*subset:obs:*fcstValidEpoch:*level",
            "type": "DD",
            "level": "*level",
            "data": {
                "temperature": "*temperature",
                "dewpointDepression": "&dewpoint_depression|*temperature,*dewpoint"
            }
        }
    })
}

pub fn sounding_descriptor() -> IngestDescriptor {
    IngestDescriptor::from_value(SOUNDING_DESCRIPTOR_ID, sounding_descriptor_json())
        .expect("sounding descriptor fixture is valid")
}

pub fn ctc_descriptor_json() -> Value {
    json!({
        "id": CTC_DESCRIPTOR_ID,
        "builder_type": "CtcBuilder",
        "subset": "METAR",
        "parameters": {"thresholds": [500, 1000, 3000]},
        "template": {
            "id": "DD:V01:*subset:HRRR:ALL_HRRR:CTC:CEILING:*fcstValidEpoch:*fcstLen",
            "type": "DD",
            "fcstLen": "*fcstLen",
            "issueEpoch": "&fcst_issue_epoch|*fcstValidEpoch,*fcstLen",
            "data": null
        }
    })
}

pub fn ctc_descriptor() -> IngestDescriptor {
    IngestDescriptor::from_value(CTC_DESCRIPTOR_ID, ctc_descriptor_json())
        .expect("ctc descriptor fixture is valid")
}
