//! Record and document generators.
//!
//! These create predictable rows so that expected document contents can
//! be computed in the test itself.

use serde_json::{json, Value};

/// Station names `K000`, `K001`, ...
pub fn station_name(index: usize) -> String {
    format!("K{:03}", index)
}

/// One observation row per station at `epoch`.
///
/// Station `i` reports a temperature of `273.15 + i` K and a wind speed
/// of `i` m/s.
pub fn obs_rows(stations: usize, epoch: i64) -> Vec<Value> {
    (0..stations)
        .map(|i| {
            json!({
                "name": station_name(i),
                "timeObs": epoch,
                "temperature": 273.15 + i as f64,
                "windSpeed": i as f64,
            })
        })
        .collect()
}

/// One launch per station, reporting 1000, 850, 700 and 500 hPa.
pub fn sounding_rows(stations: usize, launch: i64) -> Vec<Value> {
    (0..stations)
        .map(|i| {
            let offset = i as f64;
            json!({
                "station": format!("72{:03}", i),
                "launchEpoch": launch,
                "levels": [
                    {"pressure": 1000, "temperature": 290.0 + offset, "dewpoint": 285.0 + offset},
                    {"pressure": 850, "temperature": 282.0 + offset, "dewpoint": 277.0 + offset},
                    {"pressure": 700, "temperature": 272.0 + offset, "dewpoint": 262.0 + offset},
                    {"pressure": 500, "temperature": 255.0 + offset, "dewpoint": 240.0 + offset}
                ]
            })
        })
        .collect()
}

/// Forecast/observation pairs for `leads` at one valid time.
pub fn ctc_pairs(stations: usize, valid: i64, leads: &[i64]) -> Vec<Value> {
    let mut pairs = Vec::new();
    for lead in leads {
        for i in 0..stations {
            pairs.push(json!({
                "name": station_name(i),
                "fcstValidEpoch": valid,
                "fcstLen": lead,
                "fcst": 400 * (i as i64 + 1),
                "obs": 600 * (i as i64 + 1),
            }));
        }
    }
    pairs
}

/// `count` minimal documents with ids `DD:TEST:0`, `DD:TEST:1`, ...
pub fn documents(count: usize) -> Vec<(String, Value)> {
    (0..count)
        .map(|i| {
            let id = format!("DD:TEST:{}", i);
            (id.clone(), json!({"id": id, "type": "DD", "value": i}))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obs_rows() {
        let rows = obs_rows(3, 100);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["name"], "K002");
        assert_eq!(rows[2]["windSpeed"], 2.0);
    }

    #[test]
    fn test_ctc_pairs_per_lead() {
        assert_eq!(ctc_pairs(4, 0, &[1, 6, 12]).len(), 12);
    }

    #[test]
    fn test_documents_ids() {
        let docs = documents(2);
        assert_eq!(docs[1].0, "DD:TEST:1");
        assert_eq!(docs[1].1["id"], "DD:TEST:1");
    }
}
