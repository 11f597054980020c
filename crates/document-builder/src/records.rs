//! JSON record reader.
//!
//! Reads the record files handed to the builders: a JSON array of objects
//! or newline-delimited JSON objects, optionally gzip-compressed.

use std::io::Read;
use std::path::Path;

use ingest_common::Context;
use serde_json::Value;
use tracing::debug;

use crate::error::{BuildError, BuildResult};

/// Read every record in `path`.
pub fn read_records(path: &Path) -> BuildResult<Vec<Context>> {
    let raw = std::fs::read(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let bytes = if is_gzip(path) {
        decompress_gzip(&raw).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        raw
    };

    let records = parse_records(&bytes).map_err(|message| BuildError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    debug!(path = %path.display(), records = records.len(), "Read records");
    Ok(records)
}

/// Parse a JSON array or JSON lines into contexts.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Context>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {}", e))?;
    let trimmed = text.trim_start();

    if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON array: {}", e))?;
        return values
            .into_iter()
            .enumerate()
            .map(|(index, value)| into_context(value, index + 1))
            .collect();
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let value: Value = serde_json::from_str(line)
                .map_err(|e| format!("line {}: invalid JSON: {}", index + 1, e))?;
            into_context(value, index + 1)
        })
        .collect()
}

fn into_context(value: Value, position: usize) -> Result<Context, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "record {} is not an object: {}",
            position,
            type_name(&other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Decompress gzip data.
pub fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
