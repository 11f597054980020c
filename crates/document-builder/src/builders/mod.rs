//! Concrete builders.
//!
//! Each builder groups its records into one context per output document
//! and fills `data` with a map keyed by entity (station, threshold).

mod convert;
mod ctc;
mod obs;
mod sounding;

pub use ctc::{CtcBuilder, CtcParameters};
pub use obs::{ObsBuilder, ObsParameters};
pub use sounding::{SoundingBuilder, SoundingParameters};

use ingest_common::Context;
use serde_json::{Map, Value};
use tracing::warn;

use crate::builder::TemplateBuilder;
use crate::error::{RecordError, RecordResult};
use crate::resolve::{stringify, Resolver};

/// `parent` without `skip`, overlaid by `row`.
pub(crate) fn layered(parent: &Context, row: &Context, skip: &str) -> Context {
    let mut ctx: Context = parent
        .iter()
        .filter(|(key, _)| key.as_str() != skip)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in row {
        ctx.insert(key.clone(), value.clone());
    }
    ctx
}

/// Resolve `data_template` once per row in `context[rows_key]`, keyed by
/// the row's `entity_field`. Rows that fail to resolve are left out.
pub(crate) fn entity_data<B: TemplateBuilder>(
    builder: &B,
    rows_key: &str,
    entity_field: &str,
    data_template: &Value,
    context: &Context,
) -> RecordResult<Value> {
    let rows = context
        .get(rows_key)
        .and_then(Value::as_array)
        .ok_or_else(|| RecordError::BulkData(format!("context has no '{}' rows", rows_key)))?;

    let mut data = Map::new();
    for row in rows.iter().filter_map(Value::as_object) {
        let entity = match row.get(entity_field) {
            Some(Value::Null) | None => {
                warn!(field = %entity_field, "Row has no entity name, skipped");
                continue;
            }
            Some(name) => stringify(name),
        };

        let row_context = layered(context, row, rows_key);
        let resolver = Resolver::new(builder, builder.functions(), &row_context);
        match resolver.resolve(data_template) {
            Ok(value) => {
                data.insert(entity, value);
            }
            Err(e) => warn!(entity = %entity, error = %e, "Entity skipped"),
        }
    }
    Ok(Value::Object(data))
}
