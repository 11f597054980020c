//! Document id derivation.
//!
//! An id template is a `:`-separated list of segments. Each segment is
//! classified on its own: a function reference is called and its result
//! stringified, a field reference is substituted, anything else is kept
//! as written. This runs independently of generic value resolution even
//! though both share the field and function primitives.

use serde_json::Value;
use tracing::warn;

use crate::error::RecordResult;
use crate::resolve::{stringify, Resolver};
use crate::template::{FIELD_SIGIL, FUNCTION_SIGIL, ID_SEPARATOR, ISO_MARKER};

/// Derive a document id from `id_template` for the resolver's context.
pub fn derive_id<B>(resolver: &Resolver<'_, B>, id_template: &str) -> RecordResult<String> {
    let segments = id_template
        .split(ID_SEPARATOR)
        .map(|segment| resolve_segment(resolver, segment))
        .collect::<RecordResult<Vec<_>>>()?;
    Ok(segments.join(&ID_SEPARATOR.to_string()))
}

fn resolve_segment<B>(resolver: &Resolver<'_, B>, segment: &str) -> RecordResult<String> {
    if segment.starts_with(FUNCTION_SIGIL) {
        let value = resolver.call_function_str(segment)?;
        return Ok(stringify(&value));
    }

    if segment.starts_with(FIELD_SIGIL) || segment.starts_with(ISO_MARKER) {
        return Ok(match resolver.resolve_fields(segment) {
            Value::Null => {
                warn!(segment = %segment, "Unresolved id segment, rendered empty");
                String::new()
            }
            value => stringify(&value),
        });
    }

    Ok(segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FunctionError, RecordError};
    use crate::functions::FunctionRegistry;
    use ingest_common::Context;
    use serde_json::json;

    fn functions() -> FunctionRegistry<()> {
        FunctionRegistry::new()
            .with("fn", |_, p| {
                let a = p.get("a").cloned().unwrap_or(Value::Null);
                let b = p.get("b").cloned().unwrap_or(Value::Null);
                if a == json!(1) && b == json!(2) {
                    Ok(json!("Y"))
                } else {
                    Ok(json!("N"))
                }
            })
            .with("cycle", |_, _| Ok(json!(12)))
            .with("fail", |_, _| Err(FunctionError::Failed("no level".to_string())))
    }

    fn context(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_mixed_segments() {
        let ctx = context(json!({"region": "ALL_HRRR", "a": 1, "b": 2}));
        let registry = functions();
        let resolver = Resolver::new(&(), &registry, &ctx);
        assert_eq!(
            derive_id(&resolver, "TYPE:*region:&fn|*a,*b").unwrap(),
            "TYPE:ALL_HRRR:Y"
        );
    }

    #[test]
    fn test_literal_only() {
        let ctx = Context::new();
        let registry = functions();
        let resolver = Resolver::new(&(), &registry, &ctx);
        assert_eq!(derive_id(&resolver, "MD:V01:METAR").unwrap(), "MD:V01:METAR");
    }

    #[test]
    fn test_numeric_and_iso_segments() {
        let ctx = context(json!({"epoch": 1_705_320_000, "fcstLen": 6}));
        let registry = functions();
        let resolver = Resolver::new(&(), &registry, &ctx);
        assert_eq!(
            derive_id(&resolver, "DD:*epoch:*fcstLen:&cycle").unwrap(),
            "DD:1705320000:6:12"
        );
        assert_eq!(
            derive_id(&resolver, "DD:{ISO}*epoch").unwrap(),
            "DD:2024-01-15T12:00:00Z"
        );
    }

    #[test]
    fn test_missing_field_renders_empty() {
        let ctx = Context::new();
        let registry = functions();
        let resolver = Resolver::new(&(), &registry, &ctx);
        assert_eq!(derive_id(&resolver, "DD:*missing:X").unwrap(), "DD::X");
    }

    #[test]
    fn test_function_failure_is_hard() {
        let ctx = Context::new();
        let registry = functions();
        let resolver = Resolver::new(&(), &registry, &ctx);
        assert!(matches!(
            derive_id(&resolver, "DD:&fail"),
            Err(RecordError::Function { .. })
        ));
    }
}
