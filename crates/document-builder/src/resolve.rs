//! Template resolution against one context.

use ingest_common::{epoch_to_iso8601, value_to_epoch, Context, Document, ParamMap};
use serde_json::Value;
use tracing::warn;

use crate::error::{RecordError, RecordResult};
use crate::functions::FunctionRegistry;
use crate::id::derive_id;
use crate::template::{
    classify, field_tokens, is_single_token, FieldToken, FunctionCall, Leaf, ParamSource, ID_KEY,
};

/// Resolves template values for one record.
///
/// Borrows the builder that owns the named functions so that functions
/// can read builder state.
pub struct Resolver<'a, B> {
    builder: &'a B,
    functions: &'a FunctionRegistry<B>,
    context: &'a Context,
}

impl<'a, B> Resolver<'a, B> {
    pub fn new(builder: &'a B, functions: &'a FunctionRegistry<B>, context: &'a Context) -> Self {
        Self {
            builder,
            functions,
            context,
        }
    }

    /// Resolve any template value.
    pub fn resolve(&self, value: &Value) -> RecordResult<Value> {
        match value {
            Value::String(raw) => self.resolve_str(raw),
            Value::Object(map) => self.resolve_object(map).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<RecordResult<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Resolve a leaf string.
    pub fn resolve_str(&self, raw: &str) -> RecordResult<Value> {
        match classify(raw) {
            Leaf::Literal => Ok(Value::String(raw.to_string())),
            Leaf::Fields(tokens) => Ok(self.substitute_fields(raw, &tokens)),
            Leaf::Function(call) => self.call_function(&call),
        }
    }

    /// Resolve a nested object key by key. The `id` key always goes
    /// through [`derive_id`].
    pub fn resolve_object(&self, map: &serde_json::Map<String, Value>) -> RecordResult<Document> {
        let mut resolved = Document::new();
        for (key, value) in map {
            let value = match (key.as_str(), value) {
                (ID_KEY, Value::String(id_template)) => {
                    Value::String(derive_id(self, id_template)?)
                }
                _ => self.resolve(value)?,
            };
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    /// Substitute every field token in `raw`.
    ///
    /// A single bare token yields the typed context value. Anything else
    /// yields a string. A token that cannot be resolved nulls the whole
    /// value.
    pub fn substitute_fields(&self, raw: &str, tokens: &[FieldToken]) -> Value {
        if is_single_token(raw, tokens) {
            let token = &tokens[0];
            return self.field_value(&token.name, token.iso).unwrap_or(Value::Null);
        }

        let mut out = String::with_capacity(raw.len());
        let mut cursor = 0;
        for token in tokens {
            out.push_str(&raw[cursor..token.start]);
            match self.field_value(&token.name, token.iso) {
                Some(Value::Null) | None => {
                    warn!(template = %raw, field = %token.name, "Unresolved field, value set to null");
                    return Value::Null;
                }
                Some(value) => out.push_str(&stringify(&value)),
            }
            cursor = token.end;
        }
        out.push_str(&raw[cursor..]);
        Value::String(out)
    }

    /// Look up one field, applying the ISO conversion when requested.
    /// Returns `None` (after logging) on a soft failure.
    pub fn field_value(&self, name: &str, iso: bool) -> Option<Value> {
        let Some(value) = self.context.get(name) else {
            warn!(field = %name, "Field not found in context");
            return None;
        };
        if !iso {
            return Some(value.clone());
        }

        match value_to_epoch(value).and_then(epoch_to_iso8601) {
            Ok(text) => Some(Value::String(text)),
            Err(e) => {
                warn!(field = %name, error = %e, "Cannot convert field to ISO-8601");
                None
            }
        }
    }

    /// Build the parameter map for `call` and invoke it.
    pub fn call_function(&self, call: &FunctionCall) -> RecordResult<Value> {
        let mut params = ParamMap::new();
        for param in &call.params {
            let value = match &param.source {
                ParamSource::Field { name, iso } => {
                    self.field_value(name, *iso).unwrap_or(Value::Null)
                }
                ParamSource::Literal(text) => Value::String(text.clone()),
            };
            params.insert(param.key.clone(), value);
        }
        self.functions.call(self.builder, &call.name, &params)
    }

    /// Parse and invoke a raw `&name|params` reference.
    pub fn call_function_str(&self, raw: &str) -> RecordResult<Value> {
        let call = FunctionCall::parse(raw)
            .ok_or_else(|| RecordError::MalformedFunction(raw.to_string()))?;
        self.call_function(&call)
    }

    /// Resolve the fields of a segment that may mix tokens and text.
    pub fn resolve_fields(&self, raw: &str) -> Value {
        let tokens = field_tokens(raw);
        if tokens.is_empty() {
            return Value::String(raw.to_string());
        }
        self.substitute_fields(raw, &tokens)
    }
}

/// Render a value as text: strings without quotes, everything else as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
