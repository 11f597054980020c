//! Named-function registry.
//!
//! Each concrete builder registers its functions by name once, in a
//! lazily built static, and templates call them with `&name|params`.

use std::collections::HashMap;

use ingest_common::{value_to_epoch, ParamMap};
use serde_json::Value;

use crate::error::{FunctionError, RecordError, RecordResult};

/// A named function bound to a builder type `B`.
pub type NamedFunction<B> = fn(&B, &ParamMap) -> Result<Value, FunctionError>;

/// Map of function name to implementation for one builder type.
pub struct FunctionRegistry<B> {
    functions: HashMap<&'static str, NamedFunction<B>>,
}

impl<B> FunctionRegistry<B> {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register `function` under `name`, builder style.
    pub fn with(mut self, name: &'static str, function: NamedFunction<B>) -> Self {
        self.functions.insert(name, function);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke `name` on `builder`.
    pub fn call(&self, builder: &B, name: &str, params: &ParamMap) -> RecordResult<Value> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RecordError::UnknownFunction(name.to_string()))?;

        function(builder, params).map_err(|source| RecordError::Function {
            name: name.to_string(),
            source,
        })
    }
}

impl<B> Default for FunctionRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a parameter, failing if it is absent or null.
pub fn param<'a>(params: &'a ParamMap, name: &str) -> Result<&'a Value, FunctionError> {
    match params.get(name) {
        None | Some(Value::Null) => Err(FunctionError::MissingParameter(name.to_string())),
        Some(value) => Ok(value),
    }
}

/// Fetch a numeric parameter. Numeric strings are accepted.
pub fn number(params: &ParamMap, name: &str) -> Result<f64, FunctionError> {
    let value = param(params, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FunctionError::InvalidParameter {
        name: name.to_string(),
        expected: "a number",
        value: value.to_string(),
    })
}

/// Fetch an epoch (seconds) parameter.
pub fn epoch(params: &ParamMap, name: &str) -> Result<i64, FunctionError> {
    let value = param(params, name)?;
    value_to_epoch(value).map_err(|_| FunctionError::InvalidParameter {
        name: name.to_string(),
        expected: "an epoch",
        value: value.to_string(),
    })
}

/// Wrap a float result, rejecting NaN and infinities.
pub fn float_value(value: f64) -> Result<Value, FunctionError> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| FunctionError::Failed(format!("result is not finite: {}", value)))
}
