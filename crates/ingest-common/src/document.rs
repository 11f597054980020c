//! Document-shaped values passed between builders and the store.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// The current record a template is resolved against.
pub type Context = Map<String, Value>;

/// Parameters handed to a named function, keyed by parameter name.
pub type ParamMap = Map<String, Value>;

/// One fully resolved output document.
pub type Document = Map<String, Value>;

/// Documents produced for one work item, keyed by derived id.
///
/// Inserting an id that is already present replaces the earlier document.
pub type DocumentMap = BTreeMap<String, Value>;
