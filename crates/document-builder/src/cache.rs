//! Builder registry and per-worker builder cache.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use ingest_common::IngestDescriptor;
use tracing::debug;

use crate::builder::{DocumentBuilder, TemplateBuilder};
use crate::builders::{CtcBuilder, ObsBuilder, SoundingBuilder};
use crate::error::{BuildError, BuildResult};

/// Constructs a builder for the descriptor that first needed it.
pub type BuilderConstructor = fn(&IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>>;

/// Map of builder type name to constructor, built once at startup and
/// shared read-only by all workers.
pub struct BuilderRegistry {
    constructors: HashMap<&'static str, BuilderConstructor>,
}

impl BuilderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every builder shipped in this crate.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(ObsBuilder::BUILDER_TYPE, ObsBuilder::construct)
            .with(SoundingBuilder::BUILDER_TYPE, SoundingBuilder::construct)
            .with(CtcBuilder::BUILDER_TYPE, CtcBuilder::construct)
    }

    pub fn with(mut self, builder_type: &'static str, constructor: BuilderConstructor) -> Self {
        self.constructors.insert(builder_type, constructor);
        self
    }

    pub fn builder_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.constructors.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Construct the builder `descriptor.builder_type` names.
    pub fn construct(&self, descriptor: &IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>> {
        let constructor = self
            .constructors
            .get(descriptor.builder_type.as_str())
            .ok_or_else(|| BuildError::UnknownBuilder(descriptor.builder_type.clone()))?;
        constructor(descriptor)
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// One worker's builders, at most one per type, kept for the worker's
/// lifetime. Not shared between workers.
pub struct BuilderCache {
    registry: Arc<BuilderRegistry>,
    builders: HashMap<String, Box<dyn DocumentBuilder>>,
}

impl BuilderCache {
    pub fn new(registry: Arc<BuilderRegistry>) -> Self {
        Self {
            registry,
            builders: HashMap::new(),
        }
    }

    /// The cached builder for `descriptor.builder_type`, constructing it
    /// on first use.
    pub fn get(&mut self, descriptor: &IngestDescriptor) -> BuildResult<&mut dyn DocumentBuilder> {
        match self.builders.entry(descriptor.builder_type.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_mut()),
            Entry::Vacant(entry) => {
                let builder = self.registry.construct(descriptor)?;
                debug!(
                    builder_type = %descriptor.builder_type,
                    descriptor = %descriptor.id,
                    "Constructed builder"
                );
                Ok(entry.insert(builder).as_mut())
            }
        }
    }

    pub fn contains(&self, builder_type: &str) -> bool {
        self.builders.contains_key(builder_type)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    fn counting_constructor(descriptor: &IngestDescriptor) -> BuildResult<Box<dyn DocumentBuilder>> {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        ObsBuilder::construct(descriptor)
    }

    fn descriptor(builder_type: &str) -> IngestDescriptor {
        IngestDescriptor::from_value(
            "MD:TEST",
            json!({
                "id": "MD:TEST",
                "builder_type": builder_type,
                "template": {"id": "DD:*name"}
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_builder_constructed_once_per_type() {
        let registry = Arc::new(BuilderRegistry::new().with("Counting", counting_constructor));
        let mut cache = BuilderCache::new(registry);
        let descriptor = descriptor("Counting");

        let before = CONSTRUCTED.load(Ordering::SeqCst);
        for _ in 0..3 {
            cache.get(&descriptor).unwrap();
        }
        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst) - before, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("Counting"));
    }

    #[test]
    fn test_unknown_builder_type() {
        let mut cache = BuilderCache::new(Arc::new(BuilderRegistry::with_defaults()));
        let err = cache.get(&descriptor("GribBuilder")).err().unwrap();
        assert!(matches!(err, BuildError::UnknownBuilder(name) if name == "GribBuilder"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_default_registry_types() {
        assert_eq!(
            BuilderRegistry::with_defaults().builder_types(),
            vec!["CtcBuilder", "ObsBuilder", "SoundingBuilder"]
        );
    }
}
