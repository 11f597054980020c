//! Builder traits and the template-driven build engine.

use ingest_common::{Context, Document, DocumentMap, IngestDescriptor, WorkItem};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{BuildError, BuildResult, RecordError, RecordResult};
use crate::functions::FunctionRegistry;
use crate::id::derive_id;
use crate::resolve::Resolver;
use crate::template::{DATA_KEY, ID_KEY};

/// Anything that can turn a work item into documents.
///
/// Instances are long-lived: a worker keeps one per builder type and
/// reuses it for every item that names that type.
pub trait DocumentBuilder: Send {
    fn builder_type(&self) -> &'static str;

    /// Build every document `item` yields under `descriptor`.
    ///
    /// Fails only when the item as a whole cannot be processed; a bad
    /// record just loses its own document.
    fn build(&mut self, descriptor: &IngestDescriptor, item: &WorkItem) -> BuildResult<DocumentMap>;
}

/// A builder driven by the descriptor's template.
///
/// Implementors supply the records, their named functions and the
/// handling of the `data` key; [`build_documents`] does the rest.
pub trait TemplateBuilder: Send + Sized + 'static {
    const BUILDER_TYPE: &'static str;

    fn functions(&self) -> &FunctionRegistry<Self>;

    /// One context per document the item should produce.
    fn records(&mut self, descriptor: &IngestDescriptor, item: &WorkItem)
        -> BuildResult<Vec<Context>>;

    /// Resolve the template's `data` value for one record.
    fn load_bulk_data(
        &mut self,
        descriptor: &IngestDescriptor,
        data_template: &Value,
        context: &Context,
    ) -> RecordResult<Value>;
}

impl<T: TemplateBuilder> DocumentBuilder for T {
    fn builder_type(&self) -> &'static str {
        T::BUILDER_TYPE
    }

    fn build(&mut self, descriptor: &IngestDescriptor, item: &WorkItem) -> BuildResult<DocumentMap> {
        build_documents(self, descriptor, item)
    }
}

/// Build all documents for `item`, skipping records that fail.
pub fn build_documents<B: TemplateBuilder>(
    builder: &mut B,
    descriptor: &IngestDescriptor,
    item: &WorkItem,
) -> BuildResult<DocumentMap> {
    if !matches!(descriptor.template.get(ID_KEY), Some(Value::String(_))) {
        return Err(BuildError::InvalidTemplate {
            id: descriptor.id.clone(),
            message: "template needs a string 'id' key".to_string(),
        });
    }

    let records = builder.records(descriptor, item)?;
    let mut documents = DocumentMap::new();
    let mut skipped = 0usize;

    for (index, context) in records.iter().enumerate() {
        match build_document(builder, descriptor, context) {
            Ok((id, document)) => {
                if documents.insert(id.clone(), Value::Object(document)).is_some() {
                    debug!(id = %id, "Duplicate document id, keeping the latest");
                }
            }
            Err(e) => {
                skipped += 1;
                warn!(
                    builder = B::BUILDER_TYPE,
                    item = %item,
                    record = index,
                    error = %e,
                    "Skipping record"
                );
            }
        }
    }

    info!(
        builder = B::BUILDER_TYPE,
        item = %item,
        records = records.len(),
        documents = documents.len(),
        skipped,
        "Built documents"
    );

    Ok(documents)
}

/// Build the document for one record: generic keys first, then `data`
/// through the bulk hook, then the id.
pub fn build_document<B: TemplateBuilder>(
    builder: &mut B,
    descriptor: &IngestDescriptor,
    context: &Context,
) -> RecordResult<(String, Document)> {
    let template = &descriptor.template;
    let mut document = Document::new();
    let mut data_template = None;

    {
        let resolver = Resolver::new(&*builder, builder.functions(), context);
        for (key, value) in template {
            match key.as_str() {
                ID_KEY => {}
                DATA_KEY => data_template = Some(value),
                _ => {
                    document.insert(key.clone(), resolver.resolve(value)?);
                }
            }
        }
    }

    if let Some(data_template) = data_template {
        let data = builder.load_bulk_data(descriptor, data_template, context)?;
        document.insert(DATA_KEY.to_string(), data);
    }

    let id = match template.get(ID_KEY) {
        Some(Value::String(id_template)) => {
            let resolver = Resolver::new(&*builder, builder.functions(), context);
            derive_id(&resolver, id_template)?
        }
        other => {
            return Err(RecordError::InvalidId(format!(
                "expected a string id template, found {:?}",
                other
            )))
        }
    };
    document.insert(ID_KEY.to_string(), Value::String(id.clone()));

    Ok((id, document))
}
