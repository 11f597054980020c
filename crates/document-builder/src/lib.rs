//! Document builder protocol.
//!
//! Turns one external record into one or more output documents by
//! interpreting a declarative template:
//!
//! - `*field` references substitute values from the current record
//! - `&function|*p1,*p2` references replace the value with a named
//!   function's result
//! - the `id` key is derived segment by segment (see [`id::derive_id`])
//! - the `data` key is handed to the concrete builder's bulk hook
//!
//! Concrete builders (observations, soundings, contingency counts) only
//! supply records, named functions and the bulk hook; the engine in
//! [`builder`] does the rest.

pub mod builder;
pub mod builders;
pub mod cache;
pub mod error;
pub mod functions;
pub mod id;
pub mod records;
pub mod resolve;
pub mod template;

// Re-exports
pub use builder::{build_document, build_documents, DocumentBuilder, TemplateBuilder};
pub use builders::{CtcBuilder, ObsBuilder, SoundingBuilder};
pub use cache::{BuilderCache, BuilderConstructor, BuilderRegistry};
pub use error::{BuildError, BuildResult, FunctionError, RecordError, RecordResult};
pub use functions::{FunctionRegistry, NamedFunction};
pub use id::derive_id;
pub use records::read_records;
pub use resolve::{stringify, Resolver};
