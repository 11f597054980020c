//! Common types shared by the ingest builder, storage and worker crates.

pub mod descriptor;
pub mod document;
pub mod error;
pub mod time;
pub mod work_item;

pub use descriptor::IngestDescriptor;
pub use document::{Context, Document, DocumentMap, ParamMap};
pub use error::{CommonError, CommonResult};
pub use time::{epoch_to_iso8601, value_to_epoch};
pub use work_item::WorkItem;
