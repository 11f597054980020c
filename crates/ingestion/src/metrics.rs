//! Ingest counters.

use metrics::counter;
use storage::PersistReport;

pub fn record_item_processed() {
    counter!("ingest_items_processed_total").increment(1);
}

pub fn record_item_failed() {
    counter!("ingest_items_failed_total").increment(1);
}

pub fn record_documents_built(count: usize) {
    counter!("ingest_documents_built_total").increment(count as u64);
}

/// Record one `persist` call's outcome.
pub fn record_persist(report: &PersistReport) {
    counter!("ingest_documents_persisted_total").increment(report.written as u64);
    counter!("ingest_documents_abandoned_total").increment(report.abandoned as u64);
    counter!("ingest_persist_retries_total").increment(report.retried as u64);
}
