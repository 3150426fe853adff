//! Worker-pool import of many product documents.

use futures::stream::{self, StreamExt};
use specdb_core::{ProductDocument, Store};

use crate::error::IngestError;
use crate::importer::{ImportSummary, Importer};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchTotals {
    pub products_imported: usize,
    pub products_failed: usize,
    pub fields_changed: usize,
    pub unknown_keys: usize,
}

/// Result of importing one document of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub source_product_id: String,
    pub result: Result<ImportSummary, IngestError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One item per document, in completion order.
    pub items: Vec<BatchItem>,
    pub totals: BatchTotals,
}

/// Import `documents` with at most `concurrency` imports in flight.
///
/// Each document is its own unit of work: a failed product is counted and
/// logged, and the rest of the batch continues.
pub async fn import_batch<S: Store>(
    importer: &Importer<S>,
    documents: &[ProductDocument],
    concurrency: usize,
) -> BatchReport {
    let items: Vec<BatchItem> = stream::iter(documents)
        .map(|document| async move {
            BatchItem {
                source_product_id: document.source_product_id.clone(),
                result: importer.import(document).await.map(|outcome| outcome.summary),
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut totals = BatchTotals::default();
    for item in &items {
        match &item.result {
            Ok(summary) => {
                totals.products_imported += 1;
                totals.fields_changed += summary.fields_changed;
                totals.unknown_keys += summary.unknown_keys_seen.len();
            }
            Err(e) => {
                tracing::error!(
                    product = %item.source_product_id,
                    error = %e,
                    "product import failed"
                );
                totals.products_failed += 1;
            }
        }
    }

    if totals.products_failed > 0 {
        tracing::warn!(
            failed = totals.products_failed,
            total = documents.len(),
            "some products failed to import"
        );
    }

    BatchReport { items, totals }
}
