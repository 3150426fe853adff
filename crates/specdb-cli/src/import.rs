//! `import` command: read product documents from files and run them through
//! the ingestion engine.
//!
//! Unreadable files and invalid documents are logged and counted, never
//! fatal, so one bad export does not abort the rest of the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use specdb_core::{AppConfig, ProductDocument, Store};
use specdb_ingest::{import_batch, BatchTotals, Importer, MemoryStore, TracingObserver};

/// Documents read from disk plus the number that could not be used.
#[derive(Debug, Default)]
pub(crate) struct LoadedDocuments {
    pub(crate) documents: Vec<ProductDocument>,
    pub(crate) rejected: usize,
}

/// Split one file's JSON into product documents.
///
/// A file holds either one document object or an array of them.
pub(crate) fn parse_documents(source: &Path, text: &str, loaded: &mut LoadedDocuments) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(file = %source.display(), error = %e, "file is not valid JSON");
            loaded.rejected += 1;
            return;
        }
    };

    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    for (index, item) in items.into_iter().enumerate() {
        match ProductDocument::from_value(item) {
            Ok(document) => loaded.documents.push(document),
            Err(e) => {
                tracing::error!(
                    file = %source.display(),
                    index,
                    error = %e,
                    "skipping invalid product document"
                );
                loaded.rejected += 1;
            }
        }
    }
}

async fn load_documents(files: &[PathBuf]) -> LoadedDocuments {
    let mut loaded = LoadedDocuments::default();
    for file in files {
        match tokio::fs::read_to_string(file).await {
            Ok(text) => parse_documents(file, &text, &mut loaded),
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "failed to read file");
                loaded.rejected += 1;
            }
        }
    }
    loaded
}

/// Import every document in `files`.
///
/// # Errors
///
/// Returns an error if the schemas cannot be loaded, the database cannot be
/// reached, or no document at all could be imported.
pub(crate) async fn run_import(
    config: &AppConfig,
    files: &[PathBuf],
    dry_run: bool,
    concurrency: usize,
) -> anyhow::Result<()> {
    let registry = Arc::new(crate::schemas::load_registry(&config.schemas_path)?);
    let loaded = load_documents(files).await;
    if loaded.documents.is_empty() {
        anyhow::bail!("no valid product documents in {} file(s)", files.len());
    }

    let totals = if dry_run {
        let store = MemoryStore::new();
        let totals = import_with(store.clone(), registry, &loaded.documents, concurrency).await;
        println!(
            "dry run: {} writes, {} rows created; nothing was persisted",
            store.writes(),
            store.creations()
        );
        totals
    } else {
        let pool = specdb_db::connect_from_config(config).await?;
        let store = specdb_db::PgStore::new(pool);
        import_with(store, registry, &loaded.documents, concurrency).await
    };

    println!(
        "imported {} product(s), {} failed, {} rejected; {} field(s) changed, {} unknown key(s)",
        totals.products_imported,
        totals.products_failed,
        loaded.rejected,
        totals.fields_changed,
        totals.unknown_keys
    );

    if totals.products_imported == 0 {
        anyhow::bail!("all {} product imports failed", totals.products_failed);
    }
    Ok(())
}

async fn import_with<S: Store>(
    store: S,
    registry: Arc<specdb_core::SchemaRegistry>,
    documents: &[ProductDocument],
    concurrency: usize,
) -> BatchTotals {
    let importer = Importer::new(store, registry, Arc::new(TracingObserver));
    import_batch(&importer, documents, concurrency).await.totals
}
