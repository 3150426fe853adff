//! Product importer: one product document in, one committed unit of work out.

use std::sync::Arc;

use specdb_core::{
    AttributeGroup, AttributeTree, Product, ProductDocument, SchemaRegistry, Store, StoreTx,
};

use crate::aggregator::aggregate;
use crate::error::{IngestError, IngestIssue};
use crate::nested::{self, NestedOutcome};
use crate::observe::Observer;
use crate::updater::{apply_fields, apply_references, persist_if_changed, FieldDiff, FieldMapping};

const PRODUCT_MAPPING: &FieldMapping<'static> = &[
    ("name", "name"),
    ("brand", "brand"),
    ("url", "url"),
    ("mainCategory", "main_category"),
    ("eans", "eans"),
    ("releaseDate", "release_date"),
    ("lastModified", "last_modified"),
    ("rating", "rating"),
    ("isSellable", "is_sellable"),
];

/// Per-import summary reported to the observer after commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub source_product_id: String,
    pub categories_imported: usize,
    pub categories_skipped_unknown: usize,
    /// Fields changed and persisted across every entity of the import.
    pub fields_changed: usize,
    /// Unknown labels as `category/key`; top-level ones use [`crate::drift::ROOT_SCOPE`].
    pub unknown_keys_seen: Vec<String>,
    /// Schema slots with no value in the document.
    pub fields_missing: usize,
    /// Number of non-fatal issues, excluding missing fields.
    pub issues: usize,
}

/// Everything one committed import produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub product: Product,
    pub tree: AttributeTree,
    pub groups: Vec<AttributeGroup>,
    pub summary: ImportSummary,
    pub issues: Vec<IngestIssue>,
}

/// Imports product documents into a [`Store`].
///
/// Cheap to clone; clones share the store, the schema registry, and the
/// observer, so one importer can feed many concurrent workers.
#[derive(Clone)]
pub struct Importer<S> {
    store: S,
    registry: Arc<SchemaRegistry>,
    observer: Arc<dyn Observer>,
}

impl<S: Store> Importer<S> {
    pub fn new(store: S, registry: Arc<SchemaRegistry>, observer: Arc<dyn Observer>) -> Self {
        Self {
            store,
            registry,
            observer,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Parse `text` as a product envelope and import it.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Document`] for an unusable envelope, otherwise
    /// see [`Importer::import`].
    pub async fn import_json(&self, text: &str) -> Result<ImportOutcome, IngestError> {
        let document = ProductDocument::from_json(text)?;
        self.import(&document).await
    }

    /// Import one product in a single transaction.
    ///
    /// Scalar fields are diffed first, then the nested objects, then the
    /// specification tree; the product row is written last and only if it
    /// changed. Failures local to one sub-object are collected as issues and
    /// do not stop the rest of the import.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the transaction cannot be opened or
    /// committed, or the product row cannot be fetched or created. Nothing of
    /// the import is applied in that case.
    pub async fn import(&self, document: &ProductDocument) -> Result<ImportOutcome, IngestError> {
        let source_product_id = document.source_product_id.as_str();

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|source| IngestError::Begin {
                source_product_id: source_product_id.to_string(),
                source,
            })?;

        let mut product = tx
            .get_or_create_product(source_product_id)
            .await
            .map_err(|source| IngestError::Product {
                source_product_id: source_product_id.to_string(),
                source,
            })?;

        let original = product.clone();
        let mut diff = apply_fields(&mut product, &document.fields, PRODUCT_MAPPING);
        let mut changed = 0;

        let mut nested_outcomes = Vec::new();
        if let Some(raw) = &document.price {
            nested_outcomes.push(nested::import_price(&mut tx, product.id, raw).await);
        }
        if let Some(raw) = &document.stock {
            nested_outcomes.push(nested::import_stock(&mut tx, product.id, raw).await);
        }
        if let Some(raw) = &document.variants {
            nested_outcomes.push(nested::import_variants(&mut tx, product.id, raw).await);
        }

        // An absent or unusable sub-object keeps the stored reference.
        let mut references = Vec::new();
        if let Some(raw) = &document.energy_label {
            let outcome = nested::import_energy_label(&mut tx, raw).await;
            if let Some(id) = outcome.reference {
                references.push(("energy_label_id", Some(id)));
            }
            nested_outcomes.push(outcome);
        }
        if let Some(raw) = &document.condition_class {
            let outcome = nested::import_condition_class(&mut tx, raw).await;
            if let Some(id) = outcome.reference {
                references.push(("condition_class_id", Some(id)));
            }
            nested_outcomes.push(outcome);
        }

        let mut issues = Vec::new();
        for NestedOutcome {
            changed: nested_changed,
            issues: nested_issues,
            ..
        } in nested_outcomes
        {
            changed += nested_changed;
            issues.extend(nested_issues);
        }

        merge(&mut diff, apply_references(&mut product, &references));

        let tree = aggregate(
            &mut tx,
            product.id,
            source_product_id,
            &self.registry,
            &document.specifications,
            self.observer.as_ref(),
        )
        .await;
        changed += tree.changed;
        issues.extend(tree.issues);

        let product_outcome = persist_if_changed(&mut tx, &mut product, original, diff).await;
        changed += product_outcome.changed;
        issues.extend(product_outcome.issues);

        // Unknown keys already reached the observer as drift events.
        for issue in &issues {
            if !matches!(issue, IngestIssue::UnknownKey { .. }) {
                self.observer.issue(source_product_id, issue);
            }
        }

        tx.commit().await.map_err(|source| IngestError::Commit {
            source_product_id: source_product_id.to_string(),
            source,
        })?;

        let summary = ImportSummary {
            source_product_id: source_product_id.to_string(),
            categories_imported: tree.categories_imported,
            categories_skipped_unknown: tree.categories_skipped_unknown,
            fields_changed: changed,
            unknown_keys_seen: tree.drift.iter().map(|event| event.qualified_key()).collect(),
            fields_missing: tree.missing.len(),
            issues: issues.len(),
        };
        self.observer.imported(&summary);

        Ok(ImportOutcome {
            product,
            tree: tree.tree,
            groups: tree.groups,
            summary,
            issues,
        })
    }
}

fn merge(into: &mut FieldDiff, other: FieldDiff) {
    into.changed_slots.extend(other.changed_slots);
    into.issues.extend(other.issues);
}
