//! Top-level aggregator: dispatches each category of the specification tree
//! to the generic group mapper and maintains the product's attribute tree.

use serde_json::{Map, Value};
use specdb_core::{AttributeGroup, AttributeTree, SchemaRegistry, SpecificationDocument, StoreTx};

use crate::drift::{check_categories, map_monitored, DriftEvent};
use crate::error::IngestIssue;
use crate::observe::Observer;
use crate::updater::{update, FieldMapping};

const TREE_MAPPING: &FieldMapping<'static> = &[("categories", "categories")];

/// Everything the aggregator produced for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeOutcome {
    pub tree: AttributeTree,
    /// Groups of every mapped category, populated or not, in document order.
    pub groups: Vec<AttributeGroup>,
    /// Categories that have a mapper and were mapped.
    pub categories_imported: usize,
    /// Categories without a mapper; nothing of them is stored.
    pub categories_skipped_unknown: usize,
    pub changed: usize,
    /// Top-level and per-category drift, in the order it was seen.
    pub drift: Vec<DriftEvent>,
    /// Non-fatal issues, including one [`IngestIssue::UnknownKey`] per drift event.
    pub issues: Vec<IngestIssue>,
    pub missing: Vec<IngestIssue>,
}

/// Map every category of `specifications` and update the product's tree.
///
/// The tree's category list is replaced by the categories populated in this
/// import. An import that populates none leaves the stored list as it was.
pub async fn aggregate<P: StoreTx>(
    tx: &mut P,
    product_id: i64,
    source_product_id: &str,
    registry: &SchemaRegistry,
    specifications: &SpecificationDocument,
    observer: &dyn Observer,
) -> TreeOutcome {
    let mut outcome = TreeOutcome {
        tree: AttributeTree::new(product_id),
        groups: Vec::new(),
        categories_imported: 0,
        categories_skipped_unknown: 0,
        changed: 0,
        drift: Vec::new(),
        issues: Vec::new(),
        missing: Vec::new(),
    };

    for event in check_categories(registry, specifications) {
        observer.drift(source_product_id, &event);
        outcome.drift.push(event);
    }

    let mut populated = Vec::new();

    for (category, raw) in specifications {
        let Some(schema) = registry.get(category) else {
            tracing::debug!(
                product = %source_product_id,
                category = %category,
                "no mapper; category skipped"
            );
            outcome.categories_skipped_unknown += 1;
            continue;
        };

        let Value::Object(subtree) = raw else {
            outcome.issues.push(IngestIssue::MalformedPayload {
                context: category.clone(),
                reason: "category must be an object of field labels".to_string(),
            });
            continue;
        };

        let mapped =
            map_monitored(tx, product_id, source_product_id, schema, subtree, observer).await;
        let group = mapped.outcome;

        outcome.categories_imported += 1;
        outcome.changed += group.changed;
        outcome.issues.extend(group.issues);
        outcome.missing.extend(group.missing);
        outcome.drift.extend(mapped.drift);
        if group.populated {
            populated.push(Value::String(category.clone()));
        }
        outcome.groups.push(group.group);
    }

    outcome.issues.extend(outcome.drift.iter().map(|event| IngestIssue::UnknownKey {
        category: event.category.clone(),
        key: event.unknown_key.clone(),
    }));

    let mut tree = match tx.load_tree(product_id).await {
        Ok(tree) => tree.unwrap_or_else(|| AttributeTree::new(product_id)),
        Err(source) => {
            outcome.issues.push(IngestIssue::Persistence {
                entity: "attribute_tree",
                key: product_id.to_string(),
                source,
            });
            return outcome;
        }
    };

    let mut incoming = Map::new();
    incoming.insert("categories".to_string(), Value::Array(populated));
    let update_outcome = update(tx, &mut tree, &incoming, TREE_MAPPING).await;
    outcome.changed += update_outcome.changed;
    outcome.issues.extend(update_outcome.issues);
    outcome.tree = tree;

    outcome
}
