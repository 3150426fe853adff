//! Generic attribute group mapper.
//!
//! One mapper serves every category: the category's [`CategorySchema`] says
//! which external labels fill which slots. For each present label the payload's
//! component is fetched or created, diff-updated, and referenced from the
//! product's group for that category. Slots whose label is absent are cleared,
//! so a reused group holds exactly what the latest import supplied.

use serde_json::{Map, Value};
use specdb_core::document::AttributePayload;
use specdb_core::{AttributeGroup, CategorySchema, StoreTx};

use crate::components;
use crate::error::IngestIssue;
use crate::updater::{apply_references, persist_if_changed};

/// Result of mapping one category for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub group: AttributeGroup,
    /// Whether this import attached at least one component to the group.
    pub populated: bool,
    /// Fields changed across the group and the components it references.
    pub changed: usize,
    /// Schema slots whose label was absent ([`IngestIssue::MissingField`]).
    pub missing: Vec<IngestIssue>,
    pub issues: Vec<IngestIssue>,
}

/// Map one category's raw sub-tree onto the product's attribute group.
///
/// Absent labels leave their slot unset, clearing any reference a previous
/// import stored there. Malformed payloads and storage failures are reported
/// per field and keep the slot's previous reference; the remaining fields are
/// still mapped.
pub async fn map_group<P: StoreTx>(
    tx: &mut P,
    product_id: i64,
    schema: &CategorySchema,
    subtree: &Map<String, Value>,
) -> GroupOutcome {
    let category = schema.label();
    let mut changed = 0;
    let mut missing = Vec::new();
    let mut issues = Vec::new();

    let mut group = match tx.load_group(product_id, category).await {
        Ok(Some(group)) => group,
        Ok(None) => AttributeGroup::new(product_id, category),
        Err(source) => {
            issues.push(IngestIssue::Persistence {
                entity: "attribute_group",
                key: format!("{product_id}/{category}"),
                source,
            });
            AttributeGroup::new(product_id, category)
        }
    };

    let mut references: Vec<(&str, Option<i64>)> = Vec::new();
    let mut populated = false;

    for (label, slot) in schema.mapping() {
        let Some(raw) = subtree.get(label) else {
            tracing::debug!(category, label, "schema field absent");
            references.push((slot, None));
            missing.push(IngestIssue::MissingField {
                category: category.to_string(),
                label: label.to_string(),
            });
            continue;
        };

        let payload = match AttributePayload::from_raw(raw) {
            Ok(payload) => payload,
            Err(err) => {
                issues.push(IngestIssue::MalformedPayload {
                    context: format!("{category}/{label}"),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let mut component = match components::get_or_create(tx, payload.id).await {
            Ok(component) => component,
            Err(source) => {
                issues.push(IngestIssue::Persistence {
                    entity: "attribute_component",
                    key: payload.id.to_string(),
                    source,
                });
                continue;
            }
        };

        let outcome =
            components::import_fields(tx, &mut component, &payload.name, &payload.value).await;
        changed += outcome.changed;
        issues.extend(outcome.issues);

        references.push((slot, Some(component.id)));
        populated = true;
    }

    let original = group.clone();
    let diff = apply_references(&mut group, &references);
    let outcome = persist_if_changed(tx, &mut group, original, diff).await;
    changed += outcome.changed;
    issues.extend(outcome.issues);

    GroupOutcome {
        group,
        populated,
        changed,
        missing,
        issues,
    }
}
