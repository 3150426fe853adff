//! Schema drift monitor.
//!
//! Compares the labels actually present in a document against the known
//! vocabulary and reports each unknown one. Drift never changes what is
//! ingested: unknown labels are simply not mapped.

use serde_json::{Map, Value};
use specdb_core::{CategorySchema, SchemaRegistry, StoreTx};

use crate::mapper::{map_group, GroupOutcome};
use crate::observe::Observer;

/// Category reported for unknown top-level categories.
pub const ROOT_SCOPE: &str = "_root";

/// One label outside the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriftEvent {
    pub category: String,
    pub unknown_key: String,
}

impl DriftEvent {
    /// `category/key`, as listed in import summaries.
    #[must_use]
    pub fn qualified_key(&self) -> String {
        format!("{}/{}", self.category, self.unknown_key)
    }
}

/// Labels of `subtree` that are not on the category's allow-list.
#[must_use]
pub fn check_category(schema: &CategorySchema, subtree: &Map<String, Value>) -> Vec<DriftEvent> {
    subtree
        .keys()
        .filter(|key| !schema.allows(key))
        .map(|key| DriftEvent {
            category: schema.label().to_string(),
            unknown_key: key.clone(),
        })
        .collect()
}

/// Top-level categories of `document` missing from the master allow-list.
#[must_use]
pub fn check_categories(
    registry: &SchemaRegistry,
    document: &Map<String, Value>,
) -> Vec<DriftEvent> {
    document
        .keys()
        .filter(|category| !registry.is_known_category(category))
        .map(|category| DriftEvent {
            category: ROOT_SCOPE.to_string(),
            unknown_key: category.clone(),
        })
        .collect()
}

/// Result of a monitored group mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredGroup {
    pub outcome: GroupOutcome,
    pub drift: Vec<DriftEvent>,
}

/// Run the group mapper, then report every unknown label of the sub-tree.
pub async fn map_monitored<P: StoreTx>(
    tx: &mut P,
    product_id: i64,
    source_product_id: &str,
    schema: &CategorySchema,
    subtree: &Map<String, Value>,
    observer: &dyn Observer,
) -> MonitoredGroup {
    let outcome = map_group(tx, product_id, schema, subtree).await;

    let drift = check_category(schema, subtree);
    for event in &drift {
        observer.drift(source_product_id, event);
    }

    MonitoredGroup { outcome, drift }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_yaml_str(
            r#"
known_categories: ["Warranty"]
categories:
  - label: "RAM"
    slots:
      cas_latency: "CAS Latency"
    ignored: ["Heatspreader colour"]
"#,
        )
        .unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn one_event_per_unknown_label() {
        let registry = registry();
        let ram = registry.get("RAM").unwrap();
        let subtree = object(json!({
            "CAS Latency": {"id": 42, "name": "CAS Latency", "value": "16"},
            "Heatspreader colour": {"id": 43, "name": "Heatspreader colour", "value": "black"},
            "RGB lighting": {"id": 44, "name": "RGB lighting", "value": "yes"}
        }));

        let events = check_category(ram, &subtree);

        assert_eq!(
            events,
            vec![DriftEvent {
                category: "RAM".to_string(),
                unknown_key: "RGB lighting".to_string(),
            }]
        );
        assert_eq!(events[0].qualified_key(), "RAM/RGB lighting");
    }

    #[test]
    fn known_and_mapped_categories_are_not_drift() {
        let registry = registry();
        let document = object(json!({"RAM": {}, "Warranty": {}, "Holograms": {}}));

        let events = check_categories(&registry, &document);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, ROOT_SCOPE);
        assert_eq!(events[0].unknown_key, "Holograms");
    }
}
