use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use specdb_core::{ProductDocument, SchemaRegistry};
use specdb_ingest::{
    import_batch, DriftEvent, IngestError, IngestIssue, Importer, MemoryStore, RecordingObserver,
    ROOT_SCOPE,
};

fn setup() -> (MemoryStore, Arc<RecordingObserver>, Importer<MemoryStore>) {
    let store = MemoryStore::new();
    let observer = Arc::new(RecordingObserver::new());
    let registry = Arc::new(SchemaRegistry::builtin().expect("builtin schemas are valid"));
    let importer = Importer::new(store.clone(), registry, observer.clone());
    (store, observer, importer)
}

fn document(value: Value) -> ProductDocument {
    ProductDocument::from_value(value).expect("valid test document")
}

fn payload(id: i64, name: &str, value: &str) -> Value {
    json!({"id": id, "name": name, "value": value})
}

fn ram_document(id: &str, cas_latency: &str) -> ProductDocument {
    document(json!({
        "id": id,
        "name": "Vengeance 32GB",
        "brand": "Corsair",
        "eans": ["0840006600000", "0840006600017"],
        "releaseDate": "2025-01-04T19:23:15Z",
        "lastModified": 1_736_018_595,
        "isSellable": true,
        "price": {"amount": "365.00", "currency": "EUR"},
        "specifications": {
            "RAM": {
                "CAS Latency": payload(42, "CAS Latency", cas_latency),
                "Capacity": payload(43, "Capacity", "32 GB")
            }
        }
    }))
}

#[tokio::test]
async fn first_import_creates_the_graph() {
    let (store, observer, importer) = setup();

    let outcome = importer.import(&ram_document("p-100", "16")).await.unwrap();

    let product = store.product("p-100").expect("product stored");
    assert_eq!(product.name.as_deref(), Some("Vengeance 32GB"));
    assert_eq!(product.brand.as_deref(), Some("Corsair"));

    let group = store.group(product.id, "RAM").expect("RAM group stored");
    assert_eq!(group.component_id("cas_latency"), Some(42));
    assert_eq!(group.component_id("capacity"), Some(43));
    assert_eq!(group.component_id("voltage"), None);

    let component = store.component(42).expect("component stored");
    assert_eq!(component.name, "CAS Latency");
    assert_eq!(component.value, "16");

    let tree = store.tree(product.id).expect("tree stored");
    assert_eq!(tree.categories, vec!["RAM"]);

    // product, price, two components, group, tree
    assert_eq!(store.writes(), 6);
    assert_eq!(outcome.summary.categories_imported, 1);
    assert_eq!(outcome.summary.categories_skipped_unknown, 0);
    assert!(outcome.summary.unknown_keys_seen.is_empty());
    assert_eq!(observer.summaries(), vec![outcome.summary]);
}

#[tokio::test]
async fn reimporting_the_same_document_changes_nothing() {
    let (store, _observer, importer) = setup();
    let doc = ram_document("p-100", "16");
    importer.import(&doc).await.unwrap();
    let product = store.product("p-100").unwrap();
    let group = store.group(product.id, "RAM").unwrap();
    store.reset_counters();

    let outcome = importer.import(&doc).await.unwrap();

    assert_eq!(outcome.summary.fields_changed, 0);
    assert_eq!(store.writes(), 0, "second run must not write");
    assert_eq!(store.creations(), 0);
    assert_eq!(store.product("p-100"), Some(product.clone()));
    assert_eq!(store.group(product.id, "RAM"), Some(group));
}

#[tokio::test]
async fn changed_component_value_is_one_write() {
    let (store, _observer, importer) = setup();
    importer.import(&ram_document("p-100", "16")).await.unwrap();
    store.reset_counters();

    let outcome = importer.import(&ram_document("p-100", "18")).await.unwrap();

    assert_eq!(outcome.summary.fields_changed, 1);
    assert_eq!(store.writes(), 1);
    assert_eq!(store.component(42).unwrap().value, "18");
}

#[tokio::test]
async fn reordered_eans_are_not_a_change() {
    let (store, _observer, importer) = setup();
    importer.import(&ram_document("p-100", "16")).await.unwrap();
    store.reset_counters();

    let mut doc = ram_document("p-100", "16");
    doc.fields
        .insert("eans".to_string(), json!(["0840006600017", "0840006600000"]));
    let outcome = importer.import(&doc).await.unwrap();

    assert_eq!(outcome.summary.fields_changed, 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn timestamps_are_coerced_to_utc() {
    let (store, _observer, importer) = setup();

    importer.import(&ram_document("p-100", "16")).await.unwrap();

    let expected = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
    let product = store.product("p-100").unwrap();
    assert_eq!(product.release_date, Some(expected));
    assert_eq!(product.last_modified, Some(expected));
}

#[tokio::test]
async fn falsy_price_never_overwrites_stored_amount() {
    for falsy in [json!(""), json!(0), json!(null)] {
        let (store, _observer, importer) = setup();
        importer.import(&ram_document("p-100", "16")).await.unwrap();
        store.reset_counters();

        let mut doc = ram_document("p-100", "16");
        doc.price = Some(json!({ "amount": falsy.clone(), "currency": "EUR" }));
        let outcome = importer.import(&doc).await.unwrap();

        let product = store.product("p-100").unwrap();
        let price = store.price(product.id).unwrap();
        assert_eq!(price.amount, Some(Decimal::new(36_500, 2)), "falsy {falsy}");
        assert_eq!(outcome.summary.fields_changed, 0);
        assert_eq!(store.writes(), 0);
    }
}

#[tokio::test]
async fn unknown_label_is_reported_once_and_not_stored() {
    let (store, observer, importer) = setup();
    let doc = document(json!({
        "id": "p-200",
        "specifications": {
            "RAM": {
                "CAS Latency": payload(42, "CAS Latency", "16"),
                "Heatspreader colour": payload(50, "Heatspreader colour", "black"),
                "RGB lighting": payload(51, "RGB lighting", "yes")
            }
        }
    }));

    let outcome = importer.import(&doc).await.unwrap();

    assert_eq!(
        observer.drift_events(),
        vec![DriftEvent {
            category: "RAM".to_string(),
            unknown_key: "RGB lighting".to_string(),
        }]
    );
    assert_eq!(outcome.summary.unknown_keys_seen, vec!["RAM/RGB lighting"]);
    assert!(outcome.issues.contains(&IngestIssue::UnknownKey {
        category: "RAM".to_string(),
        key: "RGB lighting".to_string(),
    }));
    assert!(
        observer.issues().is_empty(),
        "unknown keys reach the observer as drift only"
    );

    let product = store.product("p-200").unwrap();
    let group = store.group(product.id, "RAM").unwrap();
    assert_eq!(group.slots.len(), 1);
    assert!(store.component(50).is_none());
    assert!(store.component(51).is_none());
}

#[tokio::test]
async fn unknown_categories_are_skipped_without_error() {
    let (store, observer, importer) = setup();
    let doc = document(json!({
        "id": "p-300",
        "specifications": {
            "RAM": {"CAS Latency": payload(42, "CAS Latency", "16")},
            "Warranty": {"Duration": payload(60, "Duration", "2 years")},
            "Holograms": {"Count": payload(61, "Count", "3")}
        }
    }));

    let outcome = importer.import(&doc).await.unwrap();

    assert_eq!(outcome.summary.categories_imported, 1);
    assert_eq!(outcome.summary.categories_skipped_unknown, 2);
    assert_eq!(
        outcome.summary.unknown_keys_seen,
        vec![format!("{ROOT_SCOPE}/Holograms")]
    );
    assert_eq!(observer.drift_events().len(), 1);
    assert!(store.component(60).is_none());
    assert!(store.component(61).is_none());

    let product = store.product("p-300").unwrap();
    assert_eq!(store.tree(product.id).unwrap().categories, vec!["RAM"]);
}

#[tokio::test]
async fn malformed_category_does_not_block_the_rest() {
    let (store, observer, importer) = setup();
    let doc = document(json!({
        "id": "p-400",
        "specifications": {
            "Processor": "not an object",
            "RAM": {
                "CAS Latency": payload(42, "CAS Latency", "16"),
                "Capacity": {"name": "Capacity", "value": "32 GB"}
            }
        }
    }));

    let outcome = importer.import(&doc).await.unwrap();

    let malformed: Vec<_> = outcome
        .issues
        .iter()
        .filter(|issue| matches!(issue, IngestIssue::MalformedPayload { .. }))
        .collect();
    assert_eq!(malformed.len(), 2);
    assert_eq!(observer.issues().len(), 2);
    assert_eq!(store.component(42).unwrap().value, "16");
    assert_eq!(outcome.summary.categories_imported, 1);
}

#[tokio::test]
async fn coercion_failure_skips_only_that_field() {
    let (store, _observer, importer) = setup();
    let mut doc = ram_document("p-100", "16");
    doc.fields
        .insert("releaseDate".to_string(), json!("next spring"));

    let outcome = importer.import(&doc).await.unwrap();

    let product = store.product("p-100").unwrap();
    assert!(product.release_date.is_none());
    assert_eq!(product.name.as_deref(), Some("Vengeance 32GB"));
    assert!(outcome.issues.iter().any(|issue| matches!(
        issue,
        IngestIssue::TypeCoercion { slot, .. } if slot == "release_date"
    )));
}

#[tokio::test]
async fn failed_sub_object_write_is_abandoned_alone() {
    let (store, observer, importer) = setup();
    store.fail_writes_for("price");

    let outcome = importer.import(&ram_document("p-100", "16")).await.unwrap();

    let product = store.product("p-100").unwrap();
    assert!(store.price(product.id).is_none());
    assert_eq!(store.component(42).unwrap().value, "16");
    assert!(store.group(product.id, "RAM").is_some());
    assert!(observer.issues().iter().any(|issue| matches!(
        issue,
        IngestIssue::Persistence { entity: "price", .. }
    )));
    assert_eq!(outcome.summary.issues, 1);
}

#[tokio::test]
async fn failed_commit_leaves_previous_state_intact() {
    let (store, observer, importer) = setup();
    importer.import(&ram_document("p-100", "16")).await.unwrap();
    store.fail_commits(true);

    let result = importer.import(&ram_document("p-100", "18")).await;

    assert!(matches!(result, Err(IngestError::Commit { .. })));
    assert_eq!(store.component(42).unwrap().value, "16");
    assert_eq!(observer.summaries().len(), 1, "no summary for a failed import");
}

#[tokio::test]
async fn unavailable_store_fails_the_import() {
    let (store, _observer, importer) = setup();
    store.fail_begin(true);

    let result = importer.import(&ram_document("p-100", "16")).await;

    assert!(matches!(result, Err(IngestError::Begin { .. })));
    assert!(store.product("p-100").is_none());
}

#[tokio::test]
async fn nested_objects_are_imported_and_referenced() {
    let (store, _observer, importer) = setup();
    let doc = document(json!({
        "id": 555,
        "stock": {"status": "in_stock", "quantity": 12, "deliveryDays": 2},
        "variants": [
            {"id": 1, "name": "Capacity", "value": "16 GB", "productId": "p-554"},
            {"id": 2, "name": "Capacity", "value": "64 GB", "productId": "p-556"}
        ],
        "energyLabel": {"id": 7, "class": "A", "labelUrl": "https://example.test/7.png"},
        "conditionClass": {"id": 3, "name": "Like new"}
    }));

    importer.import(&doc).await.unwrap();

    let product = store.product("555").unwrap();
    assert_eq!(product.energy_label_id, Some(7));
    assert_eq!(product.condition_class_id, Some(3));
    assert_eq!(store.energy_label(7).unwrap().class.as_deref(), Some("A"));
    assert_eq!(
        store.condition_class(3).unwrap().name.as_deref(),
        Some("Like new")
    );
    assert_eq!(store.stock(product.id).unwrap().quantity, Some(12));

    let variants = store.variants(product.id);
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[1].linked_product_id.as_deref(), Some("p-556"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_sight_creates_one_component() {
    let (store, _observer, importer) = setup();

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let importer = importer.clone();
            tokio::spawn(async move {
                let doc = document(json!({
                    "id": format!("p-{n}"),
                    "specifications": {
                        "RAM": {"CAS Latency": payload(777, "CAS Latency", "16")}
                    }
                }));
                importer.import(&doc).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("import failed");
    }

    assert_eq!(store.component_count(), 1);
    assert_eq!(store.component(777).unwrap().value, "16");
}

#[tokio::test]
async fn batch_reports_totals() {
    let (store, _observer, importer) = setup();
    let documents: Vec<_> = (0..5)
        .map(|n| ram_document(&format!("p-{n}"), "16"))
        .collect();

    let report = import_batch(&importer, &documents, 2).await;

    assert_eq!(report.items.len(), 5);
    assert_eq!(report.totals.products_imported, 5);
    assert_eq!(report.totals.products_failed, 0);
    assert_eq!(store.component_count(), 2);

    store.fail_begin(true);
    let report = import_batch(&importer, &documents, 2).await;
    assert_eq!(report.totals.products_failed, 5);
    assert_eq!(report.totals.products_imported, 0);
}

#[tokio::test]
async fn component_id_zero_is_attached_to_its_slot() {
    let (store, _observer, importer) = setup();
    let doc = document(json!({
        "id": "p-0",
        "energyLabel": {"id": 0, "class": "B"},
        "conditionClass": {"id": 0, "name": "Used"},
        "specifications": {
            "RAM": {"CAS Latency": payload(0, "CAS Latency", "16")}
        }
    }));

    let outcome = importer.import(&doc).await.unwrap();

    let product = store.product("p-0").unwrap();
    let group = store.group(product.id, "RAM").expect("group stored for id 0");
    assert_eq!(group.component_id("cas_latency"), Some(0));
    assert_eq!(store.tree(product.id).unwrap().categories, vec!["RAM"]);
    assert_eq!(product.energy_label_id, Some(0));
    assert_eq!(product.condition_class_id, Some(0));
    assert_eq!(outcome.groups, vec![group]);

    store.reset_counters();
    let again = importer.import(&doc).await.unwrap();
    assert_eq!(again.summary.fields_changed, 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn label_dropped_from_the_document_clears_its_slot() {
    let (store, _observer, importer) = setup();
    importer.import(&ram_document("p-100", "16")).await.unwrap();
    store.reset_counters();

    let doc = document(json!({
        "id": "p-100",
        "specifications": {
            "RAM": {"CAS Latency": payload(42, "CAS Latency", "16")}
        }
    }));
    let outcome = importer.import(&doc).await.unwrap();

    let product = store.product("p-100").unwrap();
    let group = store.group(product.id, "RAM").unwrap();
    assert_eq!(group.component_id("cas_latency"), Some(42));
    assert_eq!(group.component_id("capacity"), None);
    assert_eq!(outcome.summary.fields_changed, 1);
    assert_eq!(store.writes(), 1, "only the group is rewritten");
    assert!(store.component(43).is_some(), "shared components are kept");
}

#[tokio::test]
async fn malformed_label_keeps_its_previous_reference() {
    let (store, observer, importer) = setup();
    importer.import(&ram_document("p-100", "16")).await.unwrap();

    let doc = document(json!({
        "id": "p-100",
        "specifications": {
            "RAM": {
                "CAS Latency": payload(42, "CAS Latency", "16"),
                "Capacity": {"name": "Capacity", "value": "32 GB"}
            }
        }
    }));
    importer.import(&doc).await.unwrap();

    let product = store.product("p-100").unwrap();
    let group = store.group(product.id, "RAM").unwrap();
    assert_eq!(group.component_id("capacity"), Some(43));
    assert!(observer
        .issues()
        .iter()
        .any(|issue| matches!(issue, IngestIssue::MalformedPayload { .. })));
}

#[tokio::test]
async fn numeric_string_ids_are_accepted_everywhere() {
    let (store, _observer, importer) = setup();
    let doc = document(json!({
        "id": "p-200",
        "energyLabel": {"id": "7", "class": "A"},
        "specifications": {
            "RAM": {"CAS Latency": {"id": "42", "name": "CAS Latency", "value": "16"}}
        }
    }));

    let outcome = importer.import(&doc).await.unwrap();

    assert!(outcome.issues.is_empty(), "unexpected issues: {:?}", outcome.issues);
    let product = store.product("p-200").unwrap();
    assert_eq!(product.energy_label_id, Some(7));
    let group = store.group(product.id, "RAM").unwrap();
    assert_eq!(group.component_id("cas_latency"), Some(42));
}
