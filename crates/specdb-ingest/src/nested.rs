//! Importers for the objects adjacent to a product: price, stock, variants,
//! energy label, and condition class.
//!
//! Each follows the same shape as attribute components: fetch or create the
//! stored row, then diff-update it from the raw object. A malformed object is
//! reported and skipped without affecting its siblings.

use serde_json::{Map, Value};
use specdb_core::{
    parse_external_id, ConditionClass, EnergyLabel, Price, Stock, StoreError, StoreTx, Variant,
};

use crate::error::IngestIssue;
use crate::updater::{update, FieldMapping};

const PRICE_MAPPING: &FieldMapping<'static> = &[
    ("amount", "amount"),
    ("currency", "currency"),
    ("previousAmount", "previous_amount"),
    ("validFrom", "valid_from"),
];

const STOCK_MAPPING: &FieldMapping<'static> = &[
    ("status", "status"),
    ("quantity", "quantity"),
    ("deliveryDays", "delivery_days"),
    ("updatedAt", "checked_at"),
];

const VARIANT_MAPPING: &FieldMapping<'static> = &[
    ("name", "name"),
    ("value", "value"),
    ("productId", "linked_product_id"),
];

const ENERGY_LABEL_MAPPING: &FieldMapping<'static> = &[
    ("class", "class"),
    ("labelUrl", "label_url"),
    ("sheetUrl", "sheet_url"),
];

const CONDITION_CLASS_MAPPING: &FieldMapping<'static> =
    &[("name", "name"), ("description", "description")];

/// Result of one nested-object import.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NestedOutcome {
    pub changed: usize,
    pub issues: Vec<IngestIssue>,
    /// External id of a shared object, for the product's reference slot.
    pub reference: Option<i64>,
}

impl NestedOutcome {
    fn issue(issue: IngestIssue) -> Self {
        Self {
            issues: vec![issue],
            ..Self::default()
        }
    }
}

fn as_object<'a>(context: &str, raw: &'a Value) -> Result<&'a Map<String, Value>, IngestIssue> {
    raw.as_object().ok_or_else(|| IngestIssue::MalformedPayload {
        context: context.to_string(),
        reason: "expected an object".to_string(),
    })
}

/// Integer `id` of a nested object; numeric strings are accepted.
fn external_id(context: &str, object: &Map<String, Value>) -> Result<i64, IngestIssue> {
    object
        .get("id")
        .and_then(parse_external_id)
        .ok_or_else(|| IngestIssue::MalformedPayload {
            context: context.to_string(),
            reason: "missing or non-integer \"id\"".to_string(),
        })
}

fn load_failed(entity: &'static str, key: impl ToString, source: StoreError) -> NestedOutcome {
    NestedOutcome::issue(IngestIssue::Persistence {
        entity,
        key: key.to_string(),
        source,
    })
}

pub async fn import_price<P: StoreTx>(tx: &mut P, product_id: i64, raw: &Value) -> NestedOutcome {
    let object = match as_object("price", raw) {
        Ok(object) => object,
        Err(issue) => return NestedOutcome::issue(issue),
    };

    let mut price = match tx.load_price(product_id).await {
        Ok(price) => price.unwrap_or_else(|| Price::new(product_id)),
        Err(source) => return load_failed("price", product_id, source),
    };

    let outcome = update(tx, &mut price, object, PRICE_MAPPING).await;
    NestedOutcome {
        changed: outcome.changed,
        issues: outcome.issues,
        reference: None,
    }
}

pub async fn import_stock<P: StoreTx>(tx: &mut P, product_id: i64, raw: &Value) -> NestedOutcome {
    let object = match as_object("stock", raw) {
        Ok(object) => object,
        Err(issue) => return NestedOutcome::issue(issue),
    };

    let mut stock = match tx.load_stock(product_id).await {
        Ok(stock) => stock.unwrap_or_else(|| Stock::new(product_id)),
        Err(source) => return load_failed("stock", product_id, source),
    };

    let outcome = update(tx, &mut stock, object, STOCK_MAPPING).await;
    NestedOutcome {
        changed: outcome.changed,
        issues: outcome.issues,
        reference: None,
    }
}

/// Import every variant of the list. Variants missing from the list are kept.
pub async fn import_variants<P: StoreTx>(
    tx: &mut P,
    product_id: i64,
    raw: &Value,
) -> NestedOutcome {
    let Some(items) = raw.as_array() else {
        return NestedOutcome::issue(IngestIssue::MalformedPayload {
            context: "variants".to_string(),
            reason: "expected a list".to_string(),
        });
    };

    let mut total = NestedOutcome::default();

    for (index, item) in items.iter().enumerate() {
        let context = format!("variants[{index}]");
        let parsed = as_object(&context, item)
            .and_then(|object| external_id(&context, object).map(|id| (object, id)));
        let (object, variant_id) = match parsed {
            Ok(parsed) => parsed,
            Err(issue) => {
                total.issues.push(issue);
                continue;
            }
        };

        let mut variant = match tx.load_variant(product_id, variant_id).await {
            Ok(variant) => variant.unwrap_or_else(|| Variant::new(product_id, variant_id)),
            Err(source) => {
                total.issues.push(IngestIssue::Persistence {
                    entity: "variant",
                    key: format!("{product_id}/{variant_id}"),
                    source,
                });
                continue;
            }
        };

        let outcome = update(tx, &mut variant, object, VARIANT_MAPPING).await;
        total.changed += outcome.changed;
        total.issues.extend(outcome.issues);
    }

    total
}

pub async fn import_energy_label<P: StoreTx>(tx: &mut P, raw: &Value) -> NestedOutcome {
    let parsed = as_object("energyLabel", raw)
        .and_then(|object| external_id("energyLabel", object).map(|id| (object, id)));
    let (object, id) = match parsed {
        Ok(parsed) => parsed,
        Err(issue) => return NestedOutcome::issue(issue),
    };

    let mut label: EnergyLabel = match tx.get_or_create_energy_label(id).await {
        Ok(label) => label,
        Err(source) => return load_failed("energy_label", id, source),
    };

    let outcome = update(tx, &mut label, object, ENERGY_LABEL_MAPPING).await;
    NestedOutcome {
        changed: outcome.changed,
        issues: outcome.issues,
        reference: Some(id),
    }
}

pub async fn import_condition_class<P: StoreTx>(tx: &mut P, raw: &Value) -> NestedOutcome {
    let parsed = as_object("conditionClass", raw)
        .and_then(|object| external_id("conditionClass", object).map(|id| (object, id)));
    let (object, id) = match parsed {
        Ok(parsed) => parsed,
        Err(issue) => return NestedOutcome::issue(issue),
    };

    let mut class: ConditionClass = match tx.get_or_create_condition_class(id).await {
        Ok(class) => class,
        Err(source) => return load_failed("condition_class", id, source),
    };

    let outcome = update(tx, &mut class, object, CONDITION_CLASS_MAPPING).await;
    NestedOutcome {
        changed: outcome.changed,
        issues: outcome.issues,
        reference: Some(id),
    }
}
