//! Attribute component store operations.
//!
//! Components are shared by every product citing the same external id, so
//! creation goes through the store's atomic get-or-create; the engine never
//! checks for existence before inserting.

use serde_json::{Map, Value};
use specdb_core::{AttributeComponent, StoreError, StoreTx};

use crate::updater::{update, FieldMapping, UpdateOutcome};

const COMPONENT_MAPPING: &FieldMapping<'static> = &[("name", "name"), ("value", "value")];

/// Fetch the component with external `id`, creating it on first sight.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot fetch or insert the row.
pub async fn get_or_create<P>(tx: &mut P, id: i64) -> Result<AttributeComponent, StoreError>
where
    P: StoreTx,
{
    tx.get_or_create_component(id).await
}

/// Diff-update a component's name and value, writing only when one changed.
pub async fn import_fields<P>(
    tx: &mut P,
    component: &mut AttributeComponent,
    name: &str,
    value: &Value,
) -> UpdateOutcome
where
    P: StoreTx,
{
    let mut incoming = Map::new();
    incoming.insert("name".to_string(), Value::String(name.to_string()));
    incoming.insert("value".to_string(), value.clone());
    update(tx, component, &incoming, COMPONENT_MAPPING).await
}
