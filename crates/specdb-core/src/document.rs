//! Raw per-product documents as delivered by the retrieval layer.
//!
//! The attribute vocabulary is externally controlled, so categories and field
//! labels stay as raw JSON maps here. Mapping them onto typed entities is the
//! ingestion engine's job.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Category label → field label → `{id, name, value}` payload.
pub type SpecificationDocument = Map<String, Value>;

const KEY_ID: &str = "id";
const KEY_PRICE: &str = "price";
const KEY_STOCK: &str = "stock";
const KEY_VARIANTS: &str = "variants";
const KEY_ENERGY_LABEL: &str = "energyLabel";
const KEY_CONDITION_CLASS: &str = "conditionClass";
const KEY_SPECIFICATIONS: &str = "specifications";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("product document must be a JSON object")]
    NotAnObject,

    #[error("product document has no usable \"id\"")]
    MissingId,

    #[error("\"specifications\" must be an object of categories")]
    InvalidSpecifications,
}

/// One product envelope: scalar fields, adjacent nested objects, and the
/// attribute specification tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDocument {
    /// Retailer product id, always carried as a string.
    pub source_product_id: String,
    /// Every top-level member that is not one of the nested objects below.
    pub fields: Map<String, Value>,
    pub price: Option<Value>,
    pub stock: Option<Value>,
    pub variants: Option<Value>,
    pub energy_label: Option<Value>,
    pub condition_class: Option<Value>,
    pub specifications: SpecificationDocument,
}

impl ProductDocument {
    /// Parse a product envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if the text is not JSON or the envelope is
    /// unusable (see [`ProductDocument::from_value`]).
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Split a raw JSON envelope into its parts.
    ///
    /// Only `id` is required. Nested objects are kept raw so that a malformed
    /// one fails alone during import instead of rejecting the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::NotAnObject`], [`DocumentError::MissingId`], or
    /// [`DocumentError::InvalidSpecifications`].
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(mut fields) = value else {
            return Err(DocumentError::NotAnObject);
        };

        let source_product_id = match fields.get(KEY_ID) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(DocumentError::MissingId),
        };

        let specifications = match fields.remove(KEY_SPECIFICATIONS) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(DocumentError::InvalidSpecifications),
        };

        let mut take = |key: &str| fields.remove(key).filter(|v| !v.is_null());
        let price = take(KEY_PRICE);
        let stock = take(KEY_STOCK);
        let variants = take(KEY_VARIANTS);
        let energy_label = take(KEY_ENERGY_LABEL);
        let condition_class = take(KEY_CONDITION_CLASS);

        Ok(Self {
            source_product_id,
            fields,
            price,
            stock,
            variants,
            energy_label,
            condition_class,
            specifications,
        })
    }
}

/// Read the external id of a shared object: an integer or a numeric string.
///
/// Attribute payloads and nested objects (energy label, condition class,
/// variants) use this same rule.
#[must_use]
pub fn parse_external_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn deserialize_external_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    parse_external_id(&raw)
        .ok_or_else(|| de::Error::custom(format!("expected an integer id, got {raw}")))
}

/// The `{id, name, value}` payload attached to every field label in a
/// specification category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePayload {
    /// Stable external identifier of the attribute component.
    #[serde(deserialize_with = "deserialize_external_id")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl AttributePayload {
    /// Parse a payload from its raw form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload is not an object with an
    /// integer (or numeric string) `id`.
    pub fn from_raw(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }
}
