//! The normalized entity graph: products, their attribute tree, attribute
//! groups, shared attribute components, and the adjacent nested objects.
//!
//! Every entity implements [`DiffTarget`] so the ingestion engine can diff and
//! update it slot by slot without knowing its concrete type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::field::{DiffTarget, FieldValue, SlotKind};

/// One externally identified `(id, name, value)` fact, shared by every product
/// that cites the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeComponent {
    pub id: i64,
    pub name: String,
    pub value: String,
}

impl AttributeComponent {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            value: String::new(),
        }
    }
}

impl DiffTarget for AttributeComponent {
    fn entity(&self) -> &'static str {
        "attribute_component"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        matches!(slot, "name" | "value").then_some(SlotKind::Text)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "name" => FieldValue::Text(self.name.clone()),
            "value" => FieldValue::Text(self.value.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        let text = value.into_text().unwrap_or_default();
        match slot {
            "name" => self.name = text,
            "value" => self.value = text,
            _ => {}
        }
    }
}

/// One category's attributes for one product: schema slot → component id.
///
/// Groups are private to their product and keyed by `(product_id, category)`.
/// `slots` holds exactly the slots populated by the latest import of the
/// category; setting a slot to [`FieldValue::Null`] clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeGroup {
    pub product_id: i64,
    pub category: String,
    pub slots: BTreeMap<String, i64>,
}

impl AttributeGroup {
    #[must_use]
    pub fn new(product_id: i64, category: impl Into<String>) -> Self {
        Self {
            product_id,
            category: category.into(),
            slots: BTreeMap::new(),
        }
    }

    /// Component id referenced by `slot`, if the slot is populated.
    #[must_use]
    pub fn component_id(&self, slot: &str) -> Option<i64> {
        self.slots.get(slot).copied()
    }
}

impl DiffTarget for AttributeGroup {
    fn entity(&self) -> &'static str {
        "attribute_group"
    }

    fn key(&self) -> String {
        format!("{}/{}", self.product_id, self.category)
    }

    // Slot names come from the category schema, so every slot is a reference.
    fn slot_kind(&self, _slot: &str) -> Option<SlotKind> {
        Some(SlotKind::Reference)
    }

    fn get(&self, slot: &str) -> FieldValue {
        self.slots.get(slot).copied().into()
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match value.into_integer() {
            Some(id) => {
                self.slots.insert(slot.to_string(), id);
            }
            None => {
                self.slots.remove(slot);
            }
        }
    }
}

/// The per-product aggregate of populated attribute groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTree {
    pub product_id: i64,
    /// Categories populated by the latest import; compared as a set.
    pub categories: Vec<String>,
}

impl AttributeTree {
    #[must_use]
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            categories: Vec::new(),
        }
    }
}

impl DiffTarget for AttributeTree {
    fn entity(&self) -> &'static str {
        "attribute_tree"
    }

    fn key(&self) -> String {
        self.product_id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        (slot == "categories").then_some(SlotKind::List)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "categories" => FieldValue::List(self.categories.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        if slot == "categories" {
            self.categories = value.into_list().unwrap_or_default();
        }
    }
}

/// The top aggregate for one retailer product.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Product {
    /// Internal row id.
    pub id: i64,
    pub source_product_id: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub url: Option<String>,
    pub main_category: Option<String>,
    pub eans: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub is_sellable: Option<bool>,
    pub energy_label_id: Option<i64>,
    pub condition_class_id: Option<i64>,
}

impl Product {
    #[must_use]
    pub fn new(id: i64, source_product_id: impl Into<String>) -> Self {
        Self {
            id,
            source_product_id: source_product_id.into(),
            ..Self::default()
        }
    }
}

impl DiffTarget for Product {
    fn entity(&self) -> &'static str {
        "product"
    }

    fn key(&self) -> String {
        self.source_product_id.clone()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        let kind = match slot {
            "name" | "brand" | "url" | "main_category" => SlotKind::Text,
            "eans" => SlotKind::List,
            "release_date" => SlotKind::Timestamp,
            "last_modified" => SlotKind::UnixTimestamp,
            "rating" => SlotKind::Float,
            "is_sellable" => SlotKind::Bool,
            "energy_label_id" | "condition_class_id" => SlotKind::Reference,
            _ => return None,
        };
        Some(kind)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "name" => self.name.clone().into(),
            "brand" => self.brand.clone().into(),
            "url" => self.url.clone().into(),
            "main_category" => self.main_category.clone().into(),
            "eans" => FieldValue::List(self.eans.clone()),
            "release_date" => self.release_date.into(),
            "last_modified" => self.last_modified.into(),
            "rating" => self.rating.into(),
            "is_sellable" => self.is_sellable.into(),
            "energy_label_id" => self.energy_label_id.into(),
            "condition_class_id" => self.condition_class_id.into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "name" => self.name = value.into_text(),
            "brand" => self.brand = value.into_text(),
            "url" => self.url = value.into_text(),
            "main_category" => self.main_category = value.into_text(),
            "eans" => self.eans = value.into_list().unwrap_or_default(),
            "release_date" => self.release_date = value.into_timestamp(),
            "last_modified" => self.last_modified = value.into_timestamp(),
            "rating" => self.rating = value.into_float(),
            "is_sellable" => self.is_sellable = value.into_bool(),
            "energy_label_id" => self.energy_label_id = value.into_integer(),
            "condition_class_id" => self.condition_class_id = value.into_integer(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Price {
    pub product_id: i64,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub previous_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
}

impl Price {
    #[must_use]
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            ..Self::default()
        }
    }
}

impl DiffTarget for Price {
    fn entity(&self) -> &'static str {
        "price"
    }

    fn key(&self) -> String {
        self.product_id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        let kind = match slot {
            "amount" | "previous_amount" => SlotKind::Decimal,
            "currency" => SlotKind::Text,
            "valid_from" => SlotKind::Timestamp,
            _ => return None,
        };
        Some(kind)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "amount" => self.amount.into(),
            "previous_amount" => self.previous_amount.into(),
            "currency" => self.currency.clone().into(),
            "valid_from" => self.valid_from.into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "amount" => self.amount = value.into_decimal(),
            "previous_amount" => self.previous_amount = value.into_decimal(),
            "currency" => self.currency = value.into_text(),
            "valid_from" => self.valid_from = value.into_timestamp(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stock {
    pub product_id: i64,
    /// Retailer stock state, e.g. `"in_stock"` or `"sold_out"`.
    pub status: Option<String>,
    pub quantity: Option<i64>,
    pub delivery_days: Option<i64>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Stock {
    #[must_use]
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            ..Self::default()
        }
    }
}

impl DiffTarget for Stock {
    fn entity(&self) -> &'static str {
        "stock"
    }

    fn key(&self) -> String {
        self.product_id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        let kind = match slot {
            "status" => SlotKind::Text,
            "quantity" | "delivery_days" => SlotKind::Integer,
            "checked_at" => SlotKind::Timestamp,
            _ => return None,
        };
        Some(kind)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "status" => self.status.clone().into(),
            "quantity" => self.quantity.into(),
            "delivery_days" => self.delivery_days.into(),
            "checked_at" => self.checked_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "status" => self.status = value.into_text(),
            "quantity" => self.quantity = value.into_integer(),
            "delivery_days" => self.delivery_days = value.into_integer(),
            "checked_at" => self.checked_at = value.into_timestamp(),
            _ => {}
        }
    }
}

/// A sibling offering of the product (another colour, capacity, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub product_id: i64,
    /// External variant id, unique within the product.
    pub variant_id: i64,
    pub name: Option<String>,
    pub value: Option<String>,
    /// Retailer id of the product this variant points to, if any.
    pub linked_product_id: Option<String>,
}

impl Variant {
    #[must_use]
    pub fn new(product_id: i64, variant_id: i64) -> Self {
        Self {
            product_id,
            variant_id,
            name: None,
            value: None,
            linked_product_id: None,
        }
    }
}

impl DiffTarget for Variant {
    fn entity(&self) -> &'static str {
        "variant"
    }

    fn key(&self) -> String {
        format!("{}/{}", self.product_id, self.variant_id)
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        matches!(slot, "name" | "value" | "linked_product_id").then_some(SlotKind::Text)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "name" => self.name.clone().into(),
            "value" => self.value.clone().into(),
            "linked_product_id" => self.linked_product_id.clone().into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "name" => self.name = value.into_text(),
            "value" => self.value = value.into_text(),
            "linked_product_id" => self.linked_product_id = value.into_text(),
            _ => {}
        }
    }
}

/// EU energy label, shared across products by external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyLabel {
    pub id: i64,
    /// Efficiency class, e.g. `"A"` or `"G"`.
    pub class: Option<String>,
    pub label_url: Option<String>,
    pub sheet_url: Option<String>,
}

impl EnergyLabel {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            class: None,
            label_url: None,
            sheet_url: None,
        }
    }
}

impl DiffTarget for EnergyLabel {
    fn entity(&self) -> &'static str {
        "energy_label"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        matches!(slot, "class" | "label_url" | "sheet_url").then_some(SlotKind::Text)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "class" => self.class.clone().into(),
            "label_url" => self.label_url.clone().into(),
            "sheet_url" => self.sheet_url.clone().into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "class" => self.class = value.into_text(),
            "label_url" => self.label_url = value.into_text(),
            "sheet_url" => self.sheet_url = value.into_text(),
            _ => {}
        }
    }
}

/// Second-hand condition grading, shared across products by external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionClass {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ConditionClass {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: None,
            description: None,
        }
    }
}

impl DiffTarget for ConditionClass {
    fn entity(&self) -> &'static str {
        "condition_class"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn slot_kind(&self, slot: &str) -> Option<SlotKind> {
        matches!(slot, "name" | "description").then_some(SlotKind::Text)
    }

    fn get(&self, slot: &str) -> FieldValue {
        match slot {
            "name" => self.name.clone().into(),
            "description" => self.description.clone().into(),
            _ => FieldValue::Null,
        }
    }

    fn set(&mut self, slot: &str, value: FieldValue) {
        match slot {
            "name" => self.name = value.into_text(),
            "description" => self.description = value.into_text(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn product_declares_kinds_for_known_slots_only() {
        let product = Product::new(1, "p-1");
        assert_eq!(product.slot_kind("eans"), Some(SlotKind::List));
        assert_eq!(product.slot_kind("last_modified"), Some(SlotKind::UnixTimestamp));
        assert_eq!(product.slot_kind("colour"), None);
    }

    #[test]
    fn product_get_set_roundtrip() {
        let mut product = Product::new(1, "p-1");
        let ts = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
        product.set("release_date", FieldValue::Timestamp(ts));
        product.set("name", FieldValue::Text("Vengeance".into()));
        assert_eq!(product.release_date, Some(ts));
        assert_eq!(product.get("name"), FieldValue::Text("Vengeance".into()));
        assert_eq!(product.get("brand"), FieldValue::Null);
    }

    #[test]
    fn group_unset_slot_reads_null() {
        let mut group = AttributeGroup::new(1, "RAM");
        assert_eq!(group.get("cas_latency"), FieldValue::Null);
        group.set("cas_latency", FieldValue::Integer(42));
        assert_eq!(group.component_id("cas_latency"), Some(42));
        assert_eq!(group.key(), "1/RAM");
    }

    #[test]
    fn component_starts_blank() {
        let component = AttributeComponent::new(42);
        assert_eq!(component.get("name"), FieldValue::Text(String::new()));
        assert_eq!(component.slot_kind("id"), None);
    }
}
