//! Persistence port consumed by the ingestion engine.
//!
//! A [`Store`] hands out one [`StoreTx`] per product import. Everything the
//! import writes goes through that transaction; dropping it without
//! [`StoreTx::commit`] leaves the previously persisted state untouched.
//!
//! Implementations must make the `get_or_create_*` operations atomic with
//! respect to concurrent transactions (unique key plus insert-on-conflict),
//! and a failed [`Persist::persist`] must leave the transaction usable so the
//! remaining sub-objects of the import can still be written.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{
    AttributeComponent, AttributeGroup, AttributeTree, ConditionClass, EnergyLabel, Price,
    Product, Stock, Variant,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage is unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// Write one entity's current state.
#[async_trait]
pub trait Persist<T: Sync> {
    /// Insert or overwrite `record` inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. The transaction stays usable.
    async fn persist(&mut self, record: &T) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx;

    /// Open the unit of work for one product import.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if no transaction can be started.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One product import's unit of work.
#[async_trait]
pub trait StoreTx:
    Send
    + Persist<Product>
    + Persist<AttributeComponent>
    + Persist<AttributeGroup>
    + Persist<AttributeTree>
    + Persist<Price>
    + Persist<Stock>
    + Persist<Variant>
    + Persist<EnergyLabel>
    + Persist<ConditionClass>
{
    /// Fetch the product by retailer id, inserting an empty row on first sight.
    async fn get_or_create_product(&mut self, source_product_id: &str)
        -> Result<Product, StoreError>;

    /// Fetch the component by external id, inserting a blank one on first sight.
    async fn get_or_create_component(&mut self, id: i64)
        -> Result<AttributeComponent, StoreError>;

    async fn get_or_create_energy_label(&mut self, id: i64) -> Result<EnergyLabel, StoreError>;

    async fn get_or_create_condition_class(
        &mut self,
        id: i64,
    ) -> Result<ConditionClass, StoreError>;

    async fn load_group(
        &mut self,
        product_id: i64,
        category: &str,
    ) -> Result<Option<AttributeGroup>, StoreError>;

    async fn load_tree(&mut self, product_id: i64) -> Result<Option<AttributeTree>, StoreError>;

    async fn load_price(&mut self, product_id: i64) -> Result<Option<Price>, StoreError>;

    async fn load_stock(&mut self, product_id: i64) -> Result<Option<Stock>, StoreError>;

    async fn load_variant(
        &mut self,
        product_id: i64,
        variant_id: i64,
    ) -> Result<Option<Variant>, StoreError>;

    /// Make every write of this unit of work visible atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; nothing is applied then.
    async fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
