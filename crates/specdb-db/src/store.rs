//! Postgres implementation of the persistence port.
//!
//! One [`PgTx`] wraps one database transaction per product import. Each
//! operation runs inside its own savepoint, so a failed statement rolls back
//! only itself and the transaction stays usable for the remaining
//! sub-objects. Get-or-create operations are `INSERT .. ON CONFLICT DO
//! NOTHING` followed by a read, which is race-free under concurrent imports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use specdb_core::{
    AttributeComponent, AttributeGroup, AttributeTree, ConditionClass, EnergyLabel, Persist,
    Price, Product, Stock, Store, StoreError, StoreTx, Variant,
};
use sqlx::{Acquire, PgPool, Postgres, Transaction};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    source_product_id: String,
    name: Option<String>,
    brand: Option<String>,
    url: Option<String>,
    main_category: Option<String>,
    eans: Vec<String>,
    release_date: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
    rating: Option<f64>,
    is_sellable: Option<bool>,
    energy_label_id: Option<i64>,
    condition_class_id: Option<i64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            source_product_id: row.source_product_id,
            name: row.name,
            brand: row.brand,
            url: row.url,
            main_category: row.main_category,
            eans: row.eans,
            release_date: row.release_date,
            last_modified: row.last_modified,
            rating: row.rating,
            is_sellable: row.is_sellable,
            energy_label_id: row.energy_label_id,
            condition_class_id: row.condition_class_id,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ComponentRow {
    id: i64,
    name: String,
    value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PriceRow {
    product_id: i64,
    amount: Option<Decimal>,
    currency: Option<String>,
    previous_amount: Option<Decimal>,
    valid_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StockRow {
    product_id: i64,
    status: Option<String>,
    quantity: Option<i64>,
    delivery_days: Option<i64>,
    checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct VariantRow {
    product_id: i64,
    variant_id: i64,
    name: Option<String>,
    value: Option<String>,
    linked_product_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EnergyLabelRow {
    id: i64,
    class: Option<String>,
    label_url: Option<String>,
    sheet_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ConditionClassRow {
    id: i64,
    name: Option<String>,
    description: Option<String>,
}

const PRODUCT_COLUMNS: &str = "id, source_product_id, name, brand, url, main_category, eans, \
     release_date, last_modified, rating, is_sellable, energy_label_id, condition_class_id";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let tx = self.pool.begin().await.map_err(DbError::from)?;
        Ok(PgTx { tx })
    }
}

/// One product import's database transaction. Dropping it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn savepoint(&mut self) -> Result<Transaction<'_, Postgres>, DbError> {
        Ok(Acquire::begin(&mut self.tx).await?)
    }
}

// ---------------------------------------------------------------------------
// Get-or-create and loads
// ---------------------------------------------------------------------------

#[async_trait]
impl StoreTx for PgTx {
    async fn get_or_create_product(
        &mut self,
        source_product_id: &str,
    ) -> Result<Product, StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO products (source_product_id) VALUES ($1) \
             ON CONFLICT (source_product_id) DO NOTHING",
        )
        .bind(source_product_id)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE source_product_id = $1"
        ))
        .bind(source_product_id)
        .fetch_one(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(row.into())
    }

    async fn get_or_create_component(
        &mut self,
        id: i64,
    ) -> Result<AttributeComponent, StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO attribute_components (id) VALUES ($1) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        let row = sqlx::query_as::<_, ComponentRow>(
            "SELECT id, name, value FROM attribute_components WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(AttributeComponent {
            id: row.id,
            name: row.name,
            value: row.value,
        })
    }

    async fn get_or_create_energy_label(&mut self, id: i64) -> Result<EnergyLabel, StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query("INSERT INTO energy_labels (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&mut *sp)
            .await
            .map_err(DbError::from)?;

        let row = sqlx::query_as::<_, EnergyLabelRow>(
            "SELECT id, class, label_url, sheet_url FROM energy_labels WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(EnergyLabel {
            id: row.id,
            class: row.class,
            label_url: row.label_url,
            sheet_url: row.sheet_url,
        })
    }

    async fn get_or_create_condition_class(
        &mut self,
        id: i64,
    ) -> Result<ConditionClass, StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query("INSERT INTO condition_classes (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&mut *sp)
            .await
            .map_err(DbError::from)?;

        let row = sqlx::query_as::<_, ConditionClassRow>(
            "SELECT id, name, description FROM condition_classes WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(ConditionClass {
            id: row.id,
            name: row.name,
            description: row.description,
        })
    }

    async fn load_group(
        &mut self,
        product_id: i64,
        category: &str,
    ) -> Result<Option<AttributeGroup>, StoreError> {
        let mut sp = self.savepoint().await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM attribute_groups \
             WHERE product_id = $1 AND category = $2)",
        )
        .bind(product_id)
        .bind(category)
        .fetch_one(&mut *sp)
        .await
        .map_err(DbError::from)?;

        if !exists {
            sp.commit().await.map_err(DbError::from)?;
            return Ok(None);
        }

        let slots: Vec<(String, i64)> = sqlx::query_as(
            "SELECT slot, component_id FROM attribute_group_slots \
             WHERE product_id = $1 AND category = $2",
        )
        .bind(product_id)
        .bind(category)
        .fetch_all(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(Some(AttributeGroup {
            product_id,
            category: category.to_string(),
            slots: slots.into_iter().collect(),
        }))
    }

    async fn load_tree(&mut self, product_id: i64) -> Result<Option<AttributeTree>, StoreError> {
        let mut sp = self.savepoint().await?;

        let categories: Option<Vec<String>> = sqlx::query_scalar(
            "SELECT categories FROM attribute_trees WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(categories.map(|categories| AttributeTree {
            product_id,
            categories,
        }))
    }

    async fn load_price(&mut self, product_id: i64) -> Result<Option<Price>, StoreError> {
        let mut sp = self.savepoint().await?;

        let row = sqlx::query_as::<_, PriceRow>(
            "SELECT product_id, amount, currency, previous_amount, valid_from \
             FROM product_prices WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(row.map(|row| Price {
            product_id: row.product_id,
            amount: row.amount,
            currency: row.currency,
            previous_amount: row.previous_amount,
            valid_from: row.valid_from,
        }))
    }

    async fn load_stock(&mut self, product_id: i64) -> Result<Option<Stock>, StoreError> {
        let mut sp = self.savepoint().await?;

        let row = sqlx::query_as::<_, StockRow>(
            "SELECT product_id, status, quantity, delivery_days, checked_at \
             FROM product_stock WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(row.map(|row| Stock {
            product_id: row.product_id,
            status: row.status,
            quantity: row.quantity,
            delivery_days: row.delivery_days,
            checked_at: row.checked_at,
        }))
    }

    async fn load_variant(
        &mut self,
        product_id: i64,
        variant_id: i64,
    ) -> Result<Option<Variant>, StoreError> {
        let mut sp = self.savepoint().await?;

        let row = sqlx::query_as::<_, VariantRow>(
            "SELECT product_id, variant_id, name, value, linked_product_id \
             FROM product_variants WHERE product_id = $1 AND variant_id = $2",
        )
        .bind(product_id)
        .bind(variant_id)
        .fetch_optional(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(row.map(|row| Variant {
            product_id: row.product_id,
            variant_id: row.variant_id,
            name: row.name,
            value: row.value,
            linked_product_id: row.linked_product_id,
        }))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[async_trait]
impl Persist<Product> for PgTx {
    async fn persist(&mut self, record: &Product) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "UPDATE products SET \
                 name               = $2, \
                 brand              = $3, \
                 url                = $4, \
                 main_category      = $5, \
                 eans               = $6, \
                 release_date       = $7, \
                 last_modified      = $8, \
                 rating             = $9, \
                 is_sellable        = $10, \
                 energy_label_id    = $11, \
                 condition_class_id = $12, \
                 updated_at         = NOW() \
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.brand)
        .bind(&record.url)
        .bind(&record.main_category)
        .bind(&record.eans)
        .bind(record.release_date)
        .bind(record.last_modified)
        .bind(record.rating)
        .bind(record.is_sellable)
        .bind(record.energy_label_id)
        .bind(record.condition_class_id)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<AttributeComponent> for PgTx {
    async fn persist(&mut self, record: &AttributeComponent) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO attribute_components (id, name, value) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET \
                 name       = EXCLUDED.name, \
                 value      = EXCLUDED.value, \
                 updated_at = NOW()",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.value)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<AttributeGroup> for PgTx {
    async fn persist(&mut self, record: &AttributeGroup) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO attribute_groups (product_id, category) VALUES ($1, $2) \
             ON CONFLICT (product_id, category) DO UPDATE SET updated_at = NOW()",
        )
        .bind(record.product_id)
        .bind(&record.category)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        let (slots, component_ids): (Vec<String>, Vec<i64>) = record
            .slots
            .iter()
            .map(|(slot, id)| (slot.clone(), *id))
            .unzip();

        sqlx::query(
            "INSERT INTO attribute_group_slots (product_id, category, slot, component_id) \
             SELECT $1, $2, s.slot, s.component_id \
             FROM UNNEST($3::text[], $4::bigint[]) AS s(slot, component_id) \
             ON CONFLICT (product_id, category, slot) DO UPDATE SET \
                 component_id = EXCLUDED.component_id",
        )
        .bind(record.product_id)
        .bind(&record.category)
        .bind(&slots)
        .bind(&component_ids)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sqlx::query(
            "DELETE FROM attribute_group_slots \
             WHERE product_id = $1 AND category = $2 AND NOT (slot = ANY($3::text[]))",
        )
        .bind(record.product_id)
        .bind(&record.category)
        .bind(&slots)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<AttributeTree> for PgTx {
    async fn persist(&mut self, record: &AttributeTree) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO attribute_trees (product_id, categories) VALUES ($1, $2) \
             ON CONFLICT (product_id) DO UPDATE SET \
                 categories = EXCLUDED.categories, \
                 updated_at = NOW()",
        )
        .bind(record.product_id)
        .bind(&record.categories)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<Price> for PgTx {
    async fn persist(&mut self, record: &Price) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO product_prices \
                 (product_id, amount, currency, previous_amount, valid_from) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (product_id) DO UPDATE SET \
                 amount          = EXCLUDED.amount, \
                 currency        = EXCLUDED.currency, \
                 previous_amount = EXCLUDED.previous_amount, \
                 valid_from      = EXCLUDED.valid_from, \
                 updated_at      = NOW()",
        )
        .bind(record.product_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.previous_amount)
        .bind(record.valid_from)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<Stock> for PgTx {
    async fn persist(&mut self, record: &Stock) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO product_stock \
                 (product_id, status, quantity, delivery_days, checked_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (product_id) DO UPDATE SET \
                 status        = EXCLUDED.status, \
                 quantity      = EXCLUDED.quantity, \
                 delivery_days = EXCLUDED.delivery_days, \
                 checked_at    = EXCLUDED.checked_at, \
                 updated_at    = NOW()",
        )
        .bind(record.product_id)
        .bind(&record.status)
        .bind(record.quantity)
        .bind(record.delivery_days)
        .bind(record.checked_at)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<Variant> for PgTx {
    async fn persist(&mut self, record: &Variant) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO product_variants \
                 (product_id, variant_id, name, value, linked_product_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (product_id, variant_id) DO UPDATE SET \
                 name              = EXCLUDED.name, \
                 value             = EXCLUDED.value, \
                 linked_product_id = EXCLUDED.linked_product_id, \
                 updated_at        = NOW()",
        )
        .bind(record.product_id)
        .bind(record.variant_id)
        .bind(&record.name)
        .bind(&record.value)
        .bind(&record.linked_product_id)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<EnergyLabel> for PgTx {
    async fn persist(&mut self, record: &EnergyLabel) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO energy_labels (id, class, label_url, sheet_url) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                 class      = EXCLUDED.class, \
                 label_url  = EXCLUDED.label_url, \
                 sheet_url  = EXCLUDED.sheet_url, \
                 updated_at = NOW()",
        )
        .bind(record.id)
        .bind(&record.class)
        .bind(&record.label_url)
        .bind(&record.sheet_url)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Persist<ConditionClass> for PgTx {
    async fn persist(&mut self, record: &ConditionClass) -> Result<(), StoreError> {
        let mut sp = self.savepoint().await?;

        sqlx::query(
            "INSERT INTO condition_classes (id, name, description) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET \
                 name        = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 updated_at  = NOW()",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.description)
        .execute(&mut *sp)
        .await
        .map_err(DbError::from)?;

        sp.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}
