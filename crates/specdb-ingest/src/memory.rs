//! In-memory [`Store`] used for dry runs and tests.
//!
//! Get-or-create operations take effect immediately under one lock, which
//! makes them atomic across concurrent transactions. Every other write is
//! buffered in its transaction and applied on commit; dropping the
//! transaction discards them. The store counts persist calls and can be told
//! to fail writes for an entity kind, or to fail commits.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use specdb_core::{
    AttributeComponent, AttributeGroup, AttributeTree, ConditionClass, DiffTarget, EnergyLabel,
    Persist, Price, Product, Stock, Store, StoreError, StoreTx, Variant,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    products: BTreeMap<String, Product>,
    components: BTreeMap<i64, AttributeComponent>,
    groups: BTreeMap<(i64, String), AttributeGroup>,
    trees: BTreeMap<i64, AttributeTree>,
    prices: BTreeMap<i64, Price>,
    stock: BTreeMap<i64, Stock>,
    variants: BTreeMap<(i64, i64), Variant>,
    energy_labels: BTreeMap<i64, EnergyLabel>,
    condition_classes: BTreeMap<i64, ConditionClass>,
}

impl Tables {
    fn merge(&mut self, other: Tables) {
        self.products.extend(other.products);
        self.components.extend(other.components);
        self.groups.extend(other.groups);
        self.trees.extend(other.trees);
        self.prices.extend(other.prices);
        self.stock.extend(other.stock);
        self.variants.extend(other.variants);
        self.energy_labels.extend(other.energy_labels);
        self.condition_classes.extend(other.condition_classes);
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    next_product_id: i64,
    writes: usize,
    creations: usize,
    commits: usize,
    failing_entities: BTreeSet<&'static str>,
    fail_commits: bool,
    fail_begin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `persist` calls issued so far, failed ones included.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Number of rows inserted by get-or-create operations.
    #[must_use]
    pub fn creations(&self) -> usize {
        self.lock().creations
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.writes = 0;
        state.creations = 0;
        state.commits = 0;
    }

    /// Make every subsequent write of `entity` (e.g. `"price"`) fail.
    pub fn fail_writes_for(&self, entity: &'static str) {
        self.lock().failing_entities.insert(entity);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.lock().fail_commits = fail;
    }

    pub fn fail_begin(&self, fail: bool) {
        self.lock().fail_begin = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_entities.clear();
        state.fail_commits = false;
        state.fail_begin = false;
    }

    #[must_use]
    pub fn product(&self, source_product_id: &str) -> Option<Product> {
        self.lock().tables.products.get(source_product_id).cloned()
    }

    #[must_use]
    pub fn component(&self, id: i64) -> Option<AttributeComponent> {
        self.lock().tables.components.get(&id).cloned()
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.lock().tables.components.len()
    }

    #[must_use]
    pub fn group(&self, product_id: i64, category: &str) -> Option<AttributeGroup> {
        self.lock()
            .tables
            .groups
            .get(&(product_id, category.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn tree(&self, product_id: i64) -> Option<AttributeTree> {
        self.lock().tables.trees.get(&product_id).cloned()
    }

    #[must_use]
    pub fn price(&self, product_id: i64) -> Option<Price> {
        self.lock().tables.prices.get(&product_id).cloned()
    }

    #[must_use]
    pub fn stock(&self, product_id: i64) -> Option<Stock> {
        self.lock().tables.stock.get(&product_id).cloned()
    }

    #[must_use]
    pub fn variants(&self, product_id: i64) -> Vec<Variant> {
        self.lock()
            .tables
            .variants
            .range((product_id, i64::MIN)..=(product_id, i64::MAX))
            .map(|(_, variant)| variant.clone())
            .collect()
    }

    #[must_use]
    pub fn energy_label(&self, id: i64) -> Option<EnergyLabel> {
        self.lock().tables.energy_labels.get(&id).cloned()
    }

    #[must_use]
    pub fn condition_class(&self, id: i64) -> Option<ConditionClass> {
        self.lock().tables.condition_classes.get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        if self.lock().fail_begin {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(MemoryTx {
            store: self.clone(),
            pending: Tables::default(),
        })
    }
}

/// One unit of work against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    store: MemoryStore,
    pending: Tables,
}

impl MemoryTx {
    fn record_write(&self, entity: &'static str) -> Result<(), StoreError> {
        let mut state = self.store.lock();
        state.writes += 1;
        if state.failing_entities.contains(entity) {
            return Err(StoreError::Backend(format!("injected {entity} write failure")));
        }
        Ok(())
    }
}

macro_rules! persist_into {
    ($entity:ty, $table:ident, |$record:ident| $key:expr) => {
        #[async_trait]
        impl Persist<$entity> for MemoryTx {
            async fn persist(&mut self, $record: &$entity) -> Result<(), StoreError> {
                self.record_write($record.entity())?;
                self.pending.$table.insert($key, $record.clone());
                Ok(())
            }
        }
    };
}

persist_into!(Product, products, |r| r.source_product_id.clone());
persist_into!(AttributeComponent, components, |r| r.id);
persist_into!(AttributeGroup, groups, |r| (r.product_id, r.category.clone()));
persist_into!(AttributeTree, trees, |r| r.product_id);
persist_into!(Price, prices, |r| r.product_id);
persist_into!(Stock, stock, |r| r.product_id);
persist_into!(Variant, variants, |r| (r.product_id, r.variant_id));
persist_into!(EnergyLabel, energy_labels, |r| r.id);
persist_into!(ConditionClass, condition_classes, |r| r.id);

/// Look `key` up in the pending writes first, then in committed state,
/// inserting `create()` into committed state when neither has it.
fn get_or_create<K, V>(
    pending: &BTreeMap<K, V>,
    state: &mut State,
    table: fn(&mut Tables) -> &mut BTreeMap<K, V>,
    key: K,
    create: impl FnOnce(&mut State) -> V,
) -> V
where
    K: Ord,
    V: Clone,
{
    if let Some(value) = pending.get(&key) {
        return value.clone();
    }
    if let Some(value) = table(&mut state.tables).get(&key) {
        return value.clone();
    }
    let value = create(state);
    state.creations += 1;
    table(&mut state.tables).insert(key, value.clone());
    value
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_or_create_product(
        &mut self,
        source_product_id: &str,
    ) -> Result<Product, StoreError> {
        let mut state = self.store.lock();
        Ok(get_or_create(
            &self.pending.products,
            &mut state,
            |t| &mut t.products,
            source_product_id.to_string(),
            |state| {
                state.next_product_id += 1;
                Product::new(state.next_product_id, source_product_id)
            },
        ))
    }

    async fn get_or_create_component(
        &mut self,
        id: i64,
    ) -> Result<AttributeComponent, StoreError> {
        let mut state = self.store.lock();
        Ok(get_or_create(
            &self.pending.components,
            &mut state,
            |t| &mut t.components,
            id,
            |_| AttributeComponent::new(id),
        ))
    }

    async fn get_or_create_energy_label(&mut self, id: i64) -> Result<EnergyLabel, StoreError> {
        let mut state = self.store.lock();
        Ok(get_or_create(
            &self.pending.energy_labels,
            &mut state,
            |t| &mut t.energy_labels,
            id,
            |_| EnergyLabel::new(id),
        ))
    }

    async fn get_or_create_condition_class(
        &mut self,
        id: i64,
    ) -> Result<ConditionClass, StoreError> {
        let mut state = self.store.lock();
        Ok(get_or_create(
            &self.pending.condition_classes,
            &mut state,
            |t| &mut t.condition_classes,
            id,
            |_| ConditionClass::new(id),
        ))
    }

    async fn load_group(
        &mut self,
        product_id: i64,
        category: &str,
    ) -> Result<Option<AttributeGroup>, StoreError> {
        let key = (product_id, category.to_string());
        if let Some(group) = self.pending.groups.get(&key) {
            return Ok(Some(group.clone()));
        }
        Ok(self.store.lock().tables.groups.get(&key).cloned())
    }

    async fn load_tree(&mut self, product_id: i64) -> Result<Option<AttributeTree>, StoreError> {
        if let Some(tree) = self.pending.trees.get(&product_id) {
            return Ok(Some(tree.clone()));
        }
        Ok(self.store.lock().tables.trees.get(&product_id).cloned())
    }

    async fn load_price(&mut self, product_id: i64) -> Result<Option<Price>, StoreError> {
        if let Some(price) = self.pending.prices.get(&product_id) {
            return Ok(Some(price.clone()));
        }
        Ok(self.store.lock().tables.prices.get(&product_id).cloned())
    }

    async fn load_stock(&mut self, product_id: i64) -> Result<Option<Stock>, StoreError> {
        if let Some(stock) = self.pending.stock.get(&product_id) {
            return Ok(Some(stock.clone()));
        }
        Ok(self.store.lock().tables.stock.get(&product_id).cloned())
    }

    async fn load_variant(
        &mut self,
        product_id: i64,
        variant_id: i64,
    ) -> Result<Option<Variant>, StoreError> {
        let key = (product_id, variant_id);
        if let Some(variant) = self.pending.variants.get(&key) {
            return Ok(Some(variant.clone()));
        }
        Ok(self.store.lock().tables.variants.get(&key).cloned())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.store.lock();
        if state.fail_commits {
            return Err(StoreError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }
        state.tables.merge(self.pending);
        state.commits += 1;
        Ok(())
    }
}
