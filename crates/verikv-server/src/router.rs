//! Load-balanced lookups over a pool of queriers per dictionary

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;
use verikv_core::{
    DictionaryId, DictionaryStorage, Error, Label, LookupPath, QueryProvider, Result,
    TrieStorageMode, MAX_QUERIER_POOL_SIZE,
};

use crate::metrics;
use crate::querier::Querier;

/// Fixed-size set of queriers serving one dictionary
pub struct QuerierPool {
    id: DictionaryId,
    queriers: Vec<Arc<Querier>>,
}

impl QuerierPool {
    pub fn new(
        id: DictionaryId,
        size: usize,
        storage: Arc<dyn DictionaryStorage>,
        mode: TrieStorageMode,
    ) -> Result<Self> {
        if size == 0 || size > MAX_QUERIER_POOL_SIZE {
            return Err(Error::Configuration(format!(
                "querier pool size must be in 1..={}, got {}",
                MAX_QUERIER_POOL_SIZE, size
            )));
        }
        let queriers = (0..size)
            .map(|index| Querier::new(index, id, storage.clone(), mode).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { id, queriers })
    }

    /// Pick a querier with one random byte
    pub fn select(&self) -> &Arc<Querier> {
        let index = rand::random::<u8>() as usize % self.queriers.len();
        metrics::record_querier_selection(&self.id, index);
        &self.queriers[index]
    }

    pub fn queriers(&self) -> &[Arc<Querier>] {
        &self.queriers
    }

    pub fn refresh_all(&self) -> Result<()> {
        for querier in &self.queriers {
            querier.refresh()?;
        }
        metrics::record_refresh(&self.id, self.queriers.len());
        Ok(())
    }
}

/// Process-wide table of querier pools, keyed by dictionary
#[derive(Default)]
pub struct QuerierPools {
    pools: Mutex<HashMap<DictionaryId, Arc<QuerierPool>>>,
}

impl QuerierPools {
    pub fn new() -> Self {
        Self::default()
    }

    fn pools(&self) -> MutexGuard<'_, HashMap<DictionaryId, Arc<QuerierPool>>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &DictionaryId) -> Option<Arc<QuerierPool>> {
        self.pools().get(id).cloned()
    }

    /// Existing pool for `id`, or a new one built by `build`
    ///
    /// If two callers race, the first pool inserted wins and the other is dropped.
    pub fn get_or_create(
        &self,
        id: &DictionaryId,
        build: impl FnOnce() -> Result<QuerierPool>,
    ) -> Result<Arc<QuerierPool>> {
        if let Some(pool) = self.get(id) {
            return Ok(pool);
        }
        let pool = Arc::new(build()?);
        Ok(self.pools().entry(*id).or_insert(pool).clone())
    }

    pub fn remove(&self, id: &DictionaryId) -> Option<Arc<QuerierPool>> {
        self.pools().remove(id)
    }

    pub fn clear(&self) {
        self.pools().clear();
    }

    pub fn len(&self) -> usize {
        self.pools().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Query provider spreading lookups over a shared pool of queriers
pub struct QueryRouter {
    pools: Arc<QuerierPools>,
    storage: Arc<dyn DictionaryStorage>,
    mode: TrieStorageMode,
    pool_size: usize,
}

impl QueryRouter {
    pub fn new(
        pools: Arc<QuerierPools>,
        storage: Arc<dyn DictionaryStorage>,
        mode: TrieStorageMode,
        pool_size: usize,
    ) -> Self {
        Self {
            pools,
            storage,
            mode,
            pool_size,
        }
    }

    /// Pool for `id`, created on first access
    pub fn pool(&self, id: &DictionaryId) -> Result<Arc<QuerierPool>> {
        self.pools.get_or_create(id, || {
            info!(
                %id,
                queriers = self.pool_size,
                mode = ?self.mode,
                storage = self.storage.name(),
                "Creating querier pool"
            );
            QuerierPool::new(*id, self.pool_size, self.storage.clone(), self.mode)
        })
    }
}

impl QueryProvider for QueryRouter {
    fn name(&self) -> &'static str {
        "pooled"
    }

    fn lookup(&self, id: &DictionaryId, label: &Label) -> Result<LookupPath> {
        self.pool(id)?.select().lookup(label)
    }

    fn lookup_many(&self, id: &DictionaryId, labels: &[Label]) -> Result<Vec<LookupPath>> {
        self.pool(id)?.select().lookup_many(labels)
    }

    fn check_for_update(&self, id: &DictionaryId) -> Result<()> {
        match self.pools.get(id) {
            Some(pool) => pool.refresh_all(),
            None => Ok(()),
        }
    }
}

/// Query provider with exactly one querier per dictionary and no shared table
pub struct SingleQuerierRouter {
    storage: Arc<dyn DictionaryStorage>,
    mode: TrieStorageMode,
    queriers: Mutex<HashMap<DictionaryId, Arc<Querier>>>,
}

impl SingleQuerierRouter {
    pub fn new(storage: Arc<dyn DictionaryStorage>, mode: TrieStorageMode) -> Self {
        Self {
            storage,
            mode,
            queriers: Mutex::new(HashMap::new()),
        }
    }

    pub fn querier(&self, id: &DictionaryId) -> Result<Arc<Querier>> {
        let mut queriers = self.queriers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(querier) = queriers.get(id) {
            return Ok(querier.clone());
        }
        let querier = Arc::new(Querier::new(0, *id, self.storage.clone(), self.mode)?);
        queriers.insert(*id, querier.clone());
        Ok(querier)
    }

    fn existing(&self, id: &DictionaryId) -> Option<Arc<Querier>> {
        self.queriers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

impl QueryProvider for SingleQuerierRouter {
    fn name(&self) -> &'static str {
        "single"
    }

    fn lookup(&self, id: &DictionaryId, label: &Label) -> Result<LookupPath> {
        self.querier(id)?.lookup(label)
    }

    fn lookup_many(&self, id: &DictionaryId, labels: &[Label]) -> Result<Vec<LookupPath>> {
        self.querier(id)?.lookup_many(labels)
    }

    fn check_for_update(&self, id: &DictionaryId) -> Result<()> {
        match self.existing(id) {
            Some(querier) => querier.refresh(),
            None => Ok(()),
        }
    }
}
