mod item;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub(crate) use item::apply_transition;
pub use item::{InvalidStatus, InvalidTransition, Item, ItemId, ItemRecord, ItemStatus};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("item {0} already exists")]
    Duplicate(ItemId),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Invoked before an item leaves the catalog so background work bound to it
/// can be released.
#[async_trait]
pub trait ReleaseHook: Send + Sync {
    async fn release(&self, id: &ItemId);
}

/// Nanosecond-clock identifiers, strictly increasing within the process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn next_id(&self) -> ItemId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return ItemId::from(candidate.to_string()),
                Err(observed) => last = observed,
            }
        }
    }
}

#[derive(Default)]
pub struct Catalog {
    items: RwLock<HashMap<ItemId, Arc<Item>>>,
    ids: IdGenerator,
    release_hook: Option<Arc<dyn ReleaseHook>>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("items", &self.len())
            .field("release_hook", &self.release_hook.is_some())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release_hook(mut self, hook: Arc<dyn ReleaseHook>) -> Self {
        self.release_hook = Some(hook);
        self
    }

    /// Generates an identifier not currently present in the catalog.
    pub fn next_id(&self) -> ItemId {
        loop {
            let id = self.ids.next_id();
            if !self.read().contains_key(&id) {
                return id;
            }
        }
    }

    pub fn create(&self, record: ItemRecord) -> CatalogResult<Arc<Item>> {
        let mut items = self.write();
        if items.contains_key(&record.id) {
            return Err(CatalogError::Duplicate(record.id));
        }
        let item = Arc::new(Item::new(record));
        items.insert(item.id().clone(), Arc::clone(&item));
        Ok(item)
    }

    pub fn get(&self, id: &ItemId) -> Option<Arc<Item>> {
        self.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<ItemRecord> {
        self.read().values().map(|item| item.snapshot()).collect()
    }

    pub fn any(&self, predicate: impl Fn(&ItemRecord) -> bool) -> bool {
        self.read()
            .values()
            .any(|item| predicate(&item.snapshot()))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels the item's background work, releases its acquisition
    /// resources, then removes it. Returns the final record, or `None` if
    /// the id is unknown.
    pub async fn delete(&self, id: &ItemId) -> Option<ItemRecord> {
        let item = self.get(id)?;
        item.cancellation().cancel();
        if let Some(hook) = &self.release_hook {
            hook.release(id).await;
        }
        let removed = self.write().remove(id)?;
        let record = removed.snapshot();
        info!(item_id = %id, name = %record.name, "item deleted");
        Some(record)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ItemId, Arc<Item>>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ItemId, Arc<Item>>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }
}
