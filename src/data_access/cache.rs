use crate::core::DatabaseId;
use lru::LruCache;
use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;
use std::rc::Rc;

const DEFAULT_CAPACITY: usize = 512;

type CacheKey = (DatabaseId, String);

/// Read-through cache for query results within one unit of work
///
/// Suspensions nest; the cache serves entries again only after every
/// suspension has ended.
pub struct QueryCache {
    suspensions: Cell<u32>,
    entries: RefCell<LruCache<CacheKey, Option<String>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            suspensions: Cell::new(0),
            entries: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.suspensions.get() == 0
    }

    pub fn get(&self, database: &DatabaseId, key: &str) -> Option<Option<String>> {
        if !self.is_enabled() {
            return None;
        }
        self.entries
            .borrow_mut()
            .get(&(database.clone(), key.to_string()))
            .cloned()
    }

    pub fn insert(&self, database: &DatabaseId, key: &str, value: Option<String>) {
        if self.is_enabled() {
            self.entries
                .borrow_mut()
                .put((database.clone(), key.to_string()), value);
        }
    }

    pub fn invalidate(&self, database: &DatabaseId, key: &str) {
        self.entries
            .borrow_mut()
            .pop(&(database.clone(), key.to_string()));
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop serving cached results until the returned guard drops
    pub fn suspend(self: &Rc<Self>) -> CacheSuspension {
        self.suspensions.set(self.suspensions.get() + 1);
        self.clear();
        CacheSuspension {
            cache: Rc::clone(self),
        }
    }

    fn resume(&self) {
        self.suspensions
            .set(self.suspensions.get().saturating_sub(1));
        self.clear();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`QueryCache::suspend`]; dropping it resets the cache
#[must_use = "the cache resumes as soon as the suspension is dropped"]
pub struct CacheSuspension {
    cache: Rc<QueryCache>,
}

impl Drop for CacheSuspension {
    fn drop(&mut self) {
        self.cache.resume();
    }
}
