//! Memoised translation strategies.
//!
//! Strategy selection is pure but dispatch cost dominates for small
//! payloads, so resolved plans are memoised in a bounded LRU keyed by
//! `(runtime-observed source type, declared destination type)`. The
//! cache is the only write-shared structure on the delivery hot path
//! and sits behind a single mutex.

use cascade_types::{plan, Strategy, TypeExpr};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of memoised `(source, destination)` pairs.
pub const DEFAULT_TRANSLATION_CACHE_SIZE: usize = 1024;

/// Bounded LRU of resolved translation strategies.
#[derive(Debug)]
pub struct TranslationCache {
    entries: Mutex<LruCache<(TypeExpr, TypeExpr), Option<Arc<Strategy>>>>,
}

impl TranslationCache {
    /// Creates a cache holding up to `capacity` pairs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the strategy for translating `src` into `dst`, planning
    /// and memoising on miss. `None` means no coercion rule covers the
    /// pair; negative results are memoised too, since a miswired
    /// binding pays the planning cost on every single delivery
    /// otherwise.
    #[must_use]
    pub fn lookup(&self, src: &TypeExpr, dst: &TypeExpr) -> Option<Arc<Strategy>> {
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get(&(src.clone(), dst.clone())) {
            return hit.clone();
        }

        let planned = plan(src, dst).map(Arc::new);
        entries.put((src.clone(), dst.clone()), planned.clone());
        planned
    }

    /// Number of memoised pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when nothing is memoised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSLATION_CACHE_SIZE)
    }
}
