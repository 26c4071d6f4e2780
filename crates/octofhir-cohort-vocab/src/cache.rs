//! Memoising vocabulary wrapper

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use octofhir_cohort_expression::ConceptId;
use parking_lot::RwLock;

use crate::provider::{VocabularyError, VocabularyProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lookup {
    Known,
    Descendants,
    MappedFrom,
}

type CacheKey = (Lookup, Vec<ConceptId>);

/// Caches lookups of an inner provider, keyed by the sorted id batch
pub struct CachingVocabulary {
    inner: Arc<dyn VocabularyProvider>,
    cache: RwLock<HashMap<CacheKey, BTreeSet<ConceptId>>>,
    misses: AtomicUsize,
}

impl CachingVocabulary {
    pub fn new(inner: Arc<dyn VocabularyProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            misses: AtomicUsize::new(0),
        }
    }

    /// Number of lookups forwarded to the inner provider
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    async fn lookup(&self, kind: Lookup, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        let mut batch = ids.to_vec();
        batch.sort_unstable();
        batch.dedup();
        let key = (kind, batch);

        let cached = self.cache.read().get(&key).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = match kind {
            Lookup::Known => self.inner.known_concepts(&key.1).await?,
            Lookup::Descendants => self.inner.descendants(&key.1).await?,
            Lookup::MappedFrom => self.inner.mapped_from(&key.1).await?,
        };
        self.cache.write().insert(key, result.clone());
        Ok(result)
    }
}

#[async_trait]
impl VocabularyProvider for CachingVocabulary {
    async fn known_concepts(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        self.lookup(Lookup::Known, ids).await
    }

    async fn descendants(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        self.lookup(Lookup::Descendants, ids).await
    }

    async fn mapped_from(&self, ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>, VocabularyError> {
        self.lookup(Lookup::MappedFrom, ids).await
    }

    fn supports_concurrent_lookups(&self) -> bool {
        self.inner.supports_concurrent_lookups()
    }
}
