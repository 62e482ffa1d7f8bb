//! Bounded cache of open vector store handles.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;

use super::VectorStore;
use crate::{Result, TRACING_TARGET_RAG};

struct CachedHandle {
    store: VectorStore,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    handles: HashMap<String, CachedHandle>,
    clock: u64,
}

/// Least-recently-used cache of vector store handles keyed by owner.
///
/// Evicted handles are reopened from their persisted files on next use.
pub struct HandleCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl HandleCache {
    /// Creates a cache holding at most `capacity` handles.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached handle for `key`, opening it with `open` on a miss.
    pub async fn get_or_open<F, Fut>(&self, key: &str, open: F) -> Result<VectorStore>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VectorStore>>,
    {
        let mut state = self.state.lock().await;
        state.clock += 1;
        let now = state.clock;

        if let Some(handle) = state.handles.get_mut(key) {
            handle.last_used = now;
            return Ok(handle.store.clone());
        }

        let store = open().await?;
        let oldest = (state.handles.len() >= self.capacity)
            .then(|| {
                state
                    .handles
                    .iter()
                    .min_by_key(|(_, handle)| handle.last_used)
                    .map(|(key, _)| key.clone())
            })
            .flatten();
        if let Some(oldest) = oldest {
            state.handles.remove(&oldest);
            tracing::debug!(target: TRACING_TARGET_RAG, key = %oldest, "Vector store handle evicted");
        }

        state.handles.insert(
            key.to_owned(),
            CachedHandle {
                store: store.clone(),
                last_used: now,
            },
        );
        Ok(store)
    }

    /// Drops the handle for `key`, if cached.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.state.lock().await.handles.remove(key).is_some()
    }

    /// Returns whether a handle for `key` is cached.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.handles.contains_key(key)
    }

    /// Returns the number of cached handles.
    pub async fn len(&self) -> usize {
        self.state.lock().await.handles.len()
    }
}

impl std::fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::provider::EmbeddingProvider;
    use crate::rag::LocalVectorStore;
    use crate::testing::FakeEmbedder;

    async fn open(dir: &TempDir, opened: &AtomicUsize) -> Result<VectorStore> {
        opened.fetch_add(1, Ordering::SeqCst);
        let provider = EmbeddingProvider::new(Arc::new(FakeEmbedder::default()));
        let store = LocalVectorStore::open(dir.path(), provider).await?;
        Ok(VectorStore::Local(Arc::new(store)))
    }

    #[tokio::test]
    async fn reuses_handles_and_evicts_least_recent() {
        let dir = TempDir::new().unwrap();
        let opened = AtomicUsize::new(0);
        let cache = HandleCache::new(2);

        cache.get_or_open("a", || open(&dir, &opened)).await.unwrap();
        cache.get_or_open("b", || open(&dir, &opened)).await.unwrap();
        cache.get_or_open("a", || open(&dir, &opened)).await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);

        cache.get_or_open("c", || open(&dir, &opened)).await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
    }

    #[tokio::test]
    async fn invalidate_forces_reopen() {
        let dir = TempDir::new().unwrap();
        let opened = AtomicUsize::new(0);
        let cache = HandleCache::new(4);

        cache.get_or_open("a", || open(&dir, &opened)).await.unwrap();
        assert!(cache.invalidate("a").await);
        cache.get_or_open("a", || open(&dir, &opened)).await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }
}
