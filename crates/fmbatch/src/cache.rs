//! # Embedding memo
//!
//! A bounded map from prompt keys to embeddings. When full, the oldest insertion is
//! evicted; reads do not refresh an entry's age.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use tracing::debug;
use crate::error::InferenceError;
use crate::response::Embedding;

#[derive(Debug, Clone)]
pub struct EmbeddingCache<K = String> {
    capacity: usize,
    entries: HashMap<K, Embedding>,
    insertion_order: VecDeque<K>,
}

impl<K> EmbeddingCache<K>
where K: Hash + Eq + Clone
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &K) -> Option<&Embedding> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Store an embedding, evicting the oldest entry when the memo is full.
    ///
    /// Re-inserting an existing key replaces its value and keeps its original age.
    pub fn insert(&mut self, key: K, embedding: Embedding) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = embedding;
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, embedding);
    }

    /// Serve every row from the memo, embedding only the misses in one call to `embed`.
    ///
    /// Rows whose key is `None` are never memoized and always count as misses. `embed`
    /// receives the missing row indices in ascending order and must return one embedding
    /// per row; any other count fails with [`InferenceError::MalformedResponse`] and leaves
    /// the memo untouched. The result is aligned with `keys`.
    pub async fn get_or_embed<F, Fut>(&mut self, keys: &[Option<K>], embed: F) -> Result<Vec<Embedding>, InferenceError>
    where
        F: FnOnce(Vec<usize>) -> Fut,
        Fut: Future<Output = Result<Vec<Embedding>, InferenceError>>,
    {
        let mut rows: Vec<Option<Embedding>> = keys
            .iter()
            .map(|key| key.as_ref().and_then(|key| self.entries.get(key).cloned()))
            .collect();
        let missing: Vec<usize> = (0..rows.len()).filter(|&row| rows[row].is_none()).collect();
        debug!(hits = keys.len() - missing.len(), misses = missing.len(), "embedding memo lookup");

        if !missing.is_empty() {
            let fresh = embed(missing.clone()).await?;
            if fresh.len() != missing.len() {
                return Err(InferenceError::MalformedResponse {
                    expected: missing.len(),
                    actual: fresh.len(),
                });
            }
            for (row, embedding) in missing.into_iter().zip(fresh) {
                if let Some(key) = &keys[row] {
                    self.insert(key.clone(), embedding.clone());
                }
                rows[row] = Some(embedding);
            }
        }

        Ok(rows.into_iter().flatten().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[Option<&str>]) -> Vec<Option<String>> {
        items.iter().map(|key| key.map(str::to_string)).collect()
    }

    fn by_length(keys: &[Option<String>], rows: &[usize]) -> Vec<Embedding> {
        rows.iter()
            .map(|&row| vec![keys[row].as_ref().map_or(0, String::len) as f32])
            .collect()
    }

    #[test]
    fn test_evicts_oldest_insertion() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("b".to_string(), vec![2.0]);
        // reading does not refresh "a"
        assert!(cache.get(&"a".to_string()).is_some());
        cache.insert("c".to_string(), vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&"a".to_string()));
        assert!(cache.contains(&"b".to_string()));
        assert!(cache.contains(&"c".to_string()));
    }

    #[test]
    fn test_reinsert_replaces_without_evicting() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("b".to_string(), vec![2.0]);
        cache.insert("a".to_string(), vec![9.0]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(&vec![9.0]));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = EmbeddingCache::new(0);
        cache.insert("a".to_string(), vec![1.0]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_embed_only_embeds_misses() {
        let mut cache: EmbeddingCache<String> = EmbeddingCache::new(32);
        cache.insert("x".to_string(), vec![0.0]);
        let keys = keys(&[Some("x"), Some("yy"), None, Some("zzz")]);

        let mut requested = Vec::new();
        let embeddings = cache
            .get_or_embed(&keys, |rows| {
                requested = rows.clone();
                let fresh = by_length(&keys, &rows);
                async move { Ok(fresh) }
            })
            .await
            .unwrap();

        assert_eq!(requested, vec![1, 2, 3]);
        assert_eq!(embeddings, vec![vec![0.0], vec![2.0], vec![0.0], vec![3.0]]);
        // the keyless row is not memoized
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_get_or_embed_rejects_short_output() {
        let mut cache: EmbeddingCache<String> = EmbeddingCache::new(32);
        let keys = keys(&[Some("a"), Some("b"), Some("c")]);

        let err = cache
            .get_or_embed(&keys, |_| async { Ok(vec![vec![1.0]]) })
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::MalformedResponse { expected: 3, actual: 1 }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_embed_propagates_errors() {
        let mut cache: EmbeddingCache<String> = EmbeddingCache::new(4);
        let result = cache
            .get_or_embed(&keys(&[Some("a")]), |_| async {
                Err(InferenceError::resource_exhausted("out of memory"))
            })
            .await;

        assert!(result.unwrap_err().is_resource_exhausted());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_embed_all_hits_skips_embed() {
        let mut cache: EmbeddingCache<String> = EmbeddingCache::new(4);
        cache.insert("a".to_string(), vec![7.0]);

        let mut called = false;
        let embeddings = cache
            .get_or_embed(&keys(&[Some("a"), Some("a")]), |_| {
                called = true;
                async { Ok(Vec::new()) }
            })
            .await
            .unwrap();

        assert!(!called);
        assert_eq!(embeddings, vec![vec![7.0], vec![7.0]]);
    }
}
