//! Deduplicating store of labeled face observations, keyed by fingerprint.

use crate::types::{DimensionMismatch, Embedding, Fingerprint, Label, Observation};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no observation for fingerprint {0}")]
    NotFound(Fingerprint),
    #[error("fingerprint {0} is already cached")]
    AlreadyPresent(Fingerprint),
    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
}

/// Fingerprint → observation map. At most one observation per fingerprint;
/// entries are never overwritten or evicted.
///
/// Iteration is in fingerprint order, which keeps training matrices stable
/// between retrains of the same data.
#[derive(Debug)]
pub struct EmbeddingCache {
    dim: usize,
    entries: BTreeMap<Fingerprint, Observation>,
}

impl EmbeddingCache {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: BTreeMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&Observation> {
        self.entries.get(fingerprint)
    }

    pub fn insert(
        &mut self,
        fingerprint: Fingerprint,
        embedding: Embedding,
        label: Label,
    ) -> Result<(), CacheError> {
        embedding.check_dim(self.dim)?;
        if self.entries.contains_key(&fingerprint) {
            return Err(CacheError::AlreadyPresent(fingerprint));
        }
        self.entries.insert(fingerprint, Observation { embedding, label });
        Ok(())
    }

    /// Relabel an existing observation. The embedding is left untouched.
    pub fn set_label(&mut self, fingerprint: &Fingerprint, label: Label) -> Result<(), CacheError> {
        let obs = self
            .entries
            .get_mut(fingerprint)
            .ok_or_else(|| CacheError::NotFound(fingerprint.clone()))?;
        obs.label = label;
        Ok(())
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Result<Observation, CacheError> {
        self.entries
            .remove(fingerprint)
            .ok_or_else(|| CacheError::NotFound(fingerprint.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &Observation)> {
        self.entries.iter()
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s)
    }

    fn emb(v: f32) -> Embedding {
        Embedding::from_values(vec![v, v])
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert(fp("a"), emb(1.0), Label::person(0)).unwrap();
        let obs = cache.lookup(&fp("a")).unwrap();
        assert_eq!(obs.label, Label::person(0));
        assert_eq!(obs.embedding.values(), &[1.0, 1.0]);
        assert!(cache.lookup(&fp("b")).is_none());
    }

    #[test]
    fn test_insert_refuses_overwrite() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert(fp("a"), emb(1.0), Label::person(0)).unwrap();
        let err = cache.insert(fp("a"), emb(2.0), Label::person(1)).unwrap_err();
        assert_eq!(err, CacheError::AlreadyPresent(fp("a")));
        // First write wins
        assert_eq!(cache.lookup(&fp("a")).unwrap().label, Label::person(0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_checks_dimension() {
        let mut cache = EmbeddingCache::new(3);
        let err = cache.insert(fp("a"), emb(1.0), Label::UNKNOWN).unwrap_err();
        assert!(matches!(err, CacheError::Dimension(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_label_keeps_embedding() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert(fp("a"), emb(0.5), Label::UNKNOWN).unwrap();
        cache.set_label(&fp("a"), Label::person(2)).unwrap();
        let obs = cache.lookup(&fp("a")).unwrap();
        assert_eq!(obs.label, Label::person(2));
        assert_eq!(obs.embedding.values(), &[0.5, 0.5]);
    }

    #[test]
    fn test_set_label_missing() {
        let mut cache = EmbeddingCache::new(2);
        assert_eq!(
            cache.set_label(&fp("nope"), Label::person(0)),
            Err(CacheError::NotFound(fp("nope")))
        );
    }

    #[test]
    fn test_remove() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert(fp("a"), emb(1.0), Label::person(0)).unwrap();
        cache.insert(fp("b"), emb(2.0), Label::person(1)).unwrap();
        assert!(cache.remove(&fp("missing")).is_err());
        assert_eq!(cache.len(), 2);
        let removed = cache.remove(&fp("a")).unwrap();
        assert_eq!(removed.label, Label::person(0));
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&fp("a")).is_none());
    }

    #[test]
    fn test_iteration_order_is_by_fingerprint() {
        let mut cache = EmbeddingCache::new(2);
        for key in ["c", "a", "b"] {
            cache.insert(fp(key), emb(0.0), Label::UNKNOWN).unwrap();
        }
        let keys: Vec<&str> = cache.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
