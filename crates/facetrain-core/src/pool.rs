//! Read-only pool of unidentified embeddings used to balance training data.

use crate::types::{DimensionMismatch, Embedding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("failed to read pool file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid pool file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pool is {found}-dimensional, session expects {expected}")]
    WrongDim { expected: usize, found: usize },
    #[error("pool entry {index}: {source}")]
    Entry {
        index: usize,
        source: DimensionMismatch,
    },
}

/// On-disk pool layout: `{"dim": D, "embeddings": [[...], ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolFile {
    pub dim: usize,
    pub embeddings: Vec<Vec<f32>>,
}

/// Fixed, ordered sequence of embeddings with no identity.
///
/// Shared across all sessions behind an `Arc`; never mutated after load.
#[derive(Debug, Clone)]
pub struct UnknownPool {
    dim: usize,
    embeddings: Vec<Embedding>,
}

impl UnknownPool {
    pub fn new(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self, PoolError> {
        let embeddings = rows
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                Embedding::with_dim(values, dim).map_err(|source| PoolError::Entry { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { dim, embeddings })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            embeddings: Vec::new(),
        }
    }

    /// Load a pool file and check it matches the session dimension.
    pub fn load(path: &Path, dim: usize) -> Result<Self, PoolError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PoolError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: PoolFile = serde_json::from_str(&raw)?;
        if file.dim != dim {
            return Err(PoolError::WrongDim {
                expected: dim,
                found: file.dim,
            });
        }
        Self::new(dim, file.embeddings)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// The first `n` embeddings (or all of them, if the pool is shorter).
    pub fn prefix(&self, n: usize) -> &[Embedding] {
        &self.embeddings[..n.min(self.embeddings.len())]
    }
}
