use crate::types::{Checkpoint, QueryResult};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Paginated, side-effect free read of the domain universe.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Returns at most `size` domains starting at `offset`; empty when exhausted.
    async fn get_batch(&self, size: usize, offset: u64) -> Result<Vec<String>, StoreError>;
}

/// Durable home for results and the resume checkpoint.
///
/// `save_results` must be an idempotent upsert keyed by domain.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save_results(&self, results: &[QueryResult]) -> Result<(), StoreError>;

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;

    async fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    results: HashMap<String, QueryResult>,
    writes: u64,
    checkpoint: Option<Checkpoint>,
}

/// In-process source and sink, for tests and small sweeps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: Vec<String>,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn results(&self) -> Vec<QueryResult> {
        self.state().results.values().cloned().collect()
    }

    pub fn result(&self, domain: &str) -> Option<QueryResult> {
        self.state().results.get(domain).cloned()
    }

    pub fn recorded(&self) -> usize {
        self.state().results.len()
    }

    /// Rows written including overwrites; equals `recorded` when nothing was
    /// saved twice.
    pub fn writes(&self) -> u64 {
        self.state().writes
    }
}

#[async_trait]
impl BatchSource for MemoryStore {
    async fn get_batch(&self, size: usize, offset: u64) -> Result<Vec<String>, StoreError> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.domains.len());
        let end = start.saturating_add(size).min(self.domains.len());
        Ok(self.domains[start..end].to_vec())
    }
}

#[async_trait]
impl ResultSink for MemoryStore {
    async fn save_results(&self, results: &[QueryResult]) -> Result<(), StoreError> {
        let mut state = self.state();
        for result in results {
            state.writes += 1;
            state.results.insert(result.domain.clone(), result.clone());
        }
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        self.state().checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.state().checkpoint)
    }
}
