//! Worker context: identity of this process among the parallel CI workers.

use serde::Serialize;

use crate::error::ConfigError;

/// Identity of one worker. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerContext {
    /// Human-readable worker identity (CI node name).
    id: String,
    /// Total number of parallel workers.
    total: usize,
    /// Zero-based index of this worker.
    index: usize,
}

impl WorkerContext {
    /// Create a context, validating `0 <= index < total`.
    pub fn new(id: impl Into<String>, total: usize, index: usize) -> Result<Self, ConfigError> {
        if total == 0 {
            return Err(ConfigError::InvalidWorkerCount { total: 0 });
        }
        if index >= total {
            return Err(ConfigError::IndexOutOfRange { index, total });
        }
        Ok(Self {
            id: id.into(),
            total,
            index,
        })
    }

    /// Single-worker context for tests.
    #[cfg(test)]
    pub fn solo() -> Self {
        Self {
            id: "worker-0".to_string(),
            total: 1,
            index: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the item at sorted `position` belongs to this worker.
    pub fn owns(&self, position: usize) -> bool {
        position % self.total == self.index
    }
}

impl std::fmt::Display for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.id, self.index + 1, self.total)
    }
}
