//! Deterministic round-robin sharding of tests (and tasks) across workers.

use crate::context::WorkerContext;
use crate::discovery::TestFile;
use crate::error::ConfigError;

/// Select the items of an already-ordered slice owned by `ctx`.
///
/// The item at position `p` belongs to worker `p mod total`.
pub fn assign<'a, T>(items: &'a [T], ctx: &WorkerContext) -> Vec<&'a T> {
    items
        .iter()
        .enumerate()
        .filter(|(position, _)| ctx.owns(*position))
        .map(|(_, item)| item)
        .collect()
}

/// Shard a discovered test set for worker `index` of `total`.
///
/// Tests are sorted by full path first, so the result depends only on the
/// set of tests and the worker count.
pub fn shard(
    tests: impl IntoIterator<Item = TestFile>,
    total: usize,
    index: usize,
) -> Result<Vec<TestFile>, ConfigError> {
    if total == 0 {
        return Err(ConfigError::InvalidWorkerCount { total: 0 });
    }
    if index >= total {
        return Err(ConfigError::IndexOutOfRange { index, total });
    }

    let mut sorted: Vec<TestFile> = tests.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    Ok(sorted
        .into_iter()
        .enumerate()
        .filter(|(position, _)| position % total == index)
        .map(|(_, test)| test)
        .collect())
}
