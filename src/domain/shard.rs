//! Deterministic partitioning of an ordered universe into contiguous shards.
//!
//! Shard `i` of `n` over `len` items gets `len / n` items, plus one extra if
//! `i < len % n`. The assignment depends only on `(len, i, n)`, so re-running a
//! single failed shard reproduces exactly the same symbol set.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardError {
    #[error("shard count must be at least 1")]
    ZeroShards,

    #[error("shard index {index} out of range for {count} shards")]
    IndexOutOfRange { index: usize, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub index: usize,
    pub total_count: usize,
    pub symbols: Vec<String>,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Label used for artifact file names, e.g. `shard_2_of_8`.
    pub fn label(&self) -> String {
        format!("shard_{}_of_{}", self.index, self.total_count)
    }
}

/// Half-open `[start, end)` bounds of shard `index` over `len` items.
pub fn shard_bounds(len: usize, index: usize, count: usize) -> Result<(usize, usize), ShardError> {
    if count == 0 {
        return Err(ShardError::ZeroShards);
    }
    if index >= count {
        return Err(ShardError::IndexOutOfRange { index, count });
    }

    let base = len / count;
    let extra = len % count;
    let start = index * base + index.min(extra);
    let end = start + base + usize::from(index < extra);
    Ok((start, end))
}

pub fn shard_slice<T>(items: &[T], index: usize, count: usize) -> Result<&[T], ShardError> {
    let (start, end) = shard_bounds(items.len(), index, count)?;
    Ok(&items[start..end])
}

pub fn plan_shard(universe: &[String], index: usize, count: usize) -> Result<Shard, ShardError> {
    let symbols = shard_slice(universe, index, count)?.to_vec();
    Ok(Shard {
        index,
        total_count: count,
        symbols,
    })
}
