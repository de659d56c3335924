//! Fixed-size batching of an ordered sequence for batched external calls.

pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Lazily split `items` into contiguous batches of at most `batch_size`.
///
/// A `batch_size` of zero falls back to [`DEFAULT_BATCH_SIZE`].
pub fn chunk_symbols<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    let size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };
    items.chunks(size)
}

/// Number of batches `chunk_symbols` yields for `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    let size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };
    len.div_ceil(size)
}
