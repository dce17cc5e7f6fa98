//! Order-preserving sharding of a region's work list.

/// Errors raised by [`partition`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// Zero workers were requested.
    #[error("cannot partition across zero workers")]
    NoWorkers,

    /// The shards do not add back up to the input.
    #[error("shard lengths sum to {actual}, expected {expected}")]
    LengthMismatch {
        /// Input length.
        expected: usize,
        /// Sum of shard lengths.
        actual: usize,
    },
}

/// Splits `items` into exactly `workers` contiguous shards.
///
/// Every shard but the last holds `ceil(len / workers)` items (fewer once
/// the input runs out); the last takes whatever remains, which may be
/// nothing. Concatenating the shards reproduces `items`.
///
/// # Errors
///
/// Returns [`PartitionError::NoWorkers`] if `workers` is zero, and
/// [`PartitionError::LengthMismatch`] if the shards lose or duplicate
/// items.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Result<Vec<Vec<T>>, PartitionError> {
    if workers == 0 {
        return Err(PartitionError::NoWorkers);
    }

    let len = items.len();
    let chunk = len.div_ceil(workers);
    let bound = |i: usize| i.saturating_mul(chunk).min(len);

    let mut shards: Vec<Vec<T>> = (0..workers - 1)
        .map(|i| items[bound(i)..bound(i + 1)].to_vec())
        .collect();
    shards.push(items[bound(workers - 1)..].to_vec());

    let actual: usize = shards.iter().map(Vec::len).sum();
    if actual != len {
        return Err(PartitionError::LengthMismatch {
            expected: len,
            actual,
        });
    }

    Ok(shards)
}
