//! Splitting height ranges into bounded listing requests

use rpc_core::HeightRange;
use std::ops::RangeInclusive;

/// Split `heights` into contiguous, non-overlapping inclusive batches of at
/// most `batch_size` heights. An empty input range yields no batches.
pub fn plan_batches(heights: RangeInclusive<u64>, batch_size: u64) -> Vec<HeightRange> {
    let batch_size = batch_size.max(1);
    let (first, last) = heights.into_inner();

    let mut batches = Vec::new();
    let mut start = first;
    while start <= last {
        let end = start.saturating_add(batch_size - 1).min(last);
        batches.push(HeightRange::new(start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    batches
}
