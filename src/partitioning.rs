//! Distribution of time blocks over workers.
use itertools::Itertools;
use log::debug;

use crate::error::{Error, Result};
use crate::types::TimeSlice;

/// The time block sequences assigned to one worker, one sequence per leg. All
/// sequences have the same length.
pub type TimeSets = Vec<Vec<TimeSlice>>;

/// Splits `0..nt` into `worker_count` contiguous blocks of `nt / worker_count`
/// time slices. The last block absorbs the remainder.
#[must_use]
pub(crate) fn time_blocks(nt: usize, worker_count: usize) -> Vec<TimeSlice> {
    let spacing = nt / worker_count;
    (0..worker_count)
        .map(|b| {
            let end = if b + 1 == worker_count {
                nt
            } else {
                (b + 1) * spacing
            };
            b * spacing..end
        })
        .collect()
}

/// Assigns the block tuples of an `npoint` diagram to worker `rank` out of
/// `worker_count`.
///
/// Block tuples are the lexicographically ordered cartesian product of block
/// indices; with `symmetric` only non-decreasing tuples are kept. The tuples
/// are cut into consecutive shares of `ceil(len / worker_count)` and worker
/// `rank` gets share `rank`, so the shares of all workers cover every tuple
/// exactly once.
///
/// # Examples
/// ```
/// # use a2a_contract::partitioning::partition;
/// let times = partition(4, 2, 2, 0, false).unwrap();
/// assert_eq!(times, vec![vec![0..2, 0..2], vec![0..2, 2..4]]);
/// ```
pub fn partition(
    nt: usize,
    npoint: usize,
    worker_count: usize,
    rank: usize,
    symmetric: bool,
) -> Result<TimeSets> {
    if worker_count == 0 {
        return Err(Error::Value("worker count must be positive".into()));
    }
    if rank >= worker_count {
        return Err(Error::Value(format!(
            "rank {rank} out of range for {worker_count} workers"
        )));
    }
    if npoint == 0 {
        return Err(Error::Value("diagram must have at least one leg".into()));
    }
    if worker_count > nt {
        return Err(Error::Value(format!(
            "cannot split {nt} time slices into {worker_count} blocks"
        )));
    }

    let blocks = time_blocks(nt, worker_count);
    let tuples = (0..npoint)
        .map(|_| 0..worker_count)
        .multi_cartesian_product()
        .filter(|tuple| !symmetric || tuple.windows(2).all(|w| w[0] <= w[1]))
        .collect_vec();

    let share = tuples.len().div_ceil(worker_count);
    let start = (rank * share).min(tuples.len());
    let end = ((rank + 1) * share).min(tuples.len());

    let mut sets = vec![Vec::with_capacity(end - start); npoint];
    for tuple in &tuples[start..end] {
        for (leg, &block) in tuple.iter().enumerate() {
            sets[leg].push(blocks[block].clone());
        }
    }

    debug!(rank, worker_count, npoint, symmetric, tuples = end - start; "Partitioned time blocks");
    Ok(sets)
}
