use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus_io::corpus_idx::GraphDescriptor;
use crate::errors::{SamplerError, SamplerResult};

/// The graphs assigned to one worker group, in assignment order.
///
/// # Fields
/// * `graph_ids` - Corpus ids of the assigned graphs, largest first
/// * `workload` - Sum of the node counts of the assigned graphs
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerJobList {
    pub graph_ids: Vec<u64>,
    pub workload: u64,
}

/// Partitions the corpus across worker groups with greedy longest-processing-time-first.
///
/// Graphs are visited from largest to smallest (ties keep input order) and each one
/// goes to the group with the smallest accumulated node count, the lowest group index
/// winning ties. The `worker_groups / copies` distinct job lists are then repeated
/// `copies` times, so group `k` and group `k + worker_groups / copies` receive the same
/// graphs. Every distributed rank computes the identical assignment without talking to
/// the others.
///
/// # Arguments
/// * `graph_sizes` - One descriptor per corpus graph
/// * `worker_groups` - Total number of worker groups, across all copies
/// * `copies` - Number of replicas of the distinct partition
///
/// # Returns
/// * `worker_groups` job lists
/// * `SamplerError::Configuration` if `worker_groups` is zero or not divisible by `copies`
pub fn balance(
    graph_sizes: &[GraphDescriptor],
    worker_groups: usize,
    copies: usize,
) -> SamplerResult<Vec<WorkerJobList>> {
    if worker_groups == 0 {
        return Err(SamplerError::Configuration(
            "worker_groups must be positive".into(),
        ));
    }
    if copies == 0 || worker_groups % copies != 0 {
        return Err(SamplerError::Configuration(format!(
            "worker_groups ({worker_groups}) must be divisible by copies ({copies})"
        )));
    }
    let distinct_groups = worker_groups / copies;

    // Stable sort keeps the input order among equally sized graphs.
    let mut sorted = graph_sizes.to_vec();
    sorted.sort_by(|a, b| b.node_count.cmp(&a.node_count));

    // Min-heap over (load, group index) pops the least loaded, lowest indexed group.
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> =
        (0..distinct_groups).map(|group| Reverse((0u64, group))).collect();
    let mut jobs = vec![WorkerJobList::default(); distinct_groups];

    for descriptor in &sorted {
        let Some(Reverse((load, group))) = heap.pop() else {
            break;
        };
        jobs[group].graph_ids.push(descriptor.id);
        jobs[group].workload = load + descriptor.node_count;
        heap.push(Reverse((jobs[group].workload, group)));
    }

    debug!(
        graphs = graph_sizes.len(),
        distinct_groups,
        copies,
        ratio = balance_ratio(&jobs),
        "Corpus partitioned."
    );

    let mut replicated = Vec::with_capacity(worker_groups);
    for _ in 0..copies {
        replicated.extend(jobs.iter().cloned());
    }
    Ok(replicated)
}

/// Ratio of the heaviest group's load to the mean load.
///
/// 1.0 means a perfect balance. Returns 1.0 for an empty assignment or an empty corpus.
pub fn balance_ratio(jobs: &[WorkerJobList]) -> f64 {
    let total: u64 = jobs.iter().map(|job| job.workload).sum();
    if jobs.is_empty() || total == 0 {
        return 1.0;
    }
    let max = jobs.iter().map(|job| job.workload).max().unwrap_or(0);
    let mean = total as f64 / jobs.len() as f64;
    max as f64 / mean
}
