//! Random-walk traversal primitives.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::errors::{SamplerError, SamplerResult};
use crate::types::graph_query::GraphQuery;

/// Vertices visited by a restart walk from one seed, repeats included, restarts
/// concatenated. The seed itself is only recorded when a step lands on it.
pub type Trace = Vec<u64>;

/// The traversal primitives the pair sampler is built on.
///
/// Implementations must be deterministic given the state of `rng`, so a worker's
/// sample stream is reproducible from its seed.
pub trait Traversal {
    /// Walks exactly `hops` steps from `start` and returns the terminal vertex.
    ///
    /// # Returns
    /// * `SamplerError::Sampling` if `start` is not a vertex of `graph` or the walk
    ///   reaches a vertex without out-edges before the last hop
    fn random_walk<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        start: u64,
        hops: usize,
        rng: &mut R,
    ) -> SamplerResult<u64>;

    /// Runs a random walk with restart from every seed, one trace per seed.
    ///
    /// `restart_prob` is the chance of jumping back to the seed after each step,
    /// `max_nodes_per_seed` caps the number of recorded steps per seed.
    fn random_walk_with_restart<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        seeds: &[u64],
        restart_prob: f64,
        max_nodes_per_seed: usize,
        rng: &mut R,
    ) -> SamplerResult<Vec<Trace>>;
}

/// Uniform traversal: every step picks an out-neighbor uniformly at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformTraversal;

impl Traversal for UniformTraversal {
    fn random_walk<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        start: u64,
        hops: usize,
        rng: &mut R,
    ) -> SamplerResult<u64> {
        check_vertex(graph, start)?;
        let mut current = start;
        for hop in 0..hops {
            current = match graph.read_neighbor(current).choose(rng) {
                Some(&next) => next,
                None => {
                    return Err(SamplerError::Sampling(format!(
                        "walk from {start} stuck at {current} after {hop} of {hops} hops"
                    )))
                }
            };
        }
        Ok(current)
    }

    fn random_walk_with_restart<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        seeds: &[u64],
        restart_prob: f64,
        max_nodes_per_seed: usize,
        rng: &mut R,
    ) -> SamplerResult<Vec<Trace>> {
        let mut traces = Vec::with_capacity(seeds.len());
        for &seed in seeds {
            check_vertex(graph, seed)?;
            let mut trace = Trace::with_capacity(max_nodes_per_seed);

            // An isolated seed can never leave itself: its neighborhood is just the seed.
            if graph.out_degree(seed) == 0 {
                traces.push(trace);
                continue;
            }

            // Every restart records at least the first step away from the seed,
            // so the loop ends after at most `max_nodes_per_seed` restarts.
            'restarts: while trace.len() < max_nodes_per_seed {
                let mut current = seed;
                loop {
                    let Some(&next) = graph.read_neighbor(current).choose(rng) else {
                        break;
                    };
                    current = next;
                    trace.push(current);
                    if trace.len() >= max_nodes_per_seed {
                        break 'restarts;
                    }
                    if rng.gen::<f64>() < restart_prob {
                        break;
                    }
                }
            }
            traces.push(trace);
        }
        Ok(traces)
    }
}

fn check_vertex<G: GraphQuery>(graph: &G, vertex_id: u64) -> SamplerResult<()> {
    if graph.has_vertex(vertex_id) {
        Ok(())
    } else {
        Err(SamplerError::Sampling(format!(
            "vertex {vertex_id} is not in a graph of {} vertices",
            graph.vertex_count()
        )))
    }
}
