//! The stochastic pair sampler: anchor, context, and a restart-walk subgraph
//! around each.

use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::algorithms::subgraph::{InducedSubgraphBuilder, SubgraphBuilder};
use crate::algorithms::walk::{Trace, Traversal, UniformTraversal};
use crate::errors::{SamplerError, SamplerResult};
use crate::sampler::anchor::Anchor;
use crate::sampler::step_policy::StepPolicy;
use crate::types::graph_query::GraphQuery;
use crate::types::AnnotatedSubgraph;

pub mod anchor;
pub mod step_policy;

/// Validated sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams {
    step_policy: StepPolicy,
    restart_prob: f64,
    max_nodes_per_seed: usize,
    positional_embedding_size: usize,
}

impl SamplerParams {
    /// # Returns
    /// * `SamplerError::Configuration` unless `restart_prob` is in `(0, 1]`,
    ///   `max_nodes_per_seed >= 1` and `positional_embedding_size >= 2`
    pub fn new(
        step_policy: StepPolicy,
        restart_prob: f64,
        max_nodes_per_seed: usize,
        positional_embedding_size: usize,
    ) -> SamplerResult<Self> {
        if !(restart_prob > 0.0 && restart_prob <= 1.0) {
            return Err(SamplerError::Configuration(format!(
                "restart_prob must be in (0, 1], got {restart_prob}"
            )));
        }
        if max_nodes_per_seed == 0 {
            return Err(SamplerError::Configuration(
                "rw_hops (max nodes per seed) must be at least 1".into(),
            ));
        }
        if positional_embedding_size < 2 {
            return Err(SamplerError::Configuration(format!(
                "positional_embedding_size must be at least 2, got {positional_embedding_size}"
            )));
        }
        Ok(Self {
            step_policy,
            restart_prob,
            max_nodes_per_seed,
            positional_embedding_size,
        })
    }

    pub fn step_policy(&self) -> &StepPolicy {
        &self.step_policy
    }

    pub fn restart_prob(&self) -> f64 {
        self.restart_prob
    }

    pub fn max_nodes_per_seed(&self) -> usize {
        self.max_nodes_per_seed
    }

    pub fn positional_embedding_size(&self) -> usize {
        self.positional_embedding_size
    }
}

/// One positive training pair.
///
/// `query` is grown around `anchor`, `key` around `context`; both vertices are
/// ids of shard graph `graph_index`.
#[derive(Debug, Clone)]
pub struct SamplePair {
    pub query: AnnotatedSubgraph,
    pub key: AnnotatedSubgraph,
    pub graph_index: usize,
    pub anchor: u64,
    pub context: u64,
}

/// Hook applied to every subgraph after it is built.
pub type GraphTransform = Arc<dyn Fn(&mut AnnotatedSubgraph) + Send + Sync>;

/// Draws pairs of subgraphs around an anchor and a nearby context vertex.
pub struct PairSampler<T = UniformTraversal, B = InducedSubgraphBuilder> {
    params: SamplerParams,
    traversal: T,
    builder: B,
    transform: Option<GraphTransform>,
}

impl PairSampler {
    pub fn new(params: SamplerParams) -> Self {
        Self::with_collaborators(params, UniformTraversal, InducedSubgraphBuilder)
    }
}

impl<T: Traversal, B: SubgraphBuilder> PairSampler<T, B> {
    pub fn with_collaborators(params: SamplerParams, traversal: T, builder: B) -> Self {
        Self {
            params,
            traversal,
            builder,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: GraphTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn params(&self) -> &SamplerParams {
        &self.params
    }

    /// Samples a pair around `anchor`.
    ///
    /// Step 1 draws a hop count and walks that far from the anchor to find the
    /// context; zero hops, or an anchor without out-edges, make the context the
    /// anchor itself. Step 2 grows a restart-walk subgraph around each.
    ///
    /// # Returns
    /// * `SamplerError::Sampling` if the context walk dead-ends or the anchor is
    ///   not a vertex of `graph`
    pub fn sample<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        anchor: Anchor,
        rng: &mut R,
    ) -> SamplerResult<SamplePair> {
        // Step 1: Context vertex.
        let step = self.params.step_policy.draw(rng);
        let context = if step == 0 || graph.out_degree(anchor.vertex) == 0 {
            anchor.vertex
        } else {
            self.traversal.random_walk(graph, anchor.vertex, step, rng)?
        };

        // Step 2: One restart walk per side, drawn in a single call.
        let traces = self.traversal.random_walk_with_restart(
            graph,
            &[anchor.vertex, context],
            self.params.restart_prob,
            self.params.max_nodes_per_seed,
            rng,
        )?;
        let [query_trace, key_trace]: [Trace; 2] = traces.try_into().map_err(|traces: Vec<Trace>| {
            SamplerError::Sampling(format!("expected 2 restart traces, got {}", traces.len()))
        })?;

        let query = self.build_view(graph, anchor.vertex, &query_trace)?;
        let key = self.build_view(graph, context, &key_trace)?;
        trace!(
            graph_index = anchor.graph_index,
            anchor = anchor.vertex,
            context,
            step,
            query_nodes = query.vertex_count(),
            key_nodes = key.vertex_count(),
            "Pair sampled."
        );
        Ok(SamplePair {
            query,
            key,
            graph_index: anchor.graph_index,
            anchor: anchor.vertex,
            context,
        })
    }

    /// Grows a single restart-walk subgraph around `anchor`.
    pub fn sample_single<G: GraphQuery, R: Rng>(
        &self,
        graph: &G,
        anchor: Anchor,
        rng: &mut R,
    ) -> SamplerResult<AnnotatedSubgraph> {
        let traces = self.traversal.random_walk_with_restart(
            graph,
            &[anchor.vertex],
            self.params.restart_prob,
            self.params.max_nodes_per_seed,
            rng,
        )?;
        let trace = traces.into_iter().next().unwrap_or_default();
        self.build_view(graph, anchor.vertex, &trace)
    }

    fn build_view<G: GraphQuery>(
        &self,
        graph: &G,
        seed: u64,
        trace: &[u64],
    ) -> SamplerResult<AnnotatedSubgraph> {
        let mut subgraph =
            self.builder
                .build(graph, seed, trace, self.params.positional_embedding_size)?;
        if let Some(transform) = &self.transform {
            transform(&mut subgraph);
        }
        Ok(subgraph)
    }
}

#[cfg(test)]
mod test_sampler {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::types::CSRGraph;

    fn params(step_dist: Vec<f64>, max_nodes: usize) -> SamplerParams {
        SamplerParams::new(StepPolicy::new(step_dist).unwrap(), 0.8, max_nodes, 4).unwrap()
    }

    fn anchor(vertex: u64) -> Anchor {
        Anchor {
            graph_index: 0,
            vertex,
        }
    }

    fn cycle_with_chords() -> CSRGraph {
        let mut edges: Vec<(u64, u64)> = (0..8).map(|v| (v, (v + 1) % 8)).collect();
        edges.extend([(0, 4), (2, 6), (1, 5)]);
        CSRGraph::from_edges(8, &edges).unwrap().symmetrized()
    }

    #[test]
    fn test_params_validation() {
        let policy = || StepPolicy::new(vec![1.0]).unwrap();
        assert!(SamplerParams::new(policy(), 1.0, 1, 2).is_ok());
        for (restart_prob, max_nodes, size) in [(0.0, 8, 4), (1.5, 8, 4), (0.5, 0, 4), (0.5, 8, 1)] {
            assert!(matches!(
                SamplerParams::new(policy(), restart_prob, max_nodes, size),
                Err(SamplerError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_single_node_graph_yields_single_node_views() {
        let graph = CSRGraph::from_edges(1, &[]).unwrap();
        let sampler = PairSampler::new(params(vec![0.2, 0.4, 0.4], 64));
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..20 {
            let pair = sampler.sample(&graph, anchor(0), &mut rng).unwrap();
            assert_eq!(pair.context, 0);
            assert_eq!(pair.query.vertex_count(), 1);
            assert_eq!(pair.key.vertex_count(), 1);
        }
    }

    #[test]
    fn test_zero_hop_policy_pairs_anchor_with_itself() {
        let graph = cycle_with_chords();
        let sampler = PairSampler::new(params(vec![1.0, 0.0, 0.0], 16));
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for vertex in 0..8 {
            let pair = sampler.sample(&graph, anchor(vertex), &mut rng).unwrap();
            assert_eq!(pair.context, pair.anchor);
            assert_eq!(pair.query.seed_vertex(), vertex);
            assert_eq!(pair.key.seed_vertex(), vertex);
        }
    }

    #[test]
    fn test_context_lies_at_walked_distance() {
        let graph = cycle_with_chords();
        let sampler = PairSampler::new(params(vec![0.0, 1.0], 16));
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..50 {
            let pair = sampler.sample(&graph, anchor(3), &mut rng).unwrap();
            assert!(graph.has_edge(3, pair.context));
            assert_eq!(pair.key.seed_vertex(), pair.context);
            for view in [&pair.query, &pair.key] {
                assert!(view.vertex_count() <= 17);
                assert_eq!(view.positional_embedding.len() as u64, view.vertex_count());
            }
        }
    }

    #[test]
    fn test_max_nodes_one_bounds_views() {
        let graph = cycle_with_chords();
        let sampler = PairSampler::new(params(vec![0.5, 0.5], 1));
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        for _ in 0..20 {
            let pair = sampler.sample(&graph, anchor(0), &mut rng).unwrap();
            assert!(pair.query.vertex_count() <= 2);
            assert!(pair.key.vertex_count() <= 2);
        }
    }

    #[test]
    fn test_isolated_anchor_falls_back_to_self_pair() {
        let graph = CSRGraph::from_edges(3, &[(0, 1), (1, 0)]).unwrap();
        let sampler = PairSampler::new(params(vec![0.0, 0.0, 1.0], 8));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let pair = sampler.sample(&graph, anchor(2), &mut rng).unwrap();
        assert_eq!(pair.context, 2);
        assert_eq!(pair.query.vertex_mapper, vec![2]);
    }

    #[test]
    fn test_dead_end_walk_is_sampling_error() {
        let graph = CSRGraph::from_edges(3, &[(0, 1), (1, 2)]).unwrap();
        let sampler = PairSampler::new(params(vec![0.0, 0.0, 0.0, 1.0], 8));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = sampler.sample(&graph, anchor(0), &mut rng).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sample_single_and_transform() {
        let graph = cycle_with_chords();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sampler = PairSampler::new(params(vec![1.0], 8)).with_transform(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let view = sampler.sample_single(&graph, anchor(5), &mut rng).unwrap();
        assert_eq!(view.seed_vertex(), 5);
        sampler.sample(&graph, anchor(5), &mut rng).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_same_rng_state_same_pair() {
        let graph = cycle_with_chords();
        let sampler = PairSampler::new(params(vec![0.3, 0.4, 0.3], 12));
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(77);
            let pair = sampler.sample(&graph, anchor(1), &mut rng).unwrap();
            (pair.context, pair.query.vertex_mapper, pair.key.vertex_mapper)
        };
        assert_eq!(run(), run());
    }
}
