use rustc_hash::FxHashSet;

use crate::algorithms::positional::laplacian_positional_embedding;
use crate::errors::{SamplerError, SamplerResult};
use crate::types::graph_query::GraphQuery;
use crate::types::AnnotatedSubgraph;

/// Turns a restart-walk trace into an annotated subgraph.
pub trait SubgraphBuilder {
    /// Builds the subgraph around `seed` covering the vertices of `trace`.
    ///
    /// # Arguments
    /// * `graph` - The parent graph the trace was walked on
    /// * `seed` - The restart vertex; always part of the result
    /// * `trace` - Visited vertices, repeats allowed
    /// * `positional_embedding_size` - Width of the positional features, at least 2
    fn build<G: GraphQuery>(
        &self,
        graph: &G,
        seed: u64,
        trace: &[u64],
        positional_embedding_size: usize,
    ) -> SamplerResult<AnnotatedSubgraph>;
}

/// Induced-subgraph builder with spectral positional features.
///
/// The vertex set is the seed followed by the distinct trace vertices in ascending
/// order; edges are the parent edges among them.
#[derive(Debug, Clone, Copy, Default)]
pub struct InducedSubgraphBuilder;

impl SubgraphBuilder for InducedSubgraphBuilder {
    fn build<G: GraphQuery>(
        &self,
        graph: &G,
        seed: u64,
        trace: &[u64],
        positional_embedding_size: usize,
    ) -> SamplerResult<AnnotatedSubgraph> {
        if positional_embedding_size < 2 {
            return Err(SamplerError::Configuration(format!(
                "positional_embedding_size must be at least 2, got {positional_embedding_size}"
            )));
        }
        if !graph.has_vertex(seed) {
            return Err(SamplerError::Sampling(format!(
                "seed {seed} is not in a graph of {} vertices",
                graph.vertex_count()
            )));
        }

        let mut distinct: Vec<u64> = trace
            .iter()
            .copied()
            .filter(|&v| v != seed)
            .collect::<FxHashSet<u64>>()
            .into_iter()
            .collect();
        distinct.sort_unstable();

        let mut vertices = Vec::with_capacity(distinct.len() + 1);
        vertices.push(seed);
        vertices.extend(distinct);

        let mut subgraph = AnnotatedSubgraph::induced(graph, vertices);
        subgraph.positional_embedding =
            laplacian_positional_embedding(&subgraph, positional_embedding_size);
        Ok(subgraph)
    }
}
