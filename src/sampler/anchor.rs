use std::fmt::Debug;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{SamplerError, SamplerResult};
use crate::worker::{Shard, WorkerRng};

/// A vertex of one shard graph, the starting point of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub graph_index: usize,
    pub vertex: u64,
}

/// How anchors are picked from a worker shard.
///
/// A strategy defines an index space over the shard. Map-style access addresses
/// it directly through [`AnchorStrategy::anchor_at`]; streaming draws uniformly
/// from it.
pub trait AnchorStrategy: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Size of the index space over `shard`.
    fn len(&self, shard: &Shard) -> u64;

    fn is_empty(&self, shard: &Shard) -> bool {
        self.len(shard) == 0
    }

    /// Anchor addressed by `index`, which must be below [`AnchorStrategy::len`].
    fn anchor_at(&self, shard: &Shard, index: u64) -> SamplerResult<Anchor>;

    /// Draws a uniform index and resolves it.
    ///
    /// # Returns
    /// * `SamplerError::Configuration` if the index space is empty
    fn select_anchor(&self, shard: &Shard, rng: &mut WorkerRng) -> SamplerResult<Anchor> {
        let len = self.len(shard);
        if len == 0 {
            return Err(SamplerError::Configuration(format!(
                "{} anchor selection over a shard with no candidates",
                self.name()
            )));
        }
        self.anchor_at(shard, rng.gen_range(0..len))
    }

    /// Training label attached to samples drawn at `anchor`.
    fn label(&self, shard: &Shard, anchor: &Anchor) -> Option<u32>;
}

/// Every vertex of the shard is equally likely; indices are flat node indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeLevelRandom;

impl AnchorStrategy for NodeLevelRandom {
    fn name(&self) -> &'static str {
        "node_level_random"
    }

    fn len(&self, shard: &Shard) -> u64 {
        shard.total_nodes()
    }

    fn anchor_at(&self, shard: &Shard, index: u64) -> SamplerResult<Anchor> {
        let (graph_index, vertex) = shard.flat_index.resolve(index)?;
        Ok(Anchor {
            graph_index,
            vertex,
        })
    }

    fn label(&self, shard: &Shard, anchor: &Anchor) -> Option<u32> {
        shard
            .graphs
            .get(anchor.graph_index)
            .and_then(|graph| graph.vertex_label(anchor.vertex))
    }
}

/// One anchor per graph: its vertex of largest out-degree, first on ties.
/// Indices are graph indices and labels are graph labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxOutDegree;

impl AnchorStrategy for MaxOutDegree {
    fn name(&self) -> &'static str {
        "max_out_degree"
    }

    fn len(&self, shard: &Shard) -> u64 {
        shard.graphs.len() as u64
    }

    fn anchor_at(&self, shard: &Shard, index: u64) -> SamplerResult<Anchor> {
        let graph_index = index as usize;
        let vertex = shard.graph(graph_index)?.max_out_degree_vertex().ok_or_else(|| {
            SamplerError::Sampling(format!(
                "graph {} of the shard has no vertices",
                shard.graph_ids.get(graph_index).copied().unwrap_or(index)
            ))
        })?;
        Ok(Anchor {
            graph_index,
            vertex,
        })
    }

    fn label(&self, shard: &Shard, anchor: &Anchor) -> Option<u32> {
        shard.graph_label(anchor.graph_index)
    }
}

/// Configuration-level choice of anchor strategy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSelection {
    #[default]
    NodeLevelRandom,
    MaxOutDegree,
}

impl AnchorSelection {
    pub fn strategy(&self) -> Box<dyn AnchorStrategy> {
        match self {
            AnchorSelection::NodeLevelRandom => Box::new(NodeLevelRandom),
            AnchorSelection::MaxOutDegree => Box::new(MaxOutDegree),
        }
    }
}
