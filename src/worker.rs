//! Worker-side state: the loaded shard, its flat index and the worker RNG.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::algorithms::balance::WorkerJobList;
use crate::corpus_io::CorpusSource;
use crate::errors::{SamplerError, SamplerResult};
use crate::types::CSRGraph;
use crate::worker::flat_index::FlatIndex;
use crate::worker::seed::WorkerSeed;

pub mod flat_index;
pub mod seed;

/// The random generator owned by one worker.
pub type WorkerRng = ChaCha8Rng;

/// The graphs a worker loaded, in job-list order.
///
/// # Fields
/// * `graph_ids` - Corpus ids of the graphs
/// * `graphs` - The graphs, `graphs[i]` has id `graph_ids[i]`
/// * `graph_labels` - Graph-level labels, `None` when the corpus is unlabeled
/// * `flat_index` - Node-level index space over `graphs`
#[derive(Debug, Clone, Default)]
pub struct Shard {
    pub graph_ids: Vec<u64>,
    pub graphs: Vec<CSRGraph>,
    pub graph_labels: Vec<Option<u32>>,
    pub flat_index: FlatIndex,
}

impl Shard {
    pub fn new(graph_ids: Vec<u64>, graphs: Vec<CSRGraph>, graph_labels: Vec<Option<u32>>) -> Self {
        let node_counts: Vec<u64> = graphs.iter().map(|graph| graph.vertex_count).collect();
        Self {
            graph_ids,
            graphs,
            graph_labels,
            flat_index: FlatIndex::new(&node_counts),
        }
    }

    pub fn total_nodes(&self) -> u64 {
        self.flat_index.total_nodes()
    }

    pub fn graph(&self, graph_index: usize) -> SamplerResult<&CSRGraph> {
        self.graphs.get(graph_index).ok_or(SamplerError::Index {
            index: graph_index as u64,
            total: self.graphs.len() as u64,
        })
    }

    pub fn graph_label(&self, graph_index: usize) -> Option<u32> {
        self.graph_labels.get(graph_index).copied().flatten()
    }
}

/// Everything one worker owns: its job list, seed inputs, shard and RNG.
///
/// Created unloaded; [`WorkerContext::initialize`] must run once before sampling.
#[derive(Debug)]
pub struct WorkerContext {
    worker_id: usize,
    job_list: WorkerJobList,
    seed: WorkerSeed,
    loaded: bool,
    shard: Shard,
    rng: Option<WorkerRng>,
}

impl WorkerContext {
    pub fn new(worker_id: usize, job_list: WorkerJobList, seed: WorkerSeed) -> Self {
        Self {
            worker_id,
            job_list,
            seed,
            loaded: false,
            shard: Shard::default(),
            rng: None,
        }
    }

    /// Loads the job list's graphs and seeds the worker RNG.
    ///
    /// A second call is a no-op. On failure the context stays unloaded.
    ///
    /// # Returns
    /// * `SamplerError::CorpusLoad` if the source cannot deliver the shard
    pub fn initialize<S: CorpusSource + ?Sized>(&mut self, source: &S) -> SamplerResult<()> {
        if self.loaded {
            debug!(worker = self.worker_id, "Worker already initialized.");
            return Ok(());
        }

        // Step 1: Materialize exactly the assigned graphs.
        let graph_ids = self.job_list.graph_ids.clone();
        let graphs = source.load_graph_shard(&graph_ids)?;
        if graphs.len() != graph_ids.len() {
            return Err(SamplerError::CorpusLoad(format!(
                "worker {} asked for {} graphs, received {}",
                self.worker_id,
                graph_ids.len(),
                graphs.len()
            )));
        }
        let graph_labels = source.graph_labels(&graph_ids)?;
        let shard = Shard::new(graph_ids, graphs, graph_labels);

        // Step 2: Seed the RNG right after loading, before any draw.
        let seed = self.seed.derive();
        self.rng = Some(WorkerRng::seed_from_u64(seed as u64));
        info!(
            worker = self.worker_id,
            rank = self.seed.rank,
            graphs = shard.graphs.len(),
            nodes = shard.total_nodes(),
            seed,
            "Worker initialized."
        );
        self.shard = shard;
        self.loaded = true;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn job_list(&self) -> &WorkerJobList {
        &self.job_list
    }

    pub fn seed(&self) -> &WorkerSeed {
        &self.seed
    }

    pub fn total_nodes(&self) -> u64 {
        self.shard.total_nodes()
    }

    /// The loaded shard.
    ///
    /// # Returns
    /// * `SamplerError::Configuration` if the worker was never initialized
    pub fn shard(&self) -> SamplerResult<&Shard> {
        if self.loaded {
            Ok(&self.shard)
        } else {
            Err(self.uninitialized())
        }
    }

    fn uninitialized(&self) -> SamplerError {
        SamplerError::Configuration(format!(
            "worker {} sampled before initialize()",
            self.worker_id
        ))
    }

    /// Borrows the shard and the RNG together for one sampling request.
    ///
    /// # Returns
    /// * `SamplerError::Configuration` if the worker was never initialized
    pub fn split_mut(&mut self) -> SamplerResult<(&Shard, &mut WorkerRng)> {
        if !self.loaded {
            return Err(self.uninitialized());
        }
        match self.rng.as_mut() {
            Some(rng) => Ok((&self.shard, rng)),
            None => Err(SamplerError::Configuration(format!(
                "worker {} has no seeded generator",
                self.worker_id
            ))),
        }
    }
}
