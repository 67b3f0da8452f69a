//! The load-balanced pair dataset a training driver consumes.

use tracing::{info, warn};

use crate::algorithms::balance::{balance, balance_ratio, WorkerJobList};
use crate::config::SamplerConfig;
use crate::corpus_io::CorpusSource;
use crate::errors::{SamplerError, SamplerResult};
use crate::sampler::anchor::{AnchorSelection, AnchorStrategy};
use crate::sampler::{PairSampler, SamplePair};
use crate::types::AnnotatedSubgraph;
use crate::util::entropy_base_seed;
use crate::worker::seed::{RankSource, WorkerSeed};
use crate::worker::{Shard, WorkerContext};

/// A single-view sample with its class label.
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub subgraph: AnnotatedSubgraph,
    pub label: Option<u32>,
}

/// A corpus partitioned across workers, ready to stream sample pairs.
///
/// Built once by the driver from corpus metadata alone. Each worker then gets its
/// own [`WorkerContext`] through [`PairDataset::worker`], initializes it against
/// the corpus and samples from it without sharing any state with other workers.
pub struct PairDataset {
    config: SamplerConfig,
    base_seed: u64,
    jobs: Vec<WorkerJobList>,
    sampler: PairSampler,
    anchor_strategy: Box<dyn AnchorStrategy>,
    corpus_classes: Option<u32>,
}

impl PairDataset {
    /// Validates `config`, reads corpus metadata and balances it over the workers.
    ///
    /// # Returns
    /// * `SamplerError::Configuration` for invalid parameters
    /// * `SamplerError::CorpusLoad` if the metadata cannot be read
    pub fn new<S: CorpusSource + ?Sized>(config: SamplerConfig, source: &S) -> SamplerResult<Self> {
        config.validate()?;
        let sampler = PairSampler::new(config.sampler_params()?);
        let graph_sizes = source.load_corpus_metadata()?;
        let jobs = balance(&graph_sizes, config.num_workers, config.num_copies)?;
        let base_seed = config.base_seed.unwrap_or_else(entropy_base_seed);

        info!(
            dataset = %config.dataset,
            graphs = graph_sizes.len(),
            workers = config.num_workers,
            copies = config.num_copies,
            balance_ratio = balance_ratio(&jobs),
            base_seed,
            max_hops = sampler.params().step_policy().max_steps(),
            "Pair dataset partitioned."
        );
        Ok(Self {
            anchor_strategy: config.anchor.strategy(),
            corpus_classes: source.num_classes(),
            config,
            base_seed,
            jobs,
            sampler,
        })
    }

    /// Total samples drawn in one epoch, across all workers.
    pub fn len(&self) -> usize {
        self.config.num_samples * self.config.num_workers
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples drawn by each worker in one epoch.
    pub fn samples_per_worker(&self) -> usize {
        self.config.num_samples
    }

    pub fn jobs(&self) -> &[WorkerJobList] {
        &self.jobs
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn sampler(&self) -> &PairSampler {
        &self.sampler
    }

    pub fn anchor_strategy(&self) -> &dyn AnchorStrategy {
        self.anchor_strategy.as_ref()
    }

    /// Creates the (unloaded) context of worker `worker_id`.
    ///
    /// The rank is queried here, once, and fixed for the worker's lifetime.
    pub fn worker<R: RankSource + ?Sized>(
        &self,
        worker_id: usize,
        rank_source: &R,
    ) -> SamplerResult<WorkerContext> {
        let job_list = self.jobs.get(worker_id).cloned().ok_or_else(|| {
            SamplerError::Configuration(format!(
                "worker {worker_id} requested, only {} workers configured",
                self.jobs.len()
            ))
        })?;
        let seed = WorkerSeed::new(self.base_seed, worker_id as u64, rank_source);
        Ok(WorkerContext::new(worker_id, job_list, seed))
    }

    /// Streams this worker's share of the epoch: `samples_per_worker()` items.
    pub fn stream<'a>(&'a self, ctx: &'a mut WorkerContext) -> PairStream<'a> {
        PairStream {
            dataset: self,
            ctx,
            remaining: self.config.num_samples,
        }
    }

    /// Draws one anchor from the worker's shard and samples a pair around it.
    pub fn sample(&self, ctx: &mut WorkerContext) -> SamplerResult<SamplePair> {
        let (shard, rng) = ctx.split_mut()?;
        let anchor = self.anchor_strategy.select_anchor(shard, rng)?;
        self.sampler.sample(shard.graph(anchor.graph_index)?, anchor, rng)
    }

    /// Map-style access: samples a pair at the anchor addressed by `index`.
    ///
    /// The index space is the anchor strategy's: flat node indices for
    /// node-level sampling, graph indices for max-out-degree sampling.
    pub fn get(&self, ctx: &mut WorkerContext, index: u64) -> SamplerResult<SamplePair> {
        let (shard, rng) = ctx.split_mut()?;
        let anchor = self.anchor_strategy.anchor_at(shard, index)?;
        self.sampler.sample(shard.graph(anchor.graph_index)?, anchor, rng)
    }

    /// Map-style access to a single labeled view.
    pub fn labeled(&self, ctx: &mut WorkerContext, index: u64) -> SamplerResult<LabeledSample> {
        let (shard, rng) = ctx.split_mut()?;
        let anchor = self.anchor_strategy.anchor_at(shard, index)?;
        let subgraph = self
            .sampler
            .sample_single(shard.graph(anchor.graph_index)?, anchor, rng)?;
        Ok(LabeledSample {
            subgraph,
            label: self.anchor_strategy.label(shard, &anchor),
        })
    }

    /// Size of the map-style index space of an initialized worker.
    pub fn index_len(&self, ctx: &WorkerContext) -> SamplerResult<u64> {
        Ok(self.anchor_strategy.len(ctx.shard()?))
    }

    /// Number of label classes of the labeled views.
    ///
    /// Graph labels come from the whole corpus. Vertex labels are read from the
    /// worker's shard and are only known when every shard graph carries them.
    pub fn num_classes(&self, ctx: &WorkerContext) -> SamplerResult<Option<u32>> {
        Ok(match self.config.anchor {
            AnchorSelection::MaxOutDegree => self.corpus_classes,
            AnchorSelection::NodeLevelRandom => vertex_classes(ctx.shard()?),
        })
    }
}

fn vertex_classes(shard: &Shard) -> Option<u32> {
    let mut max_label: Option<u32> = None;
    for graph in &shard.graphs {
        let labels = graph.vertex_labels.as_ref()?;
        max_label = max_label.max(labels.iter().copied().max());
    }
    max_label.map(|max| max + 1)
}

/// This worker's sample stream for one epoch.
///
/// A sampling failure is retried once with a fresh anchor; a second failure is
/// yielded as the item's error and the stream continues. A fatal error ends the
/// stream after it is yielded.
pub struct PairStream<'a> {
    dataset: &'a PairDataset,
    ctx: &'a mut WorkerContext,
    remaining: usize,
}

impl Iterator for PairStream<'_> {
    type Item = SamplerResult<SamplePair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let item = match self.dataset.sample(self.ctx) {
            Err(err) if err.is_retryable() => {
                warn!(worker = self.ctx.worker_id(), error = %err, "Retrying sample with a fresh anchor.");
                self.dataset.sample(self.ctx)
            }
            other => other,
        };
        if let Err(err) = &item {
            if err.is_fatal() {
                self.remaining = 0;
            }
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod test_dataset {
    use super::*;
    use crate::corpus_io::InMemoryCorpus;
    use crate::types::graph_query::GraphQuery;
    use crate::types::CSRGraph;

    fn ring(n: u64) -> CSRGraph {
        let edges: Vec<(u64, u64)> = (0..n).map(|v| (v, (v + 1) % n)).collect();
        CSRGraph::from_edges(n, &edges).unwrap().symmetrized()
    }

    fn corpus() -> InMemoryCorpus {
        let sizes = [100u64, 80, 80, 50, 40, 10];
        InMemoryCorpus::with_labels(sizes.iter().map(|&n| ring(n)).collect(), vec![0, 1, 0, 1, 2, 0])
            .unwrap()
    }

    fn config() -> SamplerConfig {
        SamplerConfig {
            dataset: String::from("rings"),
            num_workers: 6,
            num_copies: 2,
            num_samples: 25,
            base_seed: Some(2024),
            rw_hops: 16,
            positional_embedding_size: 4,
            step_dist: vec![0.5, 0.3, 0.2],
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn test_partition_and_length() {
        let dataset = PairDataset::new(config(), &corpus()).unwrap();
        assert_eq!(dataset.len(), 150);
        assert_eq!(dataset.samples_per_worker(), 25);
        let loads: Vec<u64> = dataset.jobs().iter().map(|job| job.workload).collect();
        assert_eq!(loads, vec![110, 130, 120, 110, 130, 120]);
        assert_eq!(dataset.jobs()[1], dataset.jobs()[4]);
    }

    #[test]
    fn test_worker_stream_yields_valid_pairs() {
        let source = corpus();
        let dataset = PairDataset::new(config(), &source).unwrap();
        let mut ctx = dataset.worker(1, &Some(0)).unwrap();
        ctx.initialize(&source).unwrap();
        let pairs: Vec<SamplePair> = dataset.stream(&mut ctx).map(|pair| pair.unwrap()).collect();
        assert_eq!(pairs.len(), 25);
        for pair in &pairs {
            // Worker 1 holds corpus graphs 1 and 3 (80 and 50 nodes).
            assert!(pair.graph_index < 2);
            assert_eq!(pair.query.seed_vertex(), pair.anchor);
            assert_eq!(pair.key.seed_vertex(), pair.context);
            assert!(pair.query.vertex_count() <= 17);
        }
    }

    #[test]
    fn test_replicas_diverge_only_through_seeds() {
        let source = corpus();
        let dataset = PairDataset::new(config(), &source).unwrap();
        let anchors = |worker_id: usize, rank: u32| {
            let mut ctx = dataset.worker(worker_id, &Some(rank)).unwrap();
            ctx.initialize(&source).unwrap();
            dataset
                .stream(&mut ctx)
                .map(|pair| pair.unwrap().anchor)
                .collect::<Vec<u64>>()
        };
        assert_eq!(anchors(0, 0), anchors(0, 0));
        assert_ne!(anchors(0, 0), anchors(3, 0));
        assert_ne!(anchors(0, 0), anchors(0, 1));
    }

    #[test]
    fn test_uninitialized_worker_stream_stops_on_fatal_error() {
        let dataset = PairDataset::new(config(), &corpus()).unwrap();
        let mut ctx = dataset.worker(0, &None).unwrap();
        let items: Vec<_> = dataset.stream(&mut ctx).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SamplerError::Configuration(_))));
    }

    #[test]
    fn test_stream_continues_past_sampling_failures() {
        // Anchors 0 and 1 walk into the sink within two hops; only 2 survives.
        let path = CSRGraph::from_edges(3, &[(0, 1), (1, 2)]).unwrap();
        let source = InMemoryCorpus::new(vec![path]);
        let config = SamplerConfig {
            num_workers: 1,
            num_copies: 1,
            num_samples: 200,
            step_dist: vec![0.0, 0.0, 1.0],
            ..config()
        };
        let dataset = PairDataset::new(config, &source).unwrap();
        assert_eq!(dataset.sampler().params().step_policy().max_steps(), 2);
        let mut ctx = dataset.worker(0, &Some(0)).unwrap();
        ctx.initialize(&source).unwrap();

        let items: Vec<_> = dataset.stream(&mut ctx).collect();
        assert_eq!(items.len(), 200);
        let first_failure = items
            .iter()
            .position(|item| matches!(item, Err(SamplerError::Sampling(_))))
            .unwrap();
        assert!(items[first_failure + 1..].iter().any(|item| item.is_ok()));
        assert!(items.iter().all(|item| !matches!(item, Err(err) if err.is_fatal())));
    }

    #[test]
    fn test_unknown_worker_is_configuration_error() {
        let dataset = PairDataset::new(config(), &corpus()).unwrap();
        assert!(matches!(
            dataset.worker(6, &None),
            Err(SamplerError::Configuration(_))
        ));
    }

    #[test]
    fn test_graph_level_labeled_views() {
        let source = corpus();
        let config = SamplerConfig {
            anchor: AnchorSelection::MaxOutDegree,
            ..config()
        };
        let dataset = PairDataset::new(config, &source).unwrap();
        let mut ctx = dataset.worker(2, &None).unwrap();
        ctx.initialize(&source).unwrap();
        // Worker 2 holds corpus graphs 2 and 4.
        assert_eq!(dataset.index_len(&ctx).unwrap(), 2);
        assert_eq!(dataset.num_classes(&ctx).unwrap(), Some(3));
        let sample = dataset.labeled(&mut ctx, 1).unwrap();
        assert_eq!(sample.label, Some(2));
        assert_eq!(sample.subgraph.seed_vertex(), 0);
        assert!(matches!(
            dataset.labeled(&mut ctx, 2),
            Err(SamplerError::Index { .. })
        ));
    }

    #[test]
    fn test_node_level_map_access() {
        let labeled = ring(4).with_vertex_labels(vec![0, 3, 1, 1]).unwrap();
        let source = InMemoryCorpus::new(vec![ring(3).with_vertex_labels(vec![2, 2, 0]).unwrap(), labeled]);
        let config = SamplerConfig {
            num_workers: 1,
            num_copies: 1,
            ..config()
        };
        let dataset = PairDataset::new(config, &source).unwrap();
        let mut ctx = dataset.worker(0, &None).unwrap();
        ctx.initialize(&source).unwrap();
        assert_eq!(dataset.index_len(&ctx).unwrap(), 7);
        assert_eq!(dataset.num_classes(&ctx).unwrap(), Some(4));
        // The 4-ring sorts first: flat index 1 is its vertex 1.
        let sample = dataset.labeled(&mut ctx, 1).unwrap();
        assert_eq!(sample.label, Some(3));
        let pair = dataset.get(&mut ctx, 6).unwrap();
        assert_eq!((pair.graph_index, pair.anchor), (1, 2));
        assert!(matches!(dataset.get(&mut ctx, 7), Err(SamplerError::Index { .. })));
    }
}
