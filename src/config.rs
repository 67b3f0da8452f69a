use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{SamplerError, SamplerResult};
use crate::sampler::anchor::AnchorSelection;
use crate::sampler::step_policy::StepPolicy;
use crate::sampler::SamplerParams;

/// Buffer size used when reading `.graph` text files.
pub const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Largest vertex count accepted for a single corpus graph.
pub const MAX_GRAPH_VERTICES: u64 = 1 << 32;

/// Default directory holding corpus index and storage files.
pub const CORPUS_WORKSPACE: &str = "pairwalk.db";

/// Allowed deviation of a step distribution's sum from 1.0.
pub const STEP_POLICY_TOLERANCE: f64 = 1e-6;

/// Jacobi sweeps stop once the off-diagonal Frobenius norm drops below this.
pub const EIGEN_TOLERANCE: f64 = 1e-10;

/// Upper bound on Jacobi sweeps for one positional embedding.
pub const EIGEN_MAX_SWEEPS: usize = 64;

/// Environment variable queried for the distributed rank.
pub const RANK_ENV_VAR: &str = "RANK";

/// Distance between the base seeds of consecutive workers.
pub const WORKER_SEED_STRIDE: u64 = 1 << 16;

/// Everything a training driver sets to build a pair dataset.
///
/// Loaded from YAML; every field has a default, so a config file only needs the
/// keys it changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Corpus name, the prefix of the index and storage files.
    pub dataset: String,

    /// Directory containing the corpus files.
    pub workspace: String,

    /// Maximum number of visited nodes per restart walk seed.
    pub rw_hops: usize,

    /// Probability of jumping back to the seed after each restart-walk step.
    pub restart_prob: f64,

    /// Width of the positional features attached to every subgraph vertex.
    pub positional_embedding_size: usize,

    /// Probability of each hop count between anchor and context, starting at 0.
    pub step_dist: Vec<f64>,

    /// Number of worker groups across all copies.
    pub num_workers: usize,

    /// Number of identical replicas of the balanced partition.
    pub num_copies: usize,

    /// Samples drawn by each worker per epoch.
    pub num_samples: usize,

    /// Base seed of the run. Drawn from the clock when absent.
    pub base_seed: Option<u64>,

    /// How anchors are chosen from a shard.
    pub anchor: AnchorSelection,

    /// Add reverse edges when building a corpus from `.graph` files.
    pub symmetrize: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            dataset: String::from("corpus"),
            workspace: String::from(CORPUS_WORKSPACE),
            rw_hops: 64,
            restart_prob: 0.8,
            positional_embedding_size: 32,
            step_dist: vec![1.0, 0.0, 0.0],
            num_workers: 1,
            num_copies: 1,
            num_samples: 10000,
            base_seed: None,
            anchor: AnchorSelection::NodeLevelRandom,
            symmetrize: true,
        }
    }
}

impl SamplerConfig {
    pub fn from_yaml_str(yaml: &str) -> SamplerResult<Self> {
        let config: SamplerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SamplerResult<Self> {
        let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
            SamplerError::Configuration(format!(
                "cannot read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks every static parameter; fails with `SamplerError::Configuration`.
    pub fn validate(&self) -> SamplerResult<()> {
        if self.dataset.is_empty() {
            return Err(SamplerError::Configuration("dataset name is empty".into()));
        }
        if self.num_workers == 0 {
            return Err(SamplerError::Configuration("num_workers must be positive".into()));
        }
        if self.num_copies == 0 || self.num_workers % self.num_copies != 0 {
            return Err(SamplerError::Configuration(format!(
                "num_workers ({}) must be divisible by num_copies ({})",
                self.num_workers, self.num_copies
            )));
        }
        self.sampler_params().map(|_| ())
    }

    pub fn sampler_params(&self) -> SamplerResult<SamplerParams> {
        SamplerParams::new(
            StepPolicy::new(self.step_dist.clone())?,
            self.restart_prob,
            self.rw_hops,
            self.positional_embedding_size,
        )
    }
}

#[cfg(test)]
mod test_config {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SamplerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rw_hops, 64);
        assert_eq!(config.step_dist, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let config = SamplerConfig::from_yaml_str(
            "dataset: social\nnum_workers: 4\nnum_copies: 2\nbase_seed: 7\nanchor: max_out_degree\n",
        )
        .unwrap();
        assert_eq!(config.dataset, "social");
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.base_seed, Some(7));
        assert_eq!(config.anchor, AnchorSelection::MaxOutDegree);
        assert_eq!(config.restart_prob, 0.8);
    }

    #[test]
    fn test_rejects_indivisible_copies() {
        let result = SamplerConfig::from_yaml_str("num_workers: 3\nnum_copies: 2\n");
        assert!(matches!(result, Err(SamplerError::Configuration(_))));
    }

    #[test]
    fn test_rejects_small_embedding() {
        let result = SamplerConfig::from_yaml_str("positional_embedding_size: 1\n");
        assert!(matches!(result, Err(SamplerError::Configuration(_))));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result = SamplerConfig::from_yaml_str("num_wrokers: 3\n");
        assert!(matches!(result, Err(SamplerError::Yaml(_))));
    }
}
