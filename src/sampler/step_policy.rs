use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::config::STEP_POLICY_TOLERANCE;
use crate::errors::{SamplerError, SamplerResult};

/// Distribution over the number of hops between anchor and context.
///
/// Entry `i` is the probability of walking exactly `i` hops. Validated once at
/// construction: non-empty, every entry finite and non-negative, summing to 1.0
/// within `STEP_POLICY_TOLERANCE`.
#[derive(Debug, Clone)]
pub struct StepPolicy {
    probabilities: Vec<f64>,
    distribution: WeightedIndex<f64>,
}

impl StepPolicy {
    pub fn new(probabilities: Vec<f64>) -> SamplerResult<Self> {
        if probabilities.is_empty() {
            return Err(SamplerError::Configuration("step_dist is empty".into()));
        }
        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(SamplerError::Configuration(format!(
                "step_dist entries must be non-negative, found {bad}"
            )));
        }
        let total: f64 = probabilities.iter().sum();
        if (total - 1.0).abs() > STEP_POLICY_TOLERANCE {
            return Err(SamplerError::Configuration(format!(
                "step_dist must sum to 1.0, sums to {total}"
            )));
        }
        let distribution = WeightedIndex::new(&probabilities)
            .map_err(|e| SamplerError::Configuration(format!("invalid step_dist: {e}")))?;
        Ok(Self {
            probabilities,
            distribution,
        })
    }

    /// Draws a hop count.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> usize {
        self.distribution.sample(rng)
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn max_steps(&self) -> usize {
        self.probabilities.len() - 1
    }
}

impl PartialEq for StepPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.probabilities == other.probabilities
    }
}
