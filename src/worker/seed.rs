//! Per-worker, per-rank seed derivation.

use std::env;

use tracing::warn;

use crate::config::{RANK_ENV_VAR, WORKER_SEED_STRIDE};

/// Combines a worker's base seed with the distributed rank.
///
/// Computes `(base_worker_seed mod 2^32 + rank) mod 2^32`, the 32-bit seed the
/// worker RNG is initialized from.
pub fn derive_seed(base_worker_seed: u64, rank: u32) -> u32 {
    let low_bits = (base_worker_seed % (1u64 << 32)) as u32;
    low_bits.wrapping_add(rank)
}

/// Supplies the rank of this process in a distributed run.
pub trait RankSource {
    /// `None` outside distributed deployments; treated as rank 0.
    fn current_rank(&self) -> Option<u32>;
}

/// Reads the rank from the `RANK` environment variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvRank;

impl RankSource for EnvRank {
    fn current_rank(&self) -> Option<u32> {
        parse_rank(env::var(RANK_ENV_VAR).ok())
    }
}

/// A rank fixed by the caller.
impl RankSource for Option<u32> {
    fn current_rank(&self) -> Option<u32> {
        *self
    }
}

fn parse_rank(value: Option<String>) -> Option<u32> {
    let value = value?;
    match value.trim().parse::<u32>() {
        Ok(rank) => Some(rank),
        Err(_) => {
            warn!(value = %value, "Ignoring unparseable {RANK_ENV_VAR}, using rank 0.");
            None
        }
    }
}

/// The seed inputs of one worker, fixed when the worker context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSeed {
    pub base_seed: u64,
    pub worker_id: u64,
    pub rank: u32,
}

impl WorkerSeed {
    /// Queries `rank_source` once; an absent rank becomes 0.
    pub fn new<R: RankSource + ?Sized>(base_seed: u64, worker_id: u64, rank_source: &R) -> Self {
        Self {
            base_seed,
            worker_id,
            rank: rank_source.current_rank().unwrap_or(0),
        }
    }

    pub fn base_worker_seed(&self) -> u64 {
        self.base_seed
            .wrapping_add(self.worker_id.wrapping_mul(WORKER_SEED_STRIDE))
    }

    pub fn derive(&self) -> u32 {
        derive_seed(self.base_worker_seed(), self.rank)
    }
}

#[cfg(test)]
mod test_seed {
    use rustc_hash::FxHashSet;

    use super::*;

    #[test]
    fn test_derive_seed_wraps() {
        assert_eq!(derive_seed(0, 0), 0);
        assert_eq!(derive_seed(5, 3), 8);
        assert_eq!(derive_seed((1 << 32) + 7, 1), 8);
        assert_eq!(derive_seed(u32::MAX as u64, 2), 1);
    }

    #[test]
    fn test_worker_rank_pairs_do_not_collide() {
        for base_seed in [0u64, 42, u64::MAX - 3, 0xdead_beef_0000_ffff] {
            let mut seen = FxHashSet::default();
            for worker_id in 0..32u64 {
                for rank in 0..16u32 {
                    let seed = WorkerSeed::new(base_seed, worker_id, &Some(rank)).derive();
                    assert!(seen.insert(seed), "collision at worker {worker_id}, rank {rank}");
                }
            }
            assert_eq!(seen.len(), 32 * 16);
        }
    }

    #[test]
    fn test_absent_rank_is_zero() {
        let seed = WorkerSeed::new(9, 1, &None);
        assert_eq!(seed.rank, 0);
        assert_eq!(seed.derive(), derive_seed(9 + WORKER_SEED_STRIDE, 0));
    }

    #[test]
    fn test_parse_rank() {
        assert_eq!(parse_rank(None), None);
        assert_eq!(parse_rank(Some("3".into())), Some(3));
        assert_eq!(parse_rank(Some(" 12\n".into())), Some(12));
        assert_eq!(parse_rank(Some("three".into())), None);
    }
}
