use crate::errors::{SamplerError, SamplerResult};

/// Flat node index over a worker shard.
///
/// Node `local` of graph `g` owns flat index `boundaries[g] + local`, where
/// `boundaries` are the exclusive running sums of the node counts. Graphs without
/// nodes own an empty range and are never returned by [`FlatIndex::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatIndex {
    boundaries: Vec<u64>, // boundaries[g] is the first flat index of graph g; last entry is the total
}

impl FlatIndex {
    pub fn new(node_counts: &[u64]) -> Self {
        let mut boundaries = Vec::with_capacity(node_counts.len() + 1);
        let mut running = 0u64;
        boundaries.push(running);
        for &count in node_counts {
            running += count;
            boundaries.push(running);
        }
        Self { boundaries }
    }

    pub fn total_nodes(&self) -> u64 {
        self.boundaries.last().copied().unwrap_or(0)
    }

    pub fn graph_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Maps a flat index to `(graph_index, local_node)`.
    ///
    /// An index equal to a running sum belongs to the next non-empty graph.
    ///
    /// # Returns
    /// * `SamplerError::Index` when `flat_index` is outside `[0, total_nodes)`
    pub fn resolve(&self, flat_index: u64) -> SamplerResult<(usize, u64)> {
        let total = self.total_nodes();
        if flat_index >= total {
            return Err(SamplerError::Index {
                index: flat_index,
                total,
            });
        }
        // Number of boundaries <= flat_index, minus the leading zero.
        let graph_index = self.boundaries.partition_point(|&start| start <= flat_index) - 1;
        Ok((graph_index, flat_index - self.boundaries[graph_index]))
    }
}

#[cfg(test)]
mod test_flat_index {
    use super::*;

    #[test]
    fn test_boundaries_are_exclusive() {
        let index = FlatIndex::new(&[3, 2, 4]);
        assert_eq!(index.total_nodes(), 9);
        assert_eq!(index.resolve(0).unwrap(), (0, 0));
        assert_eq!(index.resolve(2).unwrap(), (0, 2));
        assert_eq!(index.resolve(3).unwrap(), (1, 0));
        assert_eq!(index.resolve(5).unwrap(), (2, 0));
        assert_eq!(index.resolve(8).unwrap(), (2, 3));
    }

    #[test]
    fn test_resolve_is_a_bijection() {
        let counts = [4u64, 0, 1, 7, 0, 0, 3];
        let index = FlatIndex::new(&counts);
        let mut expected = Vec::new();
        for (graph_index, &count) in counts.iter().enumerate() {
            for local in 0..count {
                expected.push((graph_index, local));
            }
        }
        let resolved: Vec<(usize, u64)> = (0..index.total_nodes())
            .map(|i| index.resolve(i).unwrap())
            .collect();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_out_of_range_is_index_error() {
        let index = FlatIndex::new(&[2, 2]);
        assert!(matches!(
            index.resolve(4),
            Err(SamplerError::Index { index: 4, total: 4 })
        ));
        let empty = FlatIndex::new(&[]);
        assert_eq!(empty.graph_count(), 0);
        assert!(matches!(empty.resolve(0), Err(SamplerError::Index { .. })));
    }
}
