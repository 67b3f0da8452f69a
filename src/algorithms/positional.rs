//! Spectral positional features for sampled subgraphs.

use crate::config::{EIGEN_MAX_SWEEPS, EIGEN_TOLERANCE};
use crate::types::graph_query::GraphQuery;

/// Computes the undirected spectral positional embedding of a (small) graph.
///
/// The graph is read as undirected, normalized to `D^-1/2 A D^-1/2` with degrees
/// clipped to at least one, and decomposed. The `k = min(n - 2, size)` eigenvectors
/// with the largest eigenvalues become the columns, ordered by descending
/// eigenvalue; each row is L2-normalized and padded with zeros to `size` columns.
/// Graphs with fewer than three vertices get all-zero features.
///
/// # Arguments
/// * `graph` - The subgraph, in local vertex ids
/// * `size` - Number of feature columns per vertex
///
/// # Returns
/// * One row of `size` features per vertex
pub fn laplacian_positional_embedding<G: GraphQuery>(graph: &G, size: usize) -> Vec<Vec<f32>> {
    let n = graph.vertex_count() as usize;
    let mut embedding = vec![vec![0f32; size]; n];
    let k = n.saturating_sub(2).min(size);
    if k == 0 {
        return embedding;
    }

    // Step 1: Dense symmetric adjacency, each edge counted once per direction.
    let mut matrix = vec![0f64; n * n];
    for src in 0..n {
        for &dst in graph.read_neighbor(src as u64) {
            let dst = dst as usize;
            matrix[src * n + dst] = 1.0;
            matrix[dst * n + src] = 1.0;
        }
    }

    // Step 2: Symmetric degree normalization.
    let inv_sqrt_degree: Vec<f64> = (0..n)
        .map(|row| {
            let degree: f64 = matrix[row * n..(row + 1) * n].iter().sum();
            1.0 / degree.max(1.0).sqrt()
        })
        .collect();
    for row in 0..n {
        for col in 0..n {
            matrix[row * n + col] *= inv_sqrt_degree[row] * inv_sqrt_degree[col];
        }
    }

    // Step 3: Eigen-decomposition, largest eigenvalues first.
    let (eigenvalues, eigenvectors) = symmetric_eigen(matrix, n);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    for (col, &eigen_idx) in order.iter().take(k).enumerate() {
        // Fix the sign so the largest-magnitude component is positive.
        let pivot = (0..n)
            .max_by(|&a, &b| {
                eigenvectors[a * n + eigen_idx]
                    .abs()
                    .total_cmp(&eigenvectors[b * n + eigen_idx].abs())
            })
            .unwrap_or(0);
        let sign = if eigenvectors[pivot * n + eigen_idx] < 0.0 { -1.0 } else { 1.0 };
        for row in 0..n {
            embedding[row][col] = (sign * eigenvectors[row * n + eigen_idx]) as f32;
        }
    }

    // Step 4: Row-wise L2 normalization; all-zero rows stay zero.
    for row in embedding.iter_mut() {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|x| *x /= norm);
        }
    }
    embedding
}

/// Cyclic Jacobi eigen-decomposition of a dense symmetric `n x n` row-major matrix.
///
/// Returns the eigenvalues and the eigenvectors, the latter as the columns of a
/// row-major `n x n` matrix.
pub(crate) fn symmetric_eigen(mut matrix: Vec<f64>, n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut vectors = vec![0f64; n * n];
    for i in 0..n {
        vectors[i * n + i] = 1.0;
    }

    for _ in 0..EIGEN_MAX_SWEEPS {
        let off_diagonal: f64 = (0..n)
            .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
            .map(|(p, q)| matrix[p * n + q] * matrix[p * n + q])
            .sum();
        if off_diagonal.sqrt() < EIGEN_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = matrix[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (matrix[q * n + q] - matrix[p * n + p]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = matrix[k * n + p];
                    let akq = matrix[k * n + q];
                    matrix[k * n + p] = c * akp - s * akq;
                    matrix[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = matrix[p * n + k];
                    let aqk = matrix[q * n + k];
                    matrix[p * n + k] = c * apk - s * aqk;
                    matrix[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = vectors[k * n + p];
                    let vkq = vectors[k * n + q];
                    vectors[k * n + p] = c * vkp - s * vkq;
                    vectors[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| matrix[i * n + i]).collect();
    (eigenvalues, vectors)
}

#[cfg(test)]
mod test_positional {
    use super::*;
    use crate::types::CSRGraph;

    #[test]
    fn test_jacobi_two_by_two() {
        let (values, vectors) = symmetric_eigen(vec![2.0, 1.0, 1.0, 2.0], 2);
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert!((sorted[0] - 1.0).abs() < 1e-9);
        assert!((sorted[1] - 3.0).abs() < 1e-9);
        // Eigenvector of 3 is (1, 1) / sqrt(2) up to sign.
        let top = if values[0] > values[1] { 0 } else { 1 };
        assert!((vectors[top].abs() - vectors[2 + top].abs()).abs() < 1e-9);
    }

    #[test]
    fn test_jacobi_reconstructs_matrix() {
        let n = 4;
        let matrix = vec![
            4.0, 1.0, 0.5, 0.0, //
            1.0, 3.0, 0.0, 0.2, //
            0.5, 0.0, 2.0, 0.7, //
            0.0, 0.2, 0.7, 1.0,
        ];
        let (values, vectors) = symmetric_eigen(matrix.clone(), n);
        for row in 0..n {
            for col in 0..n {
                let rebuilt: f64 = (0..n)
                    .map(|k| vectors[row * n + k] * values[k] * vectors[col * n + k])
                    .sum();
                assert!((rebuilt - matrix[row * n + col]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_tiny_graphs_get_zero_features() {
        let graph = CSRGraph::from_edges(2, &[(0, 1), (1, 0)]).unwrap();
        let embedding = laplacian_positional_embedding(&graph, 4);
        assert_eq!(embedding.len(), 2);
        assert!(embedding.iter().flatten().all(|&x| x == 0.0));
    }

    #[test]
    fn test_embedding_shape_and_row_norms() {
        let graph = CSRGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)]).unwrap();
        let embedding = laplacian_positional_embedding(&graph, 8);
        assert_eq!(embedding.len(), 5);
        for row in &embedding {
            assert_eq!(row.len(), 8);
            // k = 3 columns are used, the rest is padding.
            assert!(row[3..].iter().all(|&x| x == 0.0));
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let graph = CSRGraph::from_edges(6, &[(0, 1), (0, 2), (1, 3), (3, 4), (4, 5)])
            .unwrap()
            .symmetrized();
        assert_eq!(
            laplacian_positional_embedding(&graph, 4),
            laplacian_positional_embedding(&graph, 4)
        );
    }
}
