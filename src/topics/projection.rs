//! Manifold projection of passage embeddings.
//!
//! A cosine k-nearest-neighbour graph is turned into a fuzzy membership graph
//! (each point's memberships decay from its nearest neighbour distance `rho`
//! with a bandwidth `sigma` calibrated so that they sum to
//! `log2(n_neighbors)`), symmetrized with the fuzzy union `a + b - ab`, and
//! embedded with the leading non-trivial eigenvectors of its normalized
//! affinity matrix.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::analysis::linalg::{dot, norm, top_eigenpairs};

const MAX_NEIGHBORS: usize = 19;
const MAX_COMPONENTS: usize = 5;
const BANDWIDTH_STEPS: usize = 64;
const BANDWIDTH_TOLERANCE: f64 = 1e-5;
const MIN_BANDWIDTH_SCALE: f64 = 1e-3;

/// Projection hyperparameters, resolved from the number of points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionParams {
    /// Neighbours per point in the kNN graph.
    pub n_neighbors: usize,
    /// Output dimensions.
    pub n_components: usize,
    /// Distance used for the kNN graph.
    pub metric: String,
}

impl ProjectionParams {
    /// `n_neighbors = max(2, min(19, n - 1))`, `n_components = min(5, n - 1)`.
    #[must_use]
    pub fn for_points(n: usize) -> Self {
        let upper = n.saturating_sub(1);
        Self {
            n_neighbors: MAX_NEIGHBORS.min(upper).max(2),
            n_components: MAX_COMPONENTS.min(upper),
            metric: "cosine".to_string(),
        }
    }
}

/// Projects `embeddings` to `params.n_components` dimensions.
///
/// Every output row has exactly `n_components` coordinates; components the
/// graph cannot support are zero.
#[must_use]
#[instrument(skip(embeddings, params), fields(points = embeddings.len(), n_neighbors = params.n_neighbors, n_components = params.n_components))]
pub fn project(embeddings: &[Vec<f64>], params: &ProjectionParams, seed: u64) -> Vec<Vec<f64>> {
    let n = embeddings.len();
    if n < 2 || params.n_components == 0 {
        return vec![vec![0.0; params.n_components]; n];
    }

    let unit: Vec<Vec<f64>> = embeddings
        .iter()
        .map(|v| {
            let length = norm(v);
            if length > 0.0 {
                v.iter().map(|x| x / length).collect()
            } else {
                v.clone()
            }
        })
        .collect();

    let k = params.n_neighbors.min(n - 1);
    let neighbors: Vec<Vec<(usize, f64)>> = (0..n)
        .into_par_iter()
        .map(|i| nearest_neighbors(&unit, i, k))
        .collect();

    let graph = fuzzy_graph(&neighbors, k);
    let coordinates = spectral_coordinates(&graph, params.n_components, seed);
    debug!(points = n, "projection complete");
    coordinates
}

fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    // Zero rows have zero dot product with everything, so distance 1.
    (1.0 - dot(a, b)).clamp(0.0, 2.0)
}

fn nearest_neighbors(unit: &[Vec<f64>], i: usize, k: usize) -> Vec<(usize, f64)> {
    let mut distances: Vec<(usize, f64)> = unit
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(j, other)| (j, cosine_distance(&unit[i], other)))
        .collect();
    distances.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    distances.truncate(k);
    distances
}

/// `rho` and `sigma` for one point's sorted neighbour distances.
fn smooth_distances(distances: &[f64], target: f64) -> (f64, f64) {
    let rho = distances.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);
    let membership_sum = |sigma: f64| -> f64 {
        distances
            .iter()
            .map(|&d| {
                let gap = d - rho;
                if gap > 0.0 { (-gap / sigma).exp() } else { 1.0 }
            })
            .sum()
    };

    let mut lo = 0.0;
    let mut hi = f64::INFINITY;
    let mut sigma = 1.0;
    for _ in 0..BANDWIDTH_STEPS {
        let total = membership_sum(sigma);
        if (total - target).abs() < BANDWIDTH_TOLERANCE {
            break;
        }
        if total > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = distances.iter().sum::<f64>() / distances.len().max(1) as f64;
    (rho, sigma.max(MIN_BANDWIDTH_SCALE * mean).max(f64::EPSILON))
}

/// Symmetric fuzzy graph with self-membership 1 on the diagonal.
fn fuzzy_graph(neighbors: &[Vec<(usize, f64)>], k: usize) -> Vec<BTreeMap<usize, f64>> {
    #[allow(clippy::cast_precision_loss)]
    let target = (k as f64).log2();

    let directed: Vec<BTreeMap<usize, f64>> = neighbors
        .iter()
        .map(|row| {
            let distances: Vec<f64> = row.iter().map(|&(_, d)| d).collect();
            let (rho, sigma) = smooth_distances(&distances, target);
            row.iter()
                .map(|&(j, d)| {
                    let gap = d - rho;
                    let weight = if gap > 0.0 { (-gap / sigma).exp() } else { 1.0 };
                    (j, weight)
                })
                .collect()
        })
        .collect();

    let mut graph: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); neighbors.len()];
    for (i, row) in directed.iter().enumerate() {
        for (&j, &a) in row {
            let b = directed[j].get(&i).copied().unwrap_or(0.0);
            let union = a + b - a * b;
            graph[i].insert(j, union);
            graph[j].insert(i, union);
        }
    }
    for (i, row) in graph.iter_mut().enumerate() {
        row.insert(i, 1.0);
    }
    graph
}

/// Leading non-trivial eigenvectors of `D^-1/2 W D^-1/2`, scaled by their
/// (non-negative) eigenvalues.
fn spectral_coordinates(graph: &[BTreeMap<usize, f64>], n_components: usize, seed: u64) -> Vec<Vec<f64>> {
    let n = graph.len();
    let degrees: Vec<f64> = graph.iter().map(|row| row.values().sum()).collect();
    let inv_sqrt: Vec<f64> = degrees.iter().map(|d| 1.0 / d.sqrt()).collect();

    let mut trivial: Vec<f64> = degrees.iter().map(|d| d.sqrt()).collect();
    let length = norm(&trivial);
    for value in &mut trivial {
        *value /= length;
    }

    // Shifted by the identity so the operator is positive semi-definite.
    let apply = |v: &[f64]| -> Vec<f64> {
        graph
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let affinity: f64 = row.iter().map(|(&j, &w)| w * inv_sqrt[i] * inv_sqrt[j] * v[j]).sum();
                affinity + v[i]
            })
            .collect()
    };

    let pairs = top_eigenpairs(n, n_components, apply, &[trivial], seed);
    let mut coordinates = vec![vec![0.0; n_components]; n];
    for (component, (shifted, vector)) in pairs.iter().enumerate() {
        let scale = (shifted - 1.0).max(0.0);
        for (row, value) in coordinates.iter_mut().zip(vector) {
            row[component] = value * scale;
        }
    }
    coordinates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::linalg::euclidean;

    #[test]
    fn test_params_follow_point_count() {
        assert_eq!(
            ProjectionParams::for_points(100),
            ProjectionParams {
                n_neighbors: 19,
                n_components: 5,
                metric: "cosine".to_string()
            }
        );
        let small = ProjectionParams::for_points(3);
        assert_eq!((small.n_neighbors, small.n_components), (2, 2));
        let pair = ProjectionParams::for_points(2);
        assert_eq!((pair.n_neighbors, pair.n_components), (2, 1));
    }

    #[test]
    fn test_smooth_distances_hits_target() {
        let distances = [0.1, 0.3, 0.4, 0.6, 0.9];
        let target = 5f64.log2();
        let (rho, sigma) = smooth_distances(&distances, target);
        assert!((rho - 0.1).abs() < f64::EPSILON);
        let total: f64 = distances.iter().map(|d| (-(d - rho).max(0.0) / sigma).exp()).sum();
        assert!((total - target).abs() < 1e-3);
    }

    #[test]
    fn test_fuzzy_graph_is_symmetric_with_unit_diagonal() {
        let neighbors = vec![
            vec![(1, 0.1), (2, 0.5)],
            vec![(0, 0.1), (2, 0.4)],
            vec![(1, 0.4), (0, 0.5)],
        ];
        let graph = fuzzy_graph(&neighbors, 2);
        for (i, row) in graph.iter().enumerate() {
            assert!((row[&i] - 1.0).abs() < f64::EPSILON);
            for (&j, &w) in row {
                assert!((graph[j][&i] - w).abs() < 1e-12);
                assert!((0.0..=1.0).contains(&w));
            }
        }
    }

    #[test]
    fn test_project_keeps_groups_apart() {
        let embeddings = vec![
            vec![1.0, 0.1, 0.0, 0.0],
            vec![1.0, 0.0, 0.1, 0.0],
            vec![0.9, 0.1, 0.1, 0.0],
            vec![0.0, 0.0, 0.1, 1.0],
            vec![0.0, 0.1, 0.0, 1.0],
            vec![0.1, 0.0, 0.1, 0.9],
        ];
        let params = ProjectionParams::for_points(embeddings.len());
        let coords = project(&embeddings, &params, 42);

        assert_eq!(coords.len(), 6);
        assert!(coords.iter().all(|row| row.len() == params.n_components));
        let within = euclidean(&coords[0], &coords[1]).max(euclidean(&coords[3], &coords[4]));
        let between = euclidean(&coords[0], &coords[3]);
        assert!(between > within);
    }

    #[test]
    fn test_project_is_deterministic() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.2],
            vec![0.8, 0.1, 0.0],
            vec![0.0, 1.0, 0.1],
            vec![0.1, 0.9, 0.0],
        ];
        let params = ProjectionParams::for_points(4);
        assert_eq!(project(&embeddings, &params, 7), project(&embeddings, &params, 7));
    }
}
