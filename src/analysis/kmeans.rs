//! K-means clustering with k-means++ seeding and silhouette scoring.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument};

use super::error::AnalysisError;

/// Default number of clusters.
pub const DEFAULT_CLUSTERS: usize = 3;

/// Default seed for k-means++ initialization.
pub const DEFAULT_SEED: u64 = 42;

/// How many clusters to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSizing {
    /// Exactly `k` clusters.
    Fixed(usize),
    /// `min(k_max, n - 1)` clusters, so small datasets still cluster.
    Adaptive(usize),
}

impl ClusterSizing {
    /// Resolves the cluster count for `n` points.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidClusterCount`] unless `2 <= k < n`.
    pub fn resolve(self, n: usize) -> Result<usize, AnalysisError> {
        let k = match self {
            Self::Fixed(k) => k,
            Self::Adaptive(k_max) => k_max.min(n.saturating_sub(1)),
        };
        if k < 2 || k >= n {
            return Err(AnalysisError::invalid_cluster_count(k, n));
        }
        Ok(k)
    }
}

/// K-means settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansConfig {
    /// Independent initializations; the lowest inertia wins.
    pub n_init: usize,
    /// Lloyd iteration cap per run.
    pub max_iter: usize,
    /// Seed for the initialization RNG.
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            seed: DEFAULT_SEED,
        }
    }
}

/// A partition of the input points.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering<const D: usize> {
    /// Cluster id per point, `0 <= id < k`.
    pub labels: Vec<usize>,
    /// Cluster centers.
    pub centroids: Vec<[f64; D]>,
    /// Mean silhouette coefficient in `[-1, 1]`.
    pub silhouette: f64,
    /// Sum of squared distances to the assigned centers.
    pub inertia: f64,
    /// Number of clusters.
    pub k: usize,
}

impl<const D: usize> Clustering<D> {
    /// Points per cluster.
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Indices of the points in `cluster`, ascending.
    #[must_use]
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == cluster)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Partitions `points` into clusters.
///
/// # Errors
///
/// [`AnalysisError::InvalidClusterCount`] when the sizing resolves outside
/// `2 <= k < n`, and [`AnalysisError::EmptyCluster`] when every run leaves a
/// cluster without points.
#[instrument(skip(points, config), fields(points = points.len()))]
pub fn cluster<const D: usize>(
    points: &[[f64; D]],
    sizing: ClusterSizing,
    config: &KMeansConfig,
) -> Result<Clustering<D>, AnalysisError> {
    let k = sizing.resolve(points.len())?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<(Vec<usize>, Vec<[f64; D]>, f64)> = None;
    for run in 0..config.n_init.max(1) {
        let seeds = kmeans_plus_plus(points, k, &mut rng);
        let (labels, centroids, inertia) = lloyd(points, seeds, config.max_iter);
        let non_empty = count_non_empty(&labels, k);
        debug!(run, inertia, non_empty, "k-means run finished");
        if non_empty < k {
            continue;
        }
        if best.as_ref().is_none_or(|(_, _, best_inertia)| inertia < *best_inertia) {
            best = Some((labels, centroids, inertia));
        }
    }

    let Some((labels, centroids, inertia)) = best else {
        return Err(AnalysisError::EmptyCluster { k });
    };
    let silhouette = silhouette_score(points, &labels, k);
    info!(k, inertia, silhouette, "clustering complete");

    Ok(Clustering {
        labels,
        centroids,
        silhouette,
        inertia,
        k,
    })
}

/// Mean silhouette coefficient of a labelling. Points in singleton clusters
/// score 0.
#[must_use]
pub fn silhouette_score<const D: usize>(points: &[[f64; D]], labels: &[usize], k: usize) -> f64 {
    if points.is_empty() || k < 2 {
        return 0.0;
    }
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }
        let mut sums = vec![0.0; k];
        for (j, other) in points.iter().enumerate() {
            if i != j {
                sums[labels[j]] += distance(point, other);
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let a = sums[own] / (sizes[own] - 1) as f64;
        #[allow(clippy::cast_precision_loss)]
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let spread = a.max(b);
        if spread > 0.0 && b.is_finite() {
            total += (b - a) / spread;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let count = points.len() as f64;
    total / count
}

fn kmeans_plus_plus<const D: usize>(
    points: &[[f64; D]],
    k: usize,
    rng: &mut StdRng,
) -> Vec<[f64; D]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            nearest
                .iter()
                .position(|&weight| {
                    target -= weight;
                    target < 0.0
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.gen_range(0..points.len())
        };
        let centroid = points[chosen];
        for (weight, point) in nearest.iter_mut().zip(points) {
            *weight = weight.min(squared_distance(point, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn lloyd<const D: usize>(
    points: &[[f64; D]],
    mut centroids: Vec<[f64; D]>,
    max_iter: usize,
) -> (Vec<usize>, Vec<[f64; D]>, f64) {
    let k = centroids.len();
    let mut labels = assign(points, &centroids);

    for _ in 0..max_iter {
        let mut sums = vec![[0.0; D]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, x) in sums[label].iter_mut().zip(point) {
                *s += x;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] > 0 {
                #[allow(clippy::cast_precision_loss)]
                let count = counts[c] as f64;
                for (value, s) in centroid.iter_mut().zip(&sums[c]) {
                    *value = s / count;
                }
            }
        }

        let next = assign(points, &centroids);
        if next == labels {
            break;
        }
        labels = next;
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &label)| squared_distance(p, &centroids[label]))
        .sum();
    (labels, centroids, inertia)
}

fn assign<const D: usize>(points: &[[f64; D]], centroids: &[[f64; D]]) -> Vec<usize> {
    points
        .iter()
        .map(|point| {
            centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| (c, squared_distance(point, centroid)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(c, _)| c)
        })
        .collect()
}

fn count_non_empty(labels: &[usize], k: usize) -> usize {
    let mut seen = vec![false; k];
    for &label in labels {
        seen[label] = true;
    }
    seen.into_iter().filter(|&s| s).count()
}

fn squared_distance<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn distance<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    squared_distance(a, b).sqrt()
}
