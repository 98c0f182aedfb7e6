//! Density-based topic grouping (HDBSCAN).
//!
//! Builds the minimum spanning tree of the mutual reachability graph, condenses
//! the single-linkage hierarchy so that only splits into two groups of at least
//! `min_cluster_size` points count, and selects clusters by excess of mass.
//! The root is never selected, so a single dense blob comes back as noise
//! rather than one all-encompassing topic.

use std::collections::VecDeque;

use tracing::{debug, instrument};

use crate::analysis::linalg::euclidean;

/// Label for points that belong to no topic.
pub const OUTLIER_TOPIC: i32 = -1;

/// Smallest topic the grouping will report.
pub const DEFAULT_MIN_TOPIC_SIZE: usize = 2;

const MIN_DISTANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

/// Assigns a topic label to every point.
///
/// Labels are `0..m` ordered by descending topic size (ties by the smallest
/// member index), or [`OUTLIER_TOPIC`].
#[must_use]
#[instrument(skip(points), fields(points = points.len()))]
pub fn hdbscan(points: &[Vec<f64>], min_cluster_size: usize) -> Vec<i32> {
    let n = points.len();
    let min_size = min_cluster_size.max(2);
    if n < min_size {
        return vec![OUTLIER_TOPIC; n];
    }

    let core = core_distances(points, min_size - 1);
    let edges = minimum_spanning_tree(points, &core);
    let merges = single_linkage(n, edges);
    let (condensed, cluster_count) = condense(n, &merges, min_size);
    let selected = select_clusters(n, &condensed, cluster_count);
    let labels = label_points(n, &condensed, &selected);
    debug!(
        topics = labels.iter().filter(|&&l| l >= 0).max().map_or(0, |&m| m + 1),
        outliers = labels.iter().filter(|&&l| l == OUTLIER_TOPIC).count(),
        "density grouping complete"
    );
    labels
}

/// Distance from each point to its `k`-th nearest other point.
fn core_distances(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let mut distances: Vec<f64> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, other)| euclidean(point, other))
                .collect();
            let index = k.clamp(1, distances.len()) - 1;
            distances.select_nth_unstable_by(index, f64::total_cmp);
            distances[index]
        })
        .collect()
}

/// Prim's algorithm over mutual reachability distances.
fn minimum_spanning_tree(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let reach = |a: usize, b: usize| euclidean(&points[a], &points[b]).max(core[a]).max(core[b]);

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);
    let mut current = 0;

    for _ in 1..n {
        in_tree[current] = true;
        let mut next = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let distance = reach(current, j);
            if distance < best[j] {
                best[j] = distance;
                from[j] = current;
            }
            if next.is_none_or(|k: usize| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(j) = next else { break };
        edges.push((from[j], j, best[j]));
        current = j;
    }
    edges
}

struct UnionFind {
    parent: Vec<usize>,
    node: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            node: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }
}

/// Dendrogram in merge order; merge `t` creates node `n + t`.
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| (a.0, a.1).cmp(&(b.0, b.1))));
    let mut sets = UnionFind::new(n);
    let mut merges = Vec::with_capacity(edges.len());

    for (a, b, distance) in edges {
        let (ra, rb) = (sets.find(a), sets.find(b));
        if ra == rb {
            continue;
        }
        let size = sets.size[ra] + sets.size[rb];
        merges.push(Merge {
            left: sets.node[ra],
            right: sets.node[rb],
            distance,
            size,
        });
        sets.parent[rb] = ra;
        sets.size[ra] = size;
        sets.node[ra] = n + merges.len() - 1;
    }
    merges
}

fn node_size(n: usize, merges: &[Merge], node: usize) -> usize {
    if node < n { 1 } else { merges[node - n].size }
}

fn leaves(n: usize, merges: &[Merge], node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            out.push(current);
        } else {
            let merge = merges[current - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
    out
}

/// Condensed tree. Cluster labels start at `n` (the root); returns the edges
/// and the number of cluster labels used.
fn condense(n: usize, merges: &[Merge], min_size: usize) -> (Vec<CondensedEdge>, usize) {
    let mut edges = Vec::new();
    let Some(root) = (n + merges.len()).checked_sub(1).filter(|&r| r >= n) else {
        return (edges, 1);
    };

    let mut next_label = n + 1;
    let mut queue = VecDeque::from([(root, n)]);
    while let Some((node, label)) = queue.pop_front() {
        let merge = merges[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let left_size = node_size(n, merges, merge.left);
        let right_size = node_size(n, merges, merge.right);

        match (left_size >= min_size, right_size >= min_size) {
            (true, true) => {
                for (child, size) in [(merge.left, left_size), (merge.right, right_size)] {
                    edges.push(CondensedEdge {
                        parent: label,
                        child: next_label,
                        lambda,
                        size,
                    });
                    queue.push_back((child, next_label));
                    next_label += 1;
                }
            }
            (left_big, right_big) => {
                for (child, big) in [(merge.left, left_big), (merge.right, right_big)] {
                    if big {
                        queue.push_back((child, label));
                    } else {
                        edges.extend(leaves(n, merges, child).into_iter().map(|point| CondensedEdge {
                            parent: label,
                            child: point,
                            lambda,
                            size: 1,
                        }));
                    }
                }
            }
        }
    }
    (edges, next_label - n)
}

/// Excess-of-mass selection; returns a flag per cluster label offset.
fn select_clusters(n: usize, condensed: &[CondensedEdge], cluster_count: usize) -> Vec<bool> {
    let mut birth = vec![0.0; cluster_count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); cluster_count];
    for edge in condensed.iter().filter(|e| e.child >= n) {
        birth[edge.child - n] = edge.lambda;
        children[edge.parent - n].push(edge.child - n);
    }

    let mut stability = vec![0.0; cluster_count];
    for edge in condensed {
        let parent = edge.parent - n;
        #[allow(clippy::cast_precision_loss)]
        let mass = edge.size as f64;
        stability[parent] += (edge.lambda - birth[parent]) * mass;
    }

    let mut selected = vec![true; cluster_count];
    selected[0] = false;
    for cluster in (1..cluster_count).rev() {
        let child_stability: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
        if !children[cluster].is_empty() && child_stability > stability[cluster] {
            selected[cluster] = false;
            stability[cluster] = child_stability;
        } else {
            let mut stack = children[cluster].clone();
            while let Some(descendant) = stack.pop() {
                selected[descendant] = false;
                stack.extend(children[descendant].iter().copied());
            }
        }
    }
    selected
}

fn label_points(n: usize, condensed: &[CondensedEdge], selected: &[bool]) -> Vec<i32> {
    let mut parent_of = vec![0usize; selected.len()];
    for edge in condensed.iter().filter(|e| e.child >= n) {
        parent_of[edge.child - n] = edge.parent - n;
    }

    let mut membership: Vec<Option<usize>> = vec![None; n];
    for edge in condensed.iter().filter(|e| e.child < n) {
        let mut cluster = edge.parent - n;
        while cluster != 0 && !selected[cluster] {
            cluster = parent_of[cluster];
        }
        if cluster != 0 {
            membership[edge.child] = Some(cluster);
        }
    }

    // (size, smallest member) per selected cluster
    let mut groups: Vec<(usize, usize, usize)> = Vec::new();
    for (point, cluster) in membership.iter().enumerate() {
        let Some(cluster) = *cluster else { continue };
        match groups.iter_mut().find(|g| g.0 == cluster) {
            Some(group) => group.1 += 1,
            None => groups.push((cluster, 1, point)),
        }
    }
    groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));

    membership
        .iter()
        .map(|cluster| {
            cluster
                .and_then(|c| groups.iter().position(|g| g.0 == c))
                .and_then(|rank| i32::try_from(rank).ok())
                .unwrap_or(OUTLIER_TOPIC)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(cx: f64, cy: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f64 * 0.01;
                vec![cx + offset, cy - offset]
            })
            .collect()
    }

    #[test]
    fn test_two_blobs_become_two_topics() {
        let mut points = blob(0.0, 0.0, 4);
        points.extend(blob(5.0, 5.0, 3));
        let labels = hdbscan(&points, 2);

        assert_eq!(labels.len(), 7);
        assert!(labels.iter().all(|&l| l >= 0));
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[4], labels[6]);
        assert_ne!(labels[0], labels[4]);
        // Larger topic first.
        assert_eq!(labels[0], 0);
        assert_eq!(labels[4], 1);
    }

    #[test]
    fn test_isolated_point_is_noise() {
        let mut points = blob(0.0, 0.0, 3);
        points.extend(blob(5.0, 5.0, 3));
        points.push(vec![50.0, -50.0]);
        let labels = hdbscan(&points, 2);

        assert_eq!(labels[6], OUTLIER_TOPIC);
        assert!(labels[..6].iter().all(|&l| l >= 0));
    }

    #[test]
    fn test_too_few_points_are_all_noise() {
        assert_eq!(hdbscan(&[vec![0.0, 0.0]], 2), vec![OUTLIER_TOPIC]);
        assert!(hdbscan(&[], 2).is_empty());
    }

    #[test]
    fn test_single_linkage_builds_full_dendrogram() {
        let edges = vec![(0, 1, 1.0), (1, 2, 3.0), (2, 3, 2.0)];
        let merges = single_linkage(4, edges);
        assert_eq!(merges.len(), 3);
        assert_eq!(merges[2].size, 4);
        assert!((merges[2].distance - 3.0).abs() < f64::EPSILON);
    }
}
