//! Small dense linear algebra helpers: vector ops and a deflated power
//! iteration for the leading eigenpairs of symmetric operators.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_ITERATIONS: usize = 1000;
const TOLERANCE: f64 = 1e-10;

/// Dot product.
#[must_use]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
#[must_use]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Scales `a` to unit length in place. Returns the previous norm; zero vectors
/// are left untouched.
pub fn normalize(a: &mut [f64]) -> f64 {
    let n = norm(a);
    if n > 0.0 {
        for value in a.iter_mut() {
            *value /= n;
        }
    }
    n
}

/// Euclidean distance.
#[must_use]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity; zero when either vector is zero.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let denominator = norm(a) * norm(b);
    if denominator == 0.0 {
        0.0
    } else {
        dot(a, b) / denominator
    }
}

fn orthogonalize(v: &mut [f64], basis: &[&[f64]]) {
    for b in basis {
        let projection = dot(v, b);
        for (x, y) in v.iter_mut().zip(b.iter()) {
            *x -= projection * y;
        }
    }
}

/// Leading eigenpairs of a symmetric positive semi-definite operator.
///
/// `apply` computes `A v` for a vector of length `dim`. Vectors in `exclude`
/// (unit length, mutually orthogonal) are projected out, so their directions
/// are never returned. Eigenpairs come back in descending eigenvalue order;
/// fewer than `count` are returned when the remaining space is exhausted.
///
/// Start vectors come from a `StdRng` seeded with `seed`, which makes the
/// result reproducible.
pub fn top_eigenpairs<F>(
    dim: usize,
    count: usize,
    apply: F,
    exclude: &[Vec<f64>],
    seed: u64,
) -> Vec<(f64, Vec<f64>)>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut found: Vec<(f64, Vec<f64>)> = Vec::with_capacity(count);

    for _ in 0..count.min(dim) {
        let basis: Vec<&[f64]> = exclude
            .iter()
            .map(Vec::as_slice)
            .chain(found.iter().map(|(_, v)| v.as_slice()))
            .collect();

        let mut v: Vec<f64> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        orthogonalize(&mut v, &basis);
        if normalize(&mut v) < 1e-12 {
            break;
        }

        for _ in 0..MAX_ITERATIONS {
            let mut w = apply(&v);
            orthogonalize(&mut w, &basis);
            if normalize(&mut w) < 1e-14 {
                break;
            }
            let delta = euclidean(&v, &w);
            v = w;
            if delta < TOLERANCE {
                break;
            }
        }
        // Re-orthogonalize once more to shed accumulated drift.
        orthogonalize(&mut v, &basis);
        normalize(&mut v);

        let eigenvalue = dot(&v, &apply(&v)).max(0.0);
        found.push((eigenvalue, v));
    }

    found.sort_by(|a, b| b.0.total_cmp(&a.0));
    found
}
