//! Shared distance math and brute-force top-k search, used by every engine
//! that does not (or cannot) delegate to an external ANN library.

use super::engine_trait::{DistanceMetric, SearchResult};

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => l2_distance(a, b),
        DistanceMetric::Ip => inner_product(a, b),
    }
}

/// Brute-force k-nearest-neighbor search over `candidates` (id, vector)
/// pairs. Results for each query are padded with `-1`/`f32::MAX` past the
/// number of candidates actually available, matching
/// `DescriptorSet::search`'s padding convention.
pub fn brute_force_search(metric: DistanceMetric, dim: usize, candidates: &[(i64, Vec<f32>)], queries: &[f32], n: usize, k: usize) -> SearchResult {
    let mut ids = Vec::with_capacity(n * k);
    let mut distances = Vec::with_capacity(n * k);

    for q in 0..n {
        let query = &queries[q * dim..(q + 1) * dim];
        let mut scored: Vec<(i64, f32)> = candidates.iter().map(|(id, v)| (*id, distance(metric, query, v))).collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        for i in 0..k {
            if let Some((id, dist)) = scored.get(i) {
                ids.push(*id);
                distances.push(*dist);
            } else {
                ids.push(-1);
                distances.push(f32::MAX);
            }
        }
    }

    SearchResult { ids, distances }
}
