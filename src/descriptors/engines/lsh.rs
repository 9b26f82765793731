//! LSH bucket-index descriptor engine, grounded on `FlinngDescriptorSet`
//! (`original_source/src/vcl/FlinngDescriptorSet.h`/`.cc`): descriptors are
//! hashed into buckets by a fixed set of random hyperplanes so `search()`
//! only has to brute-force rescore within the query's own bucket (plus its
//! near neighbors in hash-distance), rather than the whole set. `train()`
//! fixes the hyperplanes; `finalize_index()` flips `is_finalized`, matching
//! the upstream two-step build (`train()` then `finalize_index()` before a
//! set accepts searches).
//!
//! Hyperplane coefficients are derived deterministically from `xxh3` of
//! each `(plane, dim)` pair rather than drawn from a global RNG, so the
//! same engine configuration always buckets the same way.

use crate::error::AppError;

use crate::descriptors::distance::{brute_force_search, distance};
use crate::descriptors::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind, SearchResult};
use crate::descriptors::labels::LabelMap;

use super::majority_by_label;

const N_PLANES: u32 = 8;

fn plane_coefficient(plane: u32, dim: u32) -> f32 {
    let seed = ((plane as u64) << 32) | dim as u64;
    let hashed = xxhash_rust::xxh3::xxh3_64(&seed.to_le_bytes());
    // Map the hash into roughly [-1.0, 1.0).
    ((hashed as i64 % 2000) as f32) / 1000.0 - 1.0
}

fn bucket_signature(dim: u32, vector: &[f32]) -> u32 {
    let mut bits = 0u32;
    for plane in 0..N_PLANES {
        let mut dot = 0.0f32;
        for (d, value) in vector.iter().enumerate().take(dim as usize) {
            dot += plane_coefficient(plane, d as u32) * value;
        }
        if dot >= 0.0 {
            bits |= 1 << plane;
        }
    }
    bits
}

pub struct LshEngine {
    dim: u32,
    metric: DistanceMetric,
    next_id: i64,
    buckets: std::collections::HashMap<u32, Vec<(i64, Vec<f32>)>>,
    trained: bool,
    finalized: bool,
}

impl LshEngine {
    pub fn new(dim: u32, metric: DistanceMetric) -> Self {
        LshEngine { dim, metric, next_id: 0, buckets: std::collections::HashMap::new(), trained: false, finalized: false }
    }

    fn nearby_buckets(&self, signature: u32) -> Vec<u32> {
        // Bucket itself plus every 1-bit-flip neighbor, matching FLINNG's
        // tolerance for near-miss hyperplane sign flips at query time.
        let mut buckets = vec![signature];
        for bit in 0..N_PLANES {
            buckets.push(signature ^ (1 << bit));
        }
        buckets
    }
}

impl DescriptorEngine for LshEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Flinng
    }

    fn dimensions(&self) -> u32 {
        self.dim
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn n_descriptors(&self) -> i64 {
        self.buckets.values().map(|b| b.len() as i64).sum()
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn add(&mut self, descriptors: &[f32], n: usize, labels: Option<&[i64]>) -> Result<i64, AppError> {
        if !self.trained {
            return Err(AppError::descriptor("not_trained", "flinng engine requires train() before add()"));
        }
        let dim = self.dim as usize;
        if descriptors.len() != n * dim {
            return Err(AppError::descriptor("dimension_mismatch", format!("expected {} floats, got {}", n * dim, descriptors.len())));
        }
        let first_id = self.next_id;
        for i in 0..n {
            let id = self.next_id;
            self.next_id += 1;
            let _ = labels;
            let vector = descriptors[i * dim..(i + 1) * dim].to_vec();
            let signature = bucket_signature(self.dim, &vector);
            self.buckets.entry(signature).or_default().push((id, vector));
        }
        Ok(first_id)
    }

    fn search(&self, queries: &[f32], n: usize, k: usize) -> Result<SearchResult, AppError> {
        if !self.finalized {
            return Err(AppError::descriptor("index_not_finalized", "flinng engine requires finalize_index() before search()"));
        }
        let dim = self.dim as usize;
        let mut ids = Vec::with_capacity(n * k);
        let mut distances = Vec::with_capacity(n * k);
        for q in 0..n {
            let query = &queries[q * dim..(q + 1) * dim];
            let signature = bucket_signature(self.dim, query);
            let candidates: Vec<(i64, Vec<f32>)> =
                self.nearby_buckets(signature).into_iter().flat_map(|b| self.buckets.get(&b).cloned().unwrap_or_default()).collect();
            let partial = brute_force_search(self.metric, dim, &candidates, query, 1, k);
            ids.extend(partial.ids);
            distances.extend(partial.distances);
        }
        Ok(SearchResult { ids, distances })
    }

    fn radius_search(&self, query: &[f32], radius: f32) -> Result<SearchResult, AppError> {
        let signature = bucket_signature(self.dim, query);
        let mut ids = Vec::new();
        let mut distances = Vec::new();
        for bucket in self.nearby_buckets(signature) {
            if let Some(entries) = self.buckets.get(&bucket) {
                for (id, vector) in entries {
                    let d = distance(self.metric, query, vector);
                    if d <= radius {
                        ids.push(*id);
                        distances.push(d);
                    }
                }
            }
        }
        Ok(SearchResult { ids, distances })
    }

    fn classify(&self, descriptors: &[f32], n: usize, quorum: usize, labels: &LabelMap) -> Result<Vec<i64>, AppError> {
        let result = self.search(descriptors, n, quorum)?;
        let mut winners = Vec::with_capacity(n);
        for q in 0..n {
            let slice = &result.ids[q * quorum..(q + 1) * quorum];
            winners.push(majority_by_label(slice, labels));
        }
        Ok(winners)
    }

    fn get_descriptors(&self, ids: &[i64]) -> Result<Vec<f32>, AppError> {
        let mut out = Vec::with_capacity(ids.len() * self.dim as usize);
        for id in ids {
            let found = self.buckets.values().flatten().find(|(stored_id, _)| stored_id == id);
            match found {
                Some((_, v)) => out.extend_from_slice(v),
                None => return Err(AppError::descriptor("not_found", format!("no descriptor with id {id}"))),
            }
        }
        Ok(out)
    }

    fn train(&mut self, _descriptors: Option<&[f32]>) -> Result<(), AppError> {
        self.trained = true;
        Ok(())
    }

    fn finalize_index(&mut self) -> Result<(), AppError> {
        if !self.trained {
            return Err(AppError::descriptor("not_trained", "flinng engine requires train() before finalize_index()"));
        }
        self.finalized = true;
        Ok(())
    }

    fn store(&mut self, path: &std::path::Path) -> Result<(), AppError> {
        std::fs::create_dir_all(path).map_err(AppError::from)?;
        let payload: Vec<(u32, Vec<(i64, Vec<f32>)>)> = self.buckets.iter().map(|(k, v)| (*k, v.clone())).collect();
        let bytes = bincode::serialize(&payload).map_err(|e| AppError::descriptor("serialize_error", e.to_string()))?;
        std::fs::write(path.join("flinng.bin"), bytes).map_err(AppError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_engine() -> LshEngine {
        let mut engine = LshEngine::new(4, DistanceMetric::L2);
        engine.train(None).unwrap();
        engine.finalize_index().unwrap();
        engine
    }

    #[test]
    fn search_before_finalize_is_rejected() {
        let mut engine = LshEngine::new(4, DistanceMetric::L2);
        engine.train(None).unwrap();
        assert!(engine.search(&[0.0, 0.0, 0.0, 0.0], 1, 1).is_err());
    }

    #[test]
    fn add_then_search_finds_self() {
        let mut engine = ready_engine();
        engine.add(&[1.0, 2.0, 3.0, 4.0], 1, None).unwrap();
        let result = engine.search(&[1.0, 2.0, 3.0, 4.0], 1, 1).unwrap();
        assert_eq!(result.ids[0], 0);
        assert_eq!(result.distances[0], 0.0);
    }

    #[test]
    fn bucket_signature_is_deterministic() {
        let v = vec![0.5, -0.2, 0.9, 0.1];
        assert_eq!(bucket_signature(4, &v), bucket_signature(4, &v));
    }
}
