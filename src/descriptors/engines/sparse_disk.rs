//! Sparse on-disk descriptor engine, grounded on `TDBSparseDescriptorSet`
//! (`original_source/src/vcl/TDBSparseDescriptorSet.cc`): ids are not
//! necessarily dense/contiguous (`get_descriptors` does an id lookup rather
//! than a direct row index, §321/§359 of the upstream file), so entries are
//! kept as explicit `(id, vector)` pairs rather than an array indexed by
//! position, unlike `DenseDiskEngine`.

use std::collections::BTreeMap;

use crate::error::AppError;

use crate::descriptors::distance::brute_force_search;
use crate::descriptors::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind, SearchResult};
use crate::descriptors::labels::LabelMap;

use super::majority_by_label;

pub struct SparseDiskEngine {
    dim: u32,
    metric: DistanceMetric,
    next_id: i64,
    entries: BTreeMap<i64, Vec<f32>>,
}

impl SparseDiskEngine {
    pub fn new(dim: u32, metric: DistanceMetric) -> Self {
        SparseDiskEngine { dim, metric, next_id: 0, entries: BTreeMap::new() }
    }

    fn candidates(&self) -> Vec<(i64, Vec<f32>)> {
        self.entries.iter().map(|(id, v)| (*id, v.clone())).collect()
    }
}

impl DescriptorEngine for SparseDiskEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::TileDbSparse
    }

    fn dimensions(&self) -> u32 {
        self.dim
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn n_descriptors(&self) -> i64 {
        self.entries.len() as i64
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn add(&mut self, descriptors: &[f32], n: usize, labels: Option<&[i64]>) -> Result<i64, AppError> {
        let dim = self.dim as usize;
        if descriptors.len() != n * dim {
            return Err(AppError::descriptor("dimension_mismatch", format!("expected {} floats, got {}", n * dim, descriptors.len())));
        }
        let first_id = self.next_id;
        for i in 0..n {
            let id = self.next_id;
            self.next_id += 1;
            let _ = labels;
            self.entries.insert(id, descriptors[i * dim..(i + 1) * dim].to_vec());
        }
        Ok(first_id)
    }

    fn search(&self, queries: &[f32], n: usize, k: usize) -> Result<SearchResult, AppError> {
        Ok(brute_force_search(self.metric, self.dim as usize, &self.candidates(), queries, n, k))
    }

    fn radius_search(&self, query: &[f32], radius: f32) -> Result<SearchResult, AppError> {
        let mut ids = Vec::new();
        let mut distances = Vec::new();
        for (id, vector) in &self.entries {
            let d = crate::descriptors::distance::distance(self.metric, query, vector);
            if d <= radius {
                ids.push(*id);
                distances.push(d);
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
            let row = self.entries.get(id).ok_or_else(|| AppError::descriptor("not_found", format!("no descriptor with id {id}")))?;
            out.extend_from_slice(row);
        }
        Ok(out)
    }

    fn train(&mut self, _descriptors: Option<&[f32]>) -> Result<(), AppError> {
        Ok(())
    }

    fn finalize_index(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn store(&mut self, path: &std::path::Path) -> Result<(), AppError> {
        std::fs::create_dir_all(path).map_err(AppError::from)?;
        let payload: Vec<(i64, Vec<f32>)> = self.entries.iter().map(|(id, v)| (*id, v.clone())).collect();
        let bytes = bincode::serialize(&payload).map_err(|e| AppError::descriptor("serialize_error", e.to_string()))?;
        std::fs::write(path.join("sparse.bin"), bytes).map_err(AppError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_descriptors_by_noncontiguous_id() {
        let mut engine = SparseDiskEngine::new(2, DistanceMetric::L2);
        engine.add(&[1.0, 1.0], 1, None).unwrap();
        engine.add(&[2.0, 2.0], 1, None).unwrap();
        let out = engine.get_descriptors(&[1]).unwrap();
        assert_eq!(out, vec![2.0, 2.0]);
    }

    #[test]
    fn search_orders_by_distance() {
        let mut engine = SparseDiskEngine::new(2, DistanceMetric::L2);
        engine.add(&[5.0, 5.0, 0.0, 0.0], 2, None).unwrap();
        let result = engine.search(&[0.1, 0.1], 1, 1).unwrap();
        assert_eq!(result.ids[0], 1);
    }
}
