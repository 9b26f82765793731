//! Inverted-file descriptor engine, grounded on `FaissDescriptorSet`'s
//! `IndexIVFFlat` back-end (`original_source/src/vcl/FaissDescriptorSet.cc`).
//! Descriptors are assigned to the nearest of `n_lists` coarse centroids at
//! `train()` time; `search()` only scans the `n_probe` closest lists to the
//! query instead of the whole set, trading a little recall for speed on
//! large sets. Requires `train()` before it will accept descriptors, per
//! `DescriptorSet::is_trained()`.

use crate::error::AppError;

use crate::descriptors::distance::{brute_force_search, distance};
use crate::descriptors::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind, SearchResult};
use crate::descriptors::labels::LabelMap;

use super::majority_by_label;

const DEFAULT_N_PROBE: usize = 4;

pub struct IvfFlatEngine {
    dim: u32,
    metric: DistanceMetric,
    n_lists: usize,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<(i64, Vec<f32>)>>,
    next_id: i64,
    trained: bool,
}

impl IvfFlatEngine {
    pub fn new(dim: u32, metric: DistanceMetric, n_lists: usize) -> Self {
        IvfFlatEngine { dim, metric, n_lists: n_lists.max(1), centroids: Vec::new(), lists: Vec::new(), next_id: 0, trained: false }
    }

    fn nearest_list(&self, vector: &[f32]) -> usize {
        self.centroids
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                distance(self.metric, vector, a).partial_cmp(&distance(self.metric, vector, b)).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn probe_order(&self, query: &[f32]) -> Vec<usize> {
        let mut ordered: Vec<usize> = (0..self.centroids.len()).collect();
        ordered.sort_by(|&a, &b| {
            distance(self.metric, query, &self.centroids[a])
                .partial_cmp(&distance(self.metric, query, &self.centroids[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ordered.truncate(DEFAULT_N_PROBE.min(ordered.len().max(1)));
        ordered
    }
}

impl DescriptorEngine for IvfFlatEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::FaissIvfFlat
    }

    fn dimensions(&self) -> u32 {
        self.dim
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn n_descriptors(&self) -> i64 {
        self.lists.iter().map(|l| l.len() as i64).sum()
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn add(&mut self, descriptors: &[f32], n: usize, labels: Option<&[i64]>) -> Result<i64, AppError> {
        if !self.trained {
            return Err(AppError::descriptor("not_trained", "ivf_flat engine requires train() before add()"));
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
            let list_idx = self.nearest_list(&vector);
            self.lists[list_idx].push((id, vector));
        }
        Ok(first_id)
    }

    fn search(&self, queries: &[f32], n: usize, k: usize) -> Result<SearchResult, AppError> {
        if self.centroids.is_empty() {
            return Ok(SearchResult { ids: vec![-1; n * k], distances: vec![f32::MAX; n * k] });
        }
        let dim = self.dim as usize;
        let mut ids = Vec::with_capacity(n * k);
        let mut distances = Vec::with_capacity(n * k);
        for q in 0..n {
            let query = &queries[q * dim..(q + 1) * dim];
            let probed = self.probe_order(query);
            let candidates: Vec<(i64, Vec<f32>)> = probed.iter().flat_map(|&i| self.lists[i].iter().cloned()).collect();
            let partial = brute_force_search(self.metric, dim, &candidates, query, 1, k);
            ids.extend(partial.ids);
            distances.extend(partial.distances);
        }
        Ok(SearchResult { ids, distances })
    }

    fn radius_search(&self, query: &[f32], radius: f32) -> Result<SearchResult, AppError> {
        let mut ids = Vec::new();
        let mut distances = Vec::new();
        for list in &self.lists {
            for (id, vector) in list {
                let d = distance(self.metric, query, vector);
                if d <= radius {
                    ids.push(*id);
                    distances.push(d);
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
            let found = self.lists.iter().flatten().find(|(stored_id, _)| stored_id == id);
            match found {
                Some((_, v)) => out.extend_from_slice(v),
                None => return Err(AppError::descriptor("not_found", format!("no descriptor with id {id}"))),
            }
        }
        Ok(out)
    }

    fn train(&mut self, descriptors: Option<&[f32]>) -> Result<(), AppError> {
        let descriptors = descriptors.ok_or_else(|| AppError::descriptor("training_data_required", "ivf_flat training needs a sample descriptor set"))?;
        let dim = self.dim as usize;
        if dim == 0 || descriptors.len() % dim != 0 {
            return Err(AppError::descriptor("dimension_mismatch", "training data not a multiple of the engine dimension"));
        }
        let count = descriptors.len() / dim;
        let n_lists = self.n_lists.min(count.max(1));
        let stride = (count / n_lists).max(1);
        self.centroids = (0..n_lists).map(|i| descriptors[(i * stride) * dim..(i * stride + 1) * dim].to_vec()).collect();
        self.lists = vec![Vec::new(); self.centroids.len()];
        self.trained = true;
        Ok(())
    }

    fn finalize_index(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn store(&mut self, path: &std::path::Path) -> Result<(), AppError> {
        std::fs::create_dir_all(path).map_err(AppError::from)?;
        let payload = (&self.centroids, &self.lists);
        let bytes = bincode::serialize(&payload).map_err(|e| AppError::descriptor("serialize_error", e.to_string()))?;
        std::fs::write(path.join("ivf_flat.bin"), bytes).map_err(AppError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained_engine() -> IvfFlatEngine {
        let mut engine = IvfFlatEngine::new(2, DistanceMetric::L2, 2);
        engine.train(Some(&[0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0])).unwrap();
        engine
    }

    #[test]
    fn add_before_train_is_rejected() {
        let mut engine = IvfFlatEngine::new(2, DistanceMetric::L2, 2);
        assert!(engine.add(&[0.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn add_after_train_then_search_finds_nearest() {
        let mut engine = trained_engine();
        engine.add(&[0.1, 0.1, 9.9, 9.9], 2, None).unwrap();
        let result = engine.search(&[0.0, 0.0], 1, 1).unwrap();
        assert_eq!(result.ids[0], 0);
    }

    #[test]
    fn get_descriptors_spans_multiple_lists() {
        let mut engine = trained_engine();
        engine.add(&[0.1, 0.1, 9.9, 9.9], 2, None).unwrap();
        let out = engine.get_descriptors(&[0, 1]).unwrap();
        assert_eq!(out.len(), 4);
    }
}
