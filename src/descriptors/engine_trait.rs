//! The uniform descriptor-set contract, ported from `VCL::DescriptorSet`
//! (`original_source/include/vcl/DescriptorSet.h`): one trait implemented
//! by all five back-ends so the handler layer never needs to know which
//! concrete engine a given set was created with.

use crate::error::AppError;

use super::labels::LabelMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L2,
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    FaissFlat,
    FaissIvfFlat,
    TileDbDense,
    TileDbSparse,
    Flinng,
}

/// Result of a k-nearest-neighbor search over `n` queries: `ids[i]` and
/// `distances[i]` are each padded with `-1`/`f32::MAX` past the number of
/// neighbors actually found for query `i`, matching `DescriptorSet::search`'s
/// padding convention.
pub struct SearchResult {
    pub ids: Vec<i64>,
    pub distances: Vec<f32>,
}

/// A single descriptor-set back-end. `add`/`search`/`radius_search`/
/// `classify`/`get_descriptors`/`train`/`finalize_index`/`store` mirror
/// `DescriptorSet`'s core interface one-to-one.
pub trait DescriptorEngine: Send {
    fn kind(&self) -> EngineKind;
    fn dimensions(&self) -> u32;
    fn metric(&self) -> DistanceMetric;
    fn n_descriptors(&self) -> i64;
    fn is_trained(&self) -> bool;

    /// Inserts `n` descriptors (`descriptors.len() == n * dimensions()`)
    /// with optional parallel labels, returning the id assigned to the
    /// first inserted descriptor (ids are sequential from there).
    fn add(&mut self, descriptors: &[f32], n: usize, labels: Option<&[i64]>) -> Result<i64, AppError>;

    fn search(&self, queries: &[f32], n: usize, k: usize) -> Result<SearchResult, AppError>;

    /// Single-query radius search (the upstream API only ever allows one
    /// query here, to keep the result shape fixed-size per call).
    fn radius_search(&self, query: &[f32], radius: f32) -> Result<SearchResult, AppError>;

    /// Quorum-votes each query's `quorum` nearest neighbors by their
    /// assigned label (via `labels`), not by raw descriptor id — two
    /// neighbors with the same label must count as one vote bucket.
    fn classify(&self, descriptors: &[f32], n: usize, quorum: usize, labels: &LabelMap) -> Result<Vec<i64>, AppError>;

    fn get_descriptors(&self, ids: &[i64]) -> Result<Vec<f32>, AppError>;

    fn train(&mut self, descriptors: Option<&[f32]>) -> Result<(), AppError>;

    /// Builds whatever the engine needs to serve searches (index
    /// structures over already-added descriptors); a no-op for engines
    /// that are always query-ready.
    fn finalize_index(&mut self) -> Result<(), AppError>;

    /// Persists the engine's full state to `path` (its own set directory
    /// for in-memory engines like Faiss; a flush for always-on-disk
    /// engines like the TileDB-backed ones).
    fn store(&mut self, path: &std::path::Path) -> Result<(), AppError>;
}
