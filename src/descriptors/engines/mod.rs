//! The five concrete `DescriptorEngine` back-ends.

mod dense_disk;
mod flat;
mod ivf;
mod lsh;
mod sparse_disk;

pub use dense_disk::DenseDiskEngine;
pub use flat::FlatEngine;
pub use ivf::IvfFlatEngine;
pub use lsh::LshEngine;
pub use sparse_disk::SparseDiskEngine;

use crate::error::AppError;

use super::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind};
use super::labels::LabelMap;

/// Shared quorum-voting step for every engine's `classify`, grounded on
/// `FaissDescriptorSet::classify` (`original_source/src/vcl/
/// FaissDescriptorSet.cc`): each neighbor id is resolved to its label
/// *before* counting, so two neighbors that happen to carry the same
/// label tally together even though their descriptor ids differ. Ties
/// are broken first-seen, matching the original's `max <
/// map_voting[label_id]` strict update. Neighbors with no assigned label
/// (or a `-1` not-found slot) don't get a vote. Returns the descriptor id
/// of a neighbor carrying the winning label (or `-1` if nothing voted),
/// so callers can resolve the label string the same way a search result
/// would.
pub(super) fn majority_by_label(neighbor_ids: &[i64], labels: &LabelMap) -> i64 {
    use std::collections::HashMap;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut winner_id = -1i64;
    let mut max = 0usize;

    for &id in neighbor_ids {
        if id < 0 {
            continue;
        }
        let Some(label) = labels.label_for(id) else { continue };
        let count = counts.entry(label).or_insert(0);
        *count += 1;
        if *count > max {
            max = *count;
            winner_id = id;
        }
    }
    winner_id
}

/// Constructs a fresh, untrained engine of the requested kind.
pub fn new_engine(kind: EngineKind, dim: u32, metric: DistanceMetric) -> Result<Box<dyn DescriptorEngine>, AppError> {
    Ok(match kind {
        EngineKind::FaissFlat => Box::new(FlatEngine::new(dim, metric)),
        EngineKind::FaissIvfFlat => Box::new(IvfFlatEngine::new(dim, metric, 16)),
        EngineKind::TileDbDense => Box::new(DenseDiskEngine::new(dim, metric)),
        EngineKind::TileDbSparse => Box::new(SparseDiskEngine::new(dim, metric)),
        EngineKind::Flinng => Box::new(LshEngine::new(dim, metric)),
    })
}

pub fn kind_from_name(name: &str) -> Result<EngineKind, AppError> {
    match name {
        "FaissFlat" => Ok(EngineKind::FaissFlat),
        "FaissIVFFlat" => Ok(EngineKind::FaissIvfFlat),
        "TileDBDense" => Ok(EngineKind::TileDbDense),
        "TileDBSparse" => Ok(EngineKind::TileDbSparse),
        "Flinng" => Ok(EngineKind::Flinng),
        other => Err(AppError::descriptor("unknown_engine", format!("unrecognized descriptor-set engine '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_matches_requested_kind() {
        let engine = new_engine(EngineKind::FaissFlat, 4, DistanceMetric::L2).unwrap();
        assert_eq!(engine.kind(), EngineKind::FaissFlat);
    }

    #[test]
    fn kind_from_name_rejects_unknown() {
        assert!(kind_from_name("NotARealEngine").is_err());
    }
}
