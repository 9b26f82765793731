//! Process-wide cache of open descriptor-set handles, grounded on the
//! teacher's connection-pool pattern (`Arc<Mutex<...>>` entries behind one
//! outer lock guarding the map itself) generalized from a pool of
//! connections to a pool of descriptor-set engines: each set is opened at
//! most once per process and shared by every session that names it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::AppError;

use super::engine_trait::{DescriptorEngine, DistanceMetric, EngineKind};
use super::engines::new_engine;
use super::labels::LabelMap;

pub struct DescriptorSetHandle {
    pub engine: Mutex<Box<dyn DescriptorEngine>>,
    pub labels: LabelMap,
    pub path: PathBuf,
}

#[derive(Default)]
pub struct HandleCache {
    sets: RwLock<HashMap<String, Arc<DescriptorSetHandle>>>,
}

impl HandleCache {
    pub fn new() -> Self {
        HandleCache::default()
    }

    /// Returns the existing handle for `name` if already open, without
    /// creating one.
    pub fn get(&self, name: &str) -> Option<Arc<DescriptorSetHandle>> {
        self.sets.read().get(name).cloned()
    }

    /// Opens (creating if necessary) the descriptor set named `name`,
    /// rooted at `path`.
    pub fn get_or_create(&self, name: &str, path: PathBuf, kind: EngineKind, dim: u32, metric: DistanceMetric) -> Result<Arc<DescriptorSetHandle>, AppError> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let mut sets = self.sets.write();
        if let Some(existing) = sets.get(name) {
            return Ok(existing.clone());
        }
        let engine = new_engine(kind, dim, metric)?;
        let handle = Arc::new(DescriptorSetHandle { engine: Mutex::new(engine), labels: LabelMap::new(), path });
        sets.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn names(&self) -> Vec<String> {
        self.sets.read().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<DescriptorSetHandle>> {
        self.sets.write().remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_handle_on_second_call() {
        let cache = HandleCache::new();
        let a = cache.get_or_create("faces", PathBuf::from("/tmp/faces"), EngineKind::FaissFlat, 128, DistanceMetric::L2).unwrap();
        let b = cache.get_or_create("faces", PathBuf::from("/tmp/faces-ignored"), EngineKind::FaissFlat, 128, DistanceMetric::L2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn remove_evicts_the_handle() {
        let cache = HandleCache::new();
        cache.get_or_create("faces", PathBuf::from("/tmp/faces"), EngineKind::FaissFlat, 128, DistanceMetric::L2).unwrap();
        assert!(cache.remove("faces").is_some());
        assert!(cache.get("faces").is_none());
    }
}
