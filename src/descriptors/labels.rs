//! Label-id ↔ string map, kept separate from each engine's descriptor data
//! lock (SPEC_FULL.md §4.E), grounded on `DescriptorSetData`'s own
//! `_labels_map_lock` (`original_source/src/vcl/DescriptorSetData.h`).

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Default)]
pub struct LabelMap {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    id_to_label: HashMap<i64, String>,
    label_to_id: HashMap<String, i64>,
}

impl LabelMap {
    pub fn new() -> Self {
        LabelMap::default()
    }

    pub fn set(&self, ids: &[i64], labels: &[String]) {
        let mut inner = self.inner.write();
        for (id, label) in ids.iter().zip(labels.iter()) {
            inner.id_to_label.insert(*id, label.clone());
            inner.label_to_id.insert(label.clone(), *id);
        }
    }

    pub fn label_for(&self, id: i64) -> Option<String> {
        self.inner.read().id_to_label.get(&id).cloned()
    }

    pub fn labels_for(&self, ids: &[i64]) -> Vec<Option<String>> {
        let inner = self.inner.read();
        ids.iter().map(|id| inner.id_to_label.get(id).cloned()).collect()
    }

    pub fn id_for_label(&self, label: &str) -> Option<i64> {
        self.inner.read().label_to_id.get(label).copied()
    }

    pub fn snapshot(&self) -> HashMap<i64, String> {
        self.inner.read().id_to_label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_id_and_label() {
        let map = LabelMap::new();
        map.set(&[1, 2], &["cat".to_string(), "dog".to_string()]);
        assert_eq!(map.label_for(1).as_deref(), Some("cat"));
        assert_eq!(map.id_for_label("dog"), Some(2));
        assert_eq!(map.label_for(99), None);
    }
}
