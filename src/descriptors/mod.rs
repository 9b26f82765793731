//! Descriptor-set (vector search) storage and query execution
//! (SPEC_FULL.md §4.E).

pub mod distance;
pub mod engine_trait;
pub mod engines;
pub mod handle_cache;
pub mod labels;

pub use engine_trait::{DescriptorEngine, DistanceMetric, EngineKind, SearchResult};
pub use engines::{kind_from_name, new_engine};
pub use handle_cache::{DescriptorSetHandle, HandleCache};
pub use labels::LabelMap;
