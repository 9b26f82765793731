//! Sharded artifact path helper, generalized from the teacher's
//! `Store::db_dir` path-joining convention (`storage.rs`) to the shape
//! blob/image/video/descriptor storage all share: a two-level hex-prefix
//! shard directory under a root, keyed by a random id, so no single
//! directory ever holds an unbounded number of entries.

use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;
use uuid::Uuid;

use crate::error::AppError;

/// Build `<root>/<2-hex>/<2-hex>/<id-hex>.<ext>` for a freshly generated
/// artifact id, creating the shard directories if needed.
pub fn new_sharded_path(root: &Path, ext: &str) -> Result<(PathBuf, String), AppError> {
    let id = Uuid::new_v4().simple().to_string();
    let path = sharded_path_for_id(root, &id, ext);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(AppError::from)?;
    }
    Ok((path, id))
}

pub fn sharded_path_for_id(root: &Path, id: &str, ext: &str) -> PathBuf {
    let shard_a = &id[0..2];
    let shard_b = &id[2..4];
    let file_name = if ext.is_empty() { id.to_string() } else { format!("{id}.{ext}") };
    root.join(shard_a).join(shard_b).join(file_name)
}

/// Every media/descriptor path the core hands back to a client or stores
/// in a node property must be absolute, so a later session (possibly with
/// a different working directory) can still resolve it.
pub fn ensure_absolute(path: &Path) -> Result<PathBuf, AppError> {
    path.absolutize()
        .map(|p| p.into_owned())
        .map_err(|e| AppError::storage("bad_path", format!("could not absolutize '{}': {e}", path.display())))
}
