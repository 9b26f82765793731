//! Descriptor-set handlers (`AddDescriptorSet`/`AddDescriptor`/
//! `FindDescriptor`/`ClassifyDescriptor`/`TrainDescriptorSet`), ported
//! from `DescriptorsCommand::*` (`original_source/src/
//! DescriptorsCommand.cc`). Unlike the graph/media handlers, most of
//! these never touch the shared `QueryBuilder`: the descriptor engine is
//! its own store, addressed by set name through the process-wide
//! `HandleCache`, and its search/classify results are not graph
//! projections at all.

use serde_json::{json, Value};

use crate::context::AppContext;
use crate::descriptors::{DistanceMetric, EngineKind};
use crate::error::AppError;
use crate::graph::builder::QueryBuilder;
use crate::paths;

use super::{obj_or_null, ref_or_allocate, Pending, Staged};

fn metric_from_body(body: &Value) -> DistanceMetric {
    match body.get("metric").and_then(Value::as_str) {
        Some("IP") | Some("ip") => DistanceMetric::Ip,
        _ => DistanceMetric::L2,
    }
}

fn engine_from_body(body: &Value) -> Result<EngineKind, AppError> {
    let name = body.get("engine").and_then(Value::as_str).unwrap_or("FaissFlat");
    crate::descriptors::kind_from_name(name)
}

/// Lower bound on how many (duplicated) sample vectors an auto-train pass
/// feeds an untrained engine on its first `AddDescriptor`, covering the
/// default `n_lists`/bucket counts the engines seed themselves with.
const MIN_AUTO_TRAIN_COPIES: usize = 32;

fn required_set_name(body: &Value) -> Result<String, AppError> {
    body.get("set")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| AppError::command("missing_field", "'set' must be a string"))
}

/// Reinterprets a blob as a row-major `n * dim` buffer of little-endian
/// `f32`s, matching the wire convention `AddDescriptor`'s blob uses.
fn floats_from_blob(bytes: &[u8], dim: u32) -> Result<Vec<f32>, AppError> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::descriptor("bad_descriptor_blob", "descriptor blob length is not a multiple of 4 bytes"));
    }
    let floats: Vec<f32> = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
    if floats.len() % dim as usize != 0 {
        return Err(AppError::descriptor(
            "dimension_mismatch",
            format!("blob holds {} floats, not a multiple of dimension {dim}", floats.len()),
        ));
    }
    Ok(floats)
}

pub fn add_descriptor_set(ctx: &AppContext, builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::command("missing_field", "AddDescriptorSet: 'name' must be a string"))?
        .to_string();
    let dim = body
        .get("dimensions")
        .and_then(Value::as_u64)
        .ok_or_else(|| AppError::command("missing_field", "AddDescriptorSet: 'dimensions' must be an integer"))? as u32;
    let kind = engine_from_body(body)?;
    let metric = metric_from_body(body);

    let path = ctx.config.descriptors_path().join(&name);
    std::fs::create_dir_all(&path).map_err(AppError::from)?;
    ctx.descriptors.get_or_create(&name, path.clone(), kind, dim, metric)?;
    let abs_path = paths::ensure_absolute(&path)?;

    let ref_id = ref_or_allocate(builder, body);
    let mut props = obj_or_null(body, "properties");
    if !props.is_object() {
        props = json!({});
    }
    props["VDMS_DESCRIPTOR_SET_PATH"] = json!(abs_path.display().to_string());
    let constraints = obj_or_null(body, "constraints");
    builder.add_node(ref_id, "VD:DESCRIPTOR_SET".to_string(), &props, &constraints)?;
    Ok(Staged::one(Pending::None))
}

pub fn add_descriptor(ctx: &AppContext, builder: &mut QueryBuilder, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    let set_name = required_set_name(body)?;
    let bytes = blob.ok_or_else(|| AppError::command("missing_blob", "AddDescriptor requires exactly one blob"))?;
    let handle = ctx
        .descriptors
        .get(&set_name)
        .ok_or_else(|| AppError::descriptor("unknown_set", format!("descriptor set '{set_name}' has not been created")))?;

    let dim = {
        let engine = handle.engine.lock();
        engine.dimensions()
    };
    let floats = floats_from_blob(bytes, dim)?;
    let label = body.get("label").and_then(Value::as_str).map(String::from);

    let id = {
        let mut engine = handle.engine.lock();
        if !engine.is_trained() {
            // Engines that require training (inverted-file, LSH) take
            // their training sample from the first add batch, padded
            // with synthetic copies when that batch is too small to
            // seed every list/bucket.
            let padded: Vec<f32> = floats.iter().cloned().cycle().take(floats.len() * MIN_AUTO_TRAIN_COPIES).collect();
            engine.train(Some(&padded))?;
        }
        engine.add(&floats, 1, None)?
    };
    if let Some(label) = &label {
        handle.labels.set(&[id], std::slice::from_ref(label));
    }
    {
        let mut engine = handle.engine.lock();
        engine.store(&handle.path)?;
    }

    let ref_id = ref_or_allocate(builder, body);
    let mut props = obj_or_null(body, "properties");
    if !props.is_object() {
        props = json!({});
    }
    props["set"] = json!(set_name);
    props["VDMS_DESCRIPTOR_ID"] = json!(id);
    if let Some(label) = &label {
        props["label"] = json!(label);
    }
    builder.add_node(ref_id, "VD:DESCRIPTOR".to_string(), &props, &Value::Null)?;
    Ok(Staged::one(Pending::None))
}

/// When a blob is given, runs a k-NN or radius search (blob presence is
/// the signal, per spec.md §4.H); otherwise reports the set's own
/// metadata, since this handler never queries the graph.
pub fn find_descriptor(ctx: &AppContext, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    let set_name = required_set_name(body)?;
    let handle = ctx
        .descriptors
        .get(&set_name)
        .ok_or_else(|| AppError::descriptor("unknown_set", format!("descriptor set '{set_name}' has not been created")))?;

    let Some(bytes) = blob else {
        let engine = handle.engine.lock();
        let body = json!({
            "status": 0,
            "n_descriptors": engine.n_descriptors(),
            "is_trained": engine.is_trained(),
        });
        return Ok(Staged::zero(Pending::Replace(body)));
    };

    let dim = {
        let engine = handle.engine.lock();
        engine.dimensions()
    };
    let query = floats_from_blob(bytes, dim)?;

    let result = if let Some(radius) = body.get("radius").and_then(Value::as_f64) {
        let engine = handle.engine.lock();
        engine.radius_search(&query, radius as f32)?
    } else {
        let k = body.get("k").and_then(Value::as_u64).unwrap_or(1) as usize;
        let engine = handle.engine.lock();
        engine.search(&query, 1, k)?
    };

    let labels = handle.labels.labels_for(&result.ids);
    let entities: Vec<Value> = result
        .ids
        .iter()
        .zip(result.distances.iter())
        .zip(labels.iter())
        .filter(|((id, _), _)| **id >= 0)
        .map(|((id, dist), label)| {
            let mut entity = json!({ "id": id, "distance": dist });
            if let Some(label) = label {
                entity["label"] = json!(label);
            }
            entity
        })
        .collect();

    let response = json!({ "status": 0, "returned": entities.len(), "entities": entities });
    Ok(Staged::zero(Pending::Replace(response)))
}

pub fn classify_descriptor(ctx: &AppContext, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    let set_name = required_set_name(body)?;
    let bytes = blob.ok_or_else(|| AppError::command("missing_blob", "ClassifyDescriptor requires exactly one blob"))?;
    let handle = ctx
        .descriptors
        .get(&set_name)
        .ok_or_else(|| AppError::descriptor("unknown_set", format!("descriptor set '{set_name}' has not been created")))?;

    let dim = {
        let engine = handle.engine.lock();
        engine.dimensions()
    };
    let query = floats_from_blob(bytes, dim)?;
    let quorum = body.get("k").and_then(Value::as_u64).unwrap_or(1) as usize;

    let label_ids = {
        let engine = handle.engine.lock();
        engine.classify(&query, 1, quorum, &handle.labels)?
    };
    let label = label_ids.first().and_then(|&id| if id >= 0 { handle.labels.label_for(id) } else { None });

    Ok(Staged::zero(Pending::Replace(json!({ "status": 0, "label": label }))))
}

pub fn train_descriptor_set(ctx: &AppContext, body: &Value) -> Result<Staged, AppError> {
    let set_name = required_set_name(body)?;
    let handle = ctx
        .descriptors
        .get(&set_name)
        .ok_or_else(|| AppError::descriptor("unknown_set", format!("descriptor set '{set_name}' has not been created")))?;

    let mut engine = handle.engine.lock();
    if !engine.is_trained() {
        // Nothing has been added yet to seed a training sample from; this
        // mirrors spec.md's "valid only for engines that require it" note
        // for engines that are already trained (flat) or self-train (LSH).
        engine.train(None)?;
    }
    engine.finalize_index()?;
    engine.store(&handle.path)?;
    Ok(Staged::zero(Pending::Replace(json!({ "status": 0 }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::adapter::run;
    use crate::graph::engine::GraphEngine;

    fn ctx_with_tempdir() -> (AppContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_root_path = dir.path().to_path_buf();
        (AppContext::new(config), dir)
    }

    fn vec_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn add_descriptor_set_creates_node_and_handle() {
        let (ctx, _dir) = ctx_with_tempdir();
        let engine = GraphEngine::new();
        let mut builder = QueryBuilder::new();
        add_descriptor_set(&ctx, &mut builder, &json!({"name": "faces", "dimensions": 4})).unwrap();
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[0]["status"], 0);
        assert!(ctx.descriptors.get("faces").is_some());
    }

    #[test]
    fn add_then_find_descriptor_by_blob() {
        let (ctx, _dir) = ctx_with_tempdir();
        let engine = GraphEngine::new();
        let mut builder = QueryBuilder::new();
        add_descriptor_set(&ctx, &mut builder, &json!({"name": "faces", "dimensions": 4})).unwrap();
        run(&engine, builder.into_groups());

        let mut builder = QueryBuilder::new();
        add_descriptor(&ctx, &mut builder, &json!({"set": "faces", "label": "alice"}), Some(&vec_bytes(&[1.0, 0.0, 0.0, 0.0]))).unwrap();
        run(&engine, builder.into_groups());

        let staged = find_descriptor(&ctx, &json!({"set": "faces", "k": 1}), Some(&vec_bytes(&[1.0, 0.0, 0.0, 0.0]))).unwrap();
        match staged.pending {
            Pending::Replace(value) => {
                assert_eq!(value["entities"][0]["id"], 0);
                assert_eq!(value["entities"][0]["label"], "alice");
            }
            _ => panic!("expected Replace"),
        }
    }

    #[test]
    fn find_descriptor_on_unknown_set_errors() {
        let (ctx, _dir) = ctx_with_tempdir();
        assert!(find_descriptor(&ctx, &json!({"set": "missing"}), None).is_err());
    }
}
