//! Image handlers (`AddImage`/`FindImage`), ported from
//! `ImageCommand::AddImage`/`FindImage`
//! (`original_source/src/ImageCommand.cc`).

use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::AppError;
use crate::graph::builder::QueryBuilder;
use crate::media::image::Image;
use crate::media::{parse_operations, MediaOp};
use crate::paths;

use super::{obj_or_null, ref_or_allocate, Pending, Staged};

/// Threads `ops` through `image`, dispatching `SyncRemoteOp`/`UserOp`
/// immediately (they replace the whole byte buffer, so materialization
/// can't defer them the way pixel ops are) and firing `RemoteOp` off in
/// the background per spec.md §4.F ("recorded; actually dispatched
/// asynchronously").
async fn apply_with_side_effects(ctx: &AppContext, image: &mut Image, ops: Vec<MediaOp>) -> Result<(), AppError> {
    for op in ops {
        match op {
            MediaOp::Resize { .. } | MediaOp::Crop { .. } | MediaOp::Threshold { .. } => image.push_op(op),
            MediaOp::SyncRemoteOp { url, params } => {
                let current = image.get_encoded(image.format())?;
                let replaced = ctx.remote.dispatch(&url, &params, &current).await?;
                *image = Image::from_encoded_bytes(replaced)?;
            }
            MediaOp::UserOp { name, params } => {
                let current = image.get_encoded(image.format())?;
                let replaced = ctx.user_ops.call(&name, &params, &current)?;
                *image = Image::from_encoded_bytes(replaced)?;
            }
            MediaOp::RemoteOp { url, params } => {
                let remote = ctx.remote.clone();
                let current = image.get_encoded(image.format())?;
                tokio::spawn(async move {
                    if let Err(e) = remote.dispatch(&url, &params, &current).await {
                        tracing::warn!(error = %e, url = %url, "fire-and-forget remote_op failed");
                    }
                });
            }
            MediaOp::Interval { .. } => return Err(AppError::media("unsupported_operation", "interval is a video-only operation")),
        }
    }
    Ok(())
}

pub async fn add_image(ctx: &AppContext, builder: &mut QueryBuilder, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    let bytes = blob.ok_or_else(|| AppError::command("missing_blob", "AddImage requires exactly one blob"))?;
    let mut image = Image::from_encoded_bytes(bytes.to_vec())?;

    let ops = parse_operations(&obj_or_null(body, "operations"))?;
    apply_with_side_effects(ctx, &mut image, ops).await?;

    let ext = body.get("format").and_then(Value::as_str).unwrap_or("jpg").to_ascii_lowercase();
    let (path, _id) = paths::new_sharded_path(&ctx.config.images_path(), &ext)?;
    image.store(path.clone())?;
    let abs_path = paths::ensure_absolute(&path)?;

    let ref_id = ref_or_allocate(builder, body);
    let class = body.get("class").and_then(Value::as_str).unwrap_or("VD:IMG").to_string();
    let mut props = obj_or_null(body, "properties");
    if !props.is_object() {
        props = json!({});
    }
    props["VDMS_IMAGE_PATH"] = json!(abs_path.display().to_string());
    let constraints = obj_or_null(body, "constraints");
    builder.add_node(ref_id, class, &props, &constraints)?;
    Ok(Staged::one(Pending::None))
}

pub fn find_image(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let class = Some(body.get("class").and_then(Value::as_str).unwrap_or("VD:IMG").to_string());
    let link = obj_or_null(body, "link");
    let constraints = obj_or_null(body, "constraints");
    let results = obj_or_null(body, "results");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.query_node(ref_id, class, &link, &constraints, &results, unique)?;

    let ops = parse_operations(&obj_or_null(body, "operations"))?;
    Ok(Staged::one(Pending::Image { ops }))
}

/// Re-opens the first matched entity's stored image, replays `ops` over
/// it, and returns the resulting bytes as the response blob, stripping
/// the reserved path property so it never reaches the client.
pub fn finish(response: &mut Value, ops: Vec<MediaOp>) -> Result<Option<Vec<u8>>, AppError> {
    let Some(entities) = response.get_mut("entities").and_then(Value::as_array_mut) else {
        return Ok(None);
    };
    let Some(obj) = entities.first_mut().and_then(Value::as_object_mut) else {
        return Ok(None);
    };
    let Some(path_value) = obj.remove("VDMS_IMAGE_PATH") else {
        return Ok(None);
    };
    let path_str = path_value.as_str().ok_or_else(|| AppError::media("bad_path", "VDMS_IMAGE_PATH property was not a string"))?;

    let mut image = Image::from_path(std::path::PathBuf::from(path_str))?;
    for op in ops {
        image.push_op(op);
    }
    let bytes = image.get_encoded(image.format())?;
    obj.insert("blob".to_string(), json!(true));
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::AppContext;
    use crate::graph::adapter::run;
    use crate::graph::engine::GraphEngine;
    use image::{DynamicImage, ImageFormat};

    fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[tokio::test]
    async fn add_image_creates_node_with_path_property() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_root_path = dir.path().to_path_buf();
        let ctx = AppContext::new(config);
        let engine = GraphEngine::new();

        let mut builder = QueryBuilder::new();
        let staged = add_image(&ctx, &mut builder, &json!({"class": "VD:IMG", "properties": {"Name": "a"}}), Some(&sample_png())).await.unwrap();
        assert_eq!(staged.op_count, 1);
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[0]["status"], 0);
    }
}
