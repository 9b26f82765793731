//! Video handlers (`AddVideo`/`FindVideo`), ported from
//! `VideoCommand::AddVideo`/`FindVideo`
//! (`original_source/src/VideoCommand.cc`).

use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::AppError;
use crate::graph::builder::QueryBuilder;
use crate::media::video::{Codec, Video, DEFAULT_CONTAINER};
use crate::media::{parse_operations, MediaOp};
use crate::paths;

use super::{obj_or_null, ref_or_allocate, Pending, Staged};

/// Remote/user ops replace the whole byte buffer, which this engine's
/// in-house container has no hook for at the per-frame decode/encode
/// loop (see `media::video::apply_frame_op`); reject them up front with a
/// clear message instead of letting them fail deep inside materialize.
fn reject_unsupported(op: &MediaOp) -> Result<(), AppError> {
    match op {
        MediaOp::SyncRemoteOp { .. } | MediaOp::RemoteOp { .. } | MediaOp::UserOp { .. } => {
            Err(AppError::media("unsupported_operation", "remote/user ops are not supported for video in this engine"))
        }
        _ => Ok(()),
    }
}

pub async fn add_video(ctx: &AppContext, builder: &mut QueryBuilder, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    let bytes = blob.ok_or_else(|| AppError::command("missing_blob", "AddVideo requires exactly one blob"))?;
    let mut video = Video::from_encoded_bytes(bytes.to_vec())?;

    for op in parse_operations(&obj_or_null(body, "operations"))? {
        reject_unsupported(&op)?;
        video.push_op(op);
    }

    let ext = body.get("format").and_then(Value::as_str).unwrap_or("mp4").to_ascii_lowercase();
    let (path, _id) = paths::new_sharded_path(&ctx.config.videos_path(), &ext)?;
    video.store(path.clone())?;
    let abs_path = paths::ensure_absolute(&path)?;

    let ref_id = ref_or_allocate(builder, body);
    let class = body.get("class").and_then(Value::as_str).unwrap_or("VD:VID").to_string();
    let mut props = obj_or_null(body, "properties");
    if !props.is_object() {
        props = json!({});
    }
    props["VDMS_VIDEO_PATH"] = json!(abs_path.display().to_string());
    let constraints = obj_or_null(body, "constraints");
    builder.add_node(ref_id, class, &props, &constraints)?;
    Ok(Staged::one(Pending::None))
}

pub fn find_video(builder: &mut QueryBuilder, body: &Value) -> Result<Staged, AppError> {
    let ref_id = ref_or_allocate(builder, body);
    let class = Some(body.get("class").and_then(Value::as_str).unwrap_or("VD:VID").to_string());
    let link = obj_or_null(body, "link");
    let constraints = obj_or_null(body, "constraints");
    let results = obj_or_null(body, "results");
    let unique = body.get("unique").and_then(Value::as_bool).unwrap_or(false);
    builder.query_node(ref_id, class, &link, &constraints, &results, unique)?;

    let ops = parse_operations(&obj_or_null(body, "operations"))?;
    for op in &ops {
        reject_unsupported(op)?;
    }
    let container = body.get("container").and_then(Value::as_str).map(String::from);
    let codec = body.get("codec").and_then(Value::as_str).and_then(|c| {
        let tag: [u8; 4] = c.as_bytes().try_into().ok()?;
        Codec::from_fourcc(&tag)
    });
    Ok(Staged::one(Pending::Video { ops, container, codec }))
}

/// Re-opens the first matched entity's stored video, replays `ops`
/// (re-encoding to `container`/`codec` if given), and returns the result
/// as the response blob.
pub fn finish(response: &mut Value, ops: Vec<MediaOp>, container: Option<String>, codec: Option<Codec>) -> Result<Option<Vec<u8>>, AppError> {
    let Some(entities) = response.get_mut("entities").and_then(Value::as_array_mut) else {
        return Ok(None);
    };
    let Some(obj) = entities.first_mut().and_then(Value::as_object_mut) else {
        return Ok(None);
    };
    let Some(path_value) = obj.remove("VDMS_VIDEO_PATH") else {
        return Ok(None);
    };
    let path_str = path_value.as_str().ok_or_else(|| AppError::media("bad_path", "VDMS_VIDEO_PATH property was not a string"))?;

    let mut video = Video::from_path(std::path::PathBuf::from(path_str))?;
    for op in ops {
        video.push_op(op);
    }
    let container = container.unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
    let codec = codec.unwrap_or_else(Codec::default_codec);
    let bytes = video.get_encoded(&container, codec)?;
    obj.insert("blob".to_string(), json!(true));
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::adapter::run;
    use crate::graph::engine::GraphEngine;
    use crate::media::video::encode_container;

    fn sample_video() -> Vec<u8> {
        let frames: Vec<crate::media::video::Frame> = (0..4).map(|_| crate::media::video::Frame { rgb: vec![0u8; 2 * 2 * 3] }).collect();
        encode_container(2, 2, 30.0, Codec::H264, &frames)
    }

    #[tokio::test]
    async fn add_video_creates_node_with_path_property() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_root_path = dir.path().to_path_buf();
        let ctx = AppContext::new(config);
        let engine = GraphEngine::new();

        let mut builder = QueryBuilder::new();
        add_video(&ctx, &mut builder, &json!({"class": "VD:VID"}), Some(&sample_video())).await.unwrap();
        let responses = run(&engine, builder.into_groups());
        assert_eq!(responses[0]["status"], 0);
    }

    #[tokio::test]
    async fn add_video_rejects_remote_ops() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_root_path = dir.path().to_path_buf();
        let ctx = AppContext::new(config);
        let mut builder = QueryBuilder::new();
        let body = json!({"operations": [{"type": "user_op", "function": "f"}]});
        assert!(add_video(&ctx, &mut builder, &body, Some(&sample_video())).await.is_err());
    }
}
