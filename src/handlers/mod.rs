//! Command handlers: JSON command body (+ optional blob) -> staged
//! `GraphOp`s and media/descriptor side effects, ported from the
//! construct-command/construct-response split in `original_source/src/
//! {RSCommand,ImageCommand,VideoCommand,DescriptorsCommand}.{h,cc}`.
//!
//! Each handler only ever talks to the graph through a shared
//! `QueryBuilder` (spec.md §4.H: "Handlers never reach into the
//! transaction directly"). Because one original JSON command can stage
//! more than one `GraphOp` (an `AddImage` that also links to an existing
//! node, say), a handler reports how many groups it pushed so the caller
//! can re-group the adapter's flat per-op response list back into one
//! fragment per original command.

pub mod connection;
pub mod descriptor;
pub mod entity;
pub mod image;
pub mod video;

use serde_json::Value;

use crate::context::AppContext;
use crate::error::AppError;
use crate::graph::builder::QueryBuilder;
use crate::media::video::Codec;
use crate::media::MediaOp;
use crate::schema::registry::CommandKind;

/// What a handler needs done once its staged `GraphOp`s have executed
/// inside the envelope's transaction.
pub enum Pending {
    /// The adapter's own response fragment is final as-is.
    None,
    /// Re-open the media file named by the query result's reserved path
    /// property, replay `ops` over it, and attach the bytes as an
    /// outgoing blob.
    Image { ops: Vec<MediaOp> },
    Video { ops: Vec<MediaOp>, container: Option<String>, codec: Option<Codec> },
    /// Wholesale replace the adapter's response fragment: descriptor
    /// search/classify results never come from the graph engine at all.
    Replace(Value),
}

/// One command's staged work.
pub struct Staged {
    pub op_count: usize,
    pub pending: Pending,
}

impl Staged {
    fn one(pending: Pending) -> Staged {
        Staged { op_count: 1, pending }
    }
    fn zero(pending: Pending) -> Staged {
        Staged { op_count: 0, pending }
    }
}

/// `_ref`/`ref` are accepted interchangeably as the client-assigned
/// reference id, matching the `_ref`/`ref` naming seen across spec.md's
/// own worked examples.
pub(crate) fn command_ref(body: &Value) -> Option<i64> {
    body.get("_ref").or_else(|| body.get("ref")).and_then(Value::as_i64)
}

pub(crate) fn ref_or_allocate(builder: &mut QueryBuilder, body: &Value) -> i64 {
    command_ref(body).unwrap_or_else(|| builder.get_available_reference())
}

pub(crate) fn obj_or_null(body: &Value, key: &str) -> Value {
    body.get(key).cloned().unwrap_or(Value::Null)
}

/// Stages `kind`'s work onto `builder` and returns what finishing touch
/// (if any) its response needs after the transaction has run.
pub async fn stage(ctx: &AppContext, builder: &mut QueryBuilder, kind: CommandKind, body: &Value, blob: Option<&[u8]>) -> Result<Staged, AppError> {
    match kind {
        CommandKind::AddNode => entity::add_node(builder, body),
        CommandKind::UpdateNode => entity::update_node(builder, body),
        CommandKind::FindNode => entity::find_node(builder, body),
        CommandKind::AddEdge => connection::add_edge(builder, body),
        CommandKind::UpdateEdge => connection::update_edge(builder, body),
        CommandKind::FindEdge => connection::find_edge(builder, body),
        CommandKind::AddImage => image::add_image(ctx, builder, body, blob).await,
        CommandKind::UpdateImage => entity::update_node(builder, body),
        CommandKind::FindImage => image::find_image(builder, body),
        CommandKind::AddVideo => video::add_video(ctx, builder, body, blob).await,
        CommandKind::UpdateVideo => entity::update_node(builder, body),
        CommandKind::FindVideo => video::find_video(builder, body),
        CommandKind::AddDescriptorSet => descriptor::add_descriptor_set(ctx, builder, body),
        CommandKind::AddDescriptor => descriptor::add_descriptor(ctx, builder, body, blob),
        CommandKind::FindDescriptor => descriptor::find_descriptor(ctx, body, blob),
        CommandKind::ClassifyDescriptor => descriptor::classify_descriptor(ctx, body, blob),
        CommandKind::TrainDescriptorSet => descriptor::train_descriptor_set(ctx, body),
    }
}

/// Applies a handler's `Pending` finishing touch to its (already status-
/// stamped) response fragment, returning a blob to append to the outgoing
/// envelope if one was produced.
pub fn finish(response: &mut Value, pending: Pending) -> Result<Option<Vec<u8>>, AppError> {
    match pending {
        Pending::None => Ok(None),
        Pending::Replace(value) => {
            *response = value;
            Ok(None)
        }
        Pending::Image { ops } => image::finish(response, ops),
        Pending::Video { ops, container, codec } => video::finish(response, ops, container, codec),
    }
}
