//! Per-connection session loop, ported from `original_source/src/
//! QueryHandler.cc`'s `QueryHandler::process_message`: receive one
//! envelope, run its commands as a single transaction, send exactly one
//! response envelope, repeat until the peer disconnects.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::error::AppError;
use crate::graph::adapter;
use crate::graph::builder::QueryBuilder;
use crate::handlers;
use crate::protocol::{self, Envelope};
use crate::schema::registry::Registry;
use crate::schema::validate::{validate_command_list, ParsedCommand};

/// Runs one client connection to completion: reads envelopes until the
/// peer closes the stream or a framing error forces disconnect.
pub async fn run_session<S>(ctx: Arc<AppContext>, registry: Arc<Registry>, mut stream: S, peer: std::net::SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!(%peer, "client connected");
    loop {
        let request = match protocol::read_envelope(&mut stream).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "closing connection after framing error");
                break;
            }
        };

        let response = process_envelope(&ctx, &registry, request).await;
        if let Err(e) = protocol::write_envelope(&mut stream, &response).await {
            warn!(%peer, error = %e, "closing connection after write failure");
            break;
        }
    }
    info!(%peer, "client disconnected");
}

/// Parses, validates, executes, and renders one request envelope into its
/// response envelope. Never returns an `Err` itself: every failure mode,
/// including a handler panic, becomes part of the returned envelope's
/// JSON, per spec.md §4.G's error model.
async fn process_envelope(ctx: &AppContext, registry: &Registry, request: Envelope) -> Envelope {
    let commands = match request.commands() {
        Ok(commands) => commands,
        Err(e) => return top_level_error(&e),
    };
    let parsed = match validate_command_list(&commands, registry, request.blobs.len()) {
        Ok(parsed) => parsed,
        Err(e) => return top_level_error(&e),
    };

    let outcome = match AssertUnwindSafe(execute(ctx, parsed, request.blobs)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic_payload) => {
            let msg = panic_message(&panic_payload);
            error!(target: "panic", "session handler panic: {msg}");
            return top_level_error(&AppError::fatal("internal_panic", "internal server error"));
        }
    };

    let (fragments, blobs) = outcome;
    let json = serde_json::to_string(&Value::Array(fragments)).unwrap_or_else(|_| "[]".to_string());
    Envelope::new(json, blobs)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}

fn top_level_error(err: &AppError) -> Envelope {
    let body = json!({ "status": -1, "info": format!("{}: {}", err.code_str(), err.message()) });
    Envelope::new(body.to_string(), Vec::new())
}

/// Stages every command's work onto one shared builder, runs the
/// resulting graph program as a single transaction, then lets each
/// command's pending finishing touch (if any) shape its response
/// fragment.
async fn execute(ctx: &AppContext, parsed: Vec<ParsedCommand>, blobs: Vec<Vec<u8>>) -> (Vec<Value>, Vec<Vec<u8>>) {
    let mut builder = QueryBuilder::new();
    let mut blob_iter = blobs.into_iter();
    let mut staged: Vec<handlers::Staged> = Vec::with_capacity(parsed.len());
    let mut first_error: Option<(usize, AppError)> = None;

    for (i, cmd) in parsed.iter().enumerate() {
        let blob = if cmd.kind.needs_blob() { blob_iter.next() } else { None };
        match handlers::stage(ctx, &mut builder, cmd.kind, &cmd.body, blob.as_deref()).await {
            Ok(s) => staged.push(s),
            Err(e) => {
                first_error = Some((i, e));
                break;
            }
        }
    }

    if let Some((failed_at, err)) = first_error {
        // A handler failed while staging: the enclosing transaction never
        // runs, so none of this envelope's graph mutations take effect.
        // (Media/descriptor side effects a prior command in the same
        // batch already performed, such as writing a blob to disk, are
        // not rolled back; see spec.md §4.G.)
        let fragments = parsed
            .iter()
            .enumerate()
            .map(|(i, _)| {
                if i == failed_at {
                    json!({ "status": -1, "info": format!("{}: {}", err.code_str(), err.message()) })
                } else {
                    json!({ "status": -1, "info": "aborted: prior command in this request failed" })
                }
            })
            .collect();
        return (fragments, Vec::new());
    }

    let op_responses = adapter::run(&ctx.graph, builder.into_groups());

    let mut cursor = 0usize;
    let mut fragments = Vec::with_capacity(staged.len());
    let mut out_blobs = Vec::new();
    for cmd in staged {
        let width = cmd.op_count;
        let mut fragment = match width {
            0 => json!({}),
            1 => op_responses.get(cursor).cloned().unwrap_or_else(|| json!({ "status": -1, "info": "missing response" })),
            _ => json!({ "status": 0, "group_responses": &op_responses[cursor..cursor + width] }),
        };
        cursor += width;

        match handlers::finish(&mut fragment, cmd.pending) {
            Ok(Some(blob)) => out_blobs.push(blob),
            Ok(None) => {}
            Err(e) => fragment = json!({ "status": -1, "info": format!("{}: {}", e.code_str(), e.message()) }),
        }
        fragments.push(fragment);
    }

    (fragments, out_blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx_with_tempdir() -> (AppContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_root_path = dir.path().to_path_buf();
        (AppContext::new(config), dir)
    }

    #[tokio::test]
    async fn add_then_find_round_trip_through_one_envelope_each() {
        let (ctx, _dir) = ctx_with_tempdir();
        let registry = Registry::new();

        let add = Envelope::new(r#"[{"AddNode": {"class": "Person", "properties": {"Name": "Bob"}}}]"#.to_string(), Vec::new());
        let response = process_envelope(&ctx, &registry, add).await;
        let parsed: Value = serde_json::from_str(&response.json).unwrap();
        assert_eq!(parsed[0]["status"], 0);

        let find = Envelope::new(
            r#"[{"FindNode": {"class": "Person", "constraints": {"Name": ["==", "Bob"]}, "results": {"list": ["Name"]}}}]"#.to_string(),
            Vec::new(),
        );
        let response = process_envelope(&ctx, &registry, find).await;
        let parsed: Value = serde_json::from_str(&response.json).unwrap();
        assert_eq!(parsed[0]["returned"], 1);
    }

    #[tokio::test]
    async fn malformed_envelope_yields_single_top_level_error_object() {
        let (ctx, _dir) = ctx_with_tempdir();
        let registry = Registry::new();
        let bad = Envelope::new("not json".to_string(), Vec::new());
        let response = process_envelope(&ctx, &registry, bad).await;
        let parsed: Value = serde_json::from_str(&response.json).unwrap();
        assert!(parsed.is_object());
        assert_eq!(parsed["status"], -1);
    }

    #[tokio::test]
    async fn second_command_failure_aborts_whole_batch() {
        let (ctx, _dir) = ctx_with_tempdir();
        let registry = Registry::new();
        // Well-formed per validate_shape (AddDescriptor only requires a
        // string 'set'), but the named set was never created, so the
        // handler itself rejects it.
        let body = r#"[{"AddNode": {"class": "Person"}}, {"AddDescriptor": {"set": "missing"}}]"#;
        let commands: Value = serde_json::from_str(body).unwrap();
        let request = Envelope::new(commands.to_string(), vec![vec![0u8; 4]]);
        let response = process_envelope(&ctx, &registry, request).await;
        let parsed: Value = serde_json::from_str(&response.json).unwrap();
        assert_eq!(parsed[0]["status"], -1);
        assert_eq!(parsed[1]["status"], -1);
        assert_eq!(ctx.graph.node_count(), 0, "no node should survive because the batch as a whole failed");
    }
}
