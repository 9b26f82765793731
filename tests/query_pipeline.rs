//! End-to-end graph query scenarios driven through a real socket-shaped
//! duplex stream and `session::run_session`, covering the seed scenarios
//! and universal properties from spec.md §8.

use std::sync::Arc;

use serde_json::{json, Value};
use vdms::config::Config;
use vdms::context::AppContext;
use vdms::protocol::{read_envelope, write_envelope, Envelope};
use vdms::schema::registry::Registry;

async fn harness() -> (tokio::io::DuplexStream, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.db_root_path = dir.path().to_path_buf();
    let ctx = Arc::new(AppContext::new(config));
    let registry = Arc::new(Registry::new());

    let (client, server) = tokio::io::duplex(1 << 20);
    let peer = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    tokio::spawn(vdms::session::run_session(ctx, registry, server, peer));
    (client, dir)
}

async fn roundtrip(stream: &mut tokio::io::DuplexStream, commands: Value) -> Value {
    let envelope = Envelope::new(commands.to_string(), Vec::new());
    write_envelope(stream, &envelope).await.unwrap();
    let response = read_envelope(stream).await.unwrap().unwrap();
    serde_json::from_str(&response.json).unwrap()
}

#[tokio::test]
async fn graph_add_and_find_round_trip() {
    let (mut stream, _dir) = harness().await;
    let commands = json!([
        {"AddNode": {"class": "Patient", "_ref": 1, "properties": {"Name": "A", "Age": 30}}},
        {"FindNode": {"class": "Patient", "constraints": {"Name": ["==", "A"]}, "results": {"list": ["Age"]}}},
    ]);
    let response = roundtrip(&mut stream, commands).await;
    assert_eq!(response[0]["status"], 0);
    assert_eq!(response[1]["status"], 0);
    assert_eq!(response[1]["returned"], 1);
    assert_eq!(response[1]["entities"][0]["Age"], 30);
}

#[tokio::test]
async fn unique_constraint_add_reports_exists_and_does_not_duplicate() {
    let (mut stream, _dir) = harness().await;
    let first = json!([{"AddNode": {"class": "User", "properties": {"Email": "a@example.com"}}}]);
    let response = roundtrip(&mut stream, first).await;
    assert_eq!(response[0]["status"], 0);

    let second = json!([{
        "AddNode": {
            "class": "User",
            "properties": {"Email": "a@example.com"},
            "constraints": {"Email": ["==", "a@example.com"]},
        }
    }]);
    let response = roundtrip(&mut stream, second).await;
    assert_eq!(response[0]["status"], 2, "second add with a matching constraint should report Exists");

    let count = json!([{"FindNode": {"class": "User", "results": {"count": true}}}]);
    let response = roundtrip(&mut stream, count).await;
    assert_eq!(response[0]["count"], 1, "node count must not grow on a duplicate-constraint add");
}

#[tokio::test]
async fn failed_command_in_batch_leaves_graph_state_untouched() {
    let (mut stream, _dir) = harness().await;
    let commands = json!([
        {"AddNode": {"class": "Patient", "properties": {"Name": "A"}}},
        {"AddDescriptor": {"set": "nonexistent"}},
    ]);
    let envelope = Envelope::new(commands.to_string(), vec![vec![0u8; 4]]);
    write_envelope(&mut stream, &envelope).await.unwrap();
    let response = read_envelope(&mut stream).await.unwrap().unwrap();
    let parsed: Value = serde_json::from_str(&response.json).unwrap();
    assert_eq!(parsed[0]["status"], -1);
    assert_eq!(parsed[1]["status"], -1);

    let count = json!([{"FindNode": {"class": "Patient", "results": {"count": true}}}]);
    let response = roundtrip(&mut stream, count).await;
    assert_eq!(response[0]["count"], 0, "the aborted AddNode must not have persisted");
}

#[tokio::test]
async fn ref_renumbering_does_not_change_the_observed_result() {
    let (mut stream_a, _dir_a) = harness().await;
    let (mut stream_b, _dir_b) = harness().await;

    let low_refs = json!([
        {"AddNode": {"class": "Item", "_ref": 1, "properties": {"Sku": "x"}}},
        {"AddNode": {"class": "Owner", "_ref": 2, "properties": {"Sku": "x"}}},
        {"AddEdge": {"ref1": 1, "ref2": 2, "class": "Owns"}},
    ]);
    let high_refs = json!([
        {"AddNode": {"class": "Item", "_ref": 97, "properties": {"Sku": "x"}}},
        {"AddNode": {"class": "Owner", "_ref": 98, "properties": {"Sku": "x"}}},
        {"AddEdge": {"ref1": 97, "ref2": 98, "class": "Owns"}},
    ]);

    let response_a = roundtrip(&mut stream_a, low_refs).await;
    let response_b = roundtrip(&mut stream_b, high_refs).await;
    assert_eq!(response_a[2]["status"], 0);
    assert_eq!(response_b[2]["status"], 0);
}

#[tokio::test]
async fn malformed_json_yields_single_top_level_error() {
    let (mut stream, _dir) = harness().await;
    let envelope = Envelope::new("{not json".to_string(), Vec::new());
    write_envelope(&mut stream, &envelope).await.unwrap();
    let response = read_envelope(&mut stream).await.unwrap().unwrap();
    let parsed: Value = serde_json::from_str(&response.json).unwrap();
    assert!(parsed.is_object());
    assert_eq!(parsed["status"], -1);
}
