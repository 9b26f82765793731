//! Descriptor-set seed scenarios from spec.md §8: flat-engine linearity
//! and quorum classification, driven through the wire protocol end to
//! end (AddDescriptorSet/AddDescriptor/FindDescriptor/ClassifyDescriptor).

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

async fn send(stream: &mut tokio::io::DuplexStream, commands: Value, blobs: Vec<Vec<u8>>) -> Value {
    let envelope = Envelope::new(commands.to_string(), blobs);
    write_envelope(stream, &envelope).await.unwrap();
    let response = read_envelope(stream).await.unwrap().unwrap();
    serde_json::from_str(&response.json).unwrap()
}

fn vector_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[tokio::test]
async fn flat_engine_search_is_exact_for_its_own_inserted_vector() {
    let (mut stream, _dir) = harness().await;

    let create = json!([{"AddDescriptorSet": {"name": "faces", "dimensions": 4, "engine": "FaissFlat", "metric": "L2"}}]);
    let response = send(&mut stream, create, Vec::new()).await;
    assert_eq!(response[0]["status"], 0);

    for i in 0..3 {
        let mut v = vec![0.0f32; 4];
        v[i] = 1.0;
        let add = json!([{"AddDescriptor": {"set": "faces"}}]);
        let response = send(&mut stream, add, vec![vector_bytes(&v)]).await;
        assert_eq!(response[0]["status"], 0);
    }

    let mut query = vec![0.0f32; 4];
    query[1] = 1.0;
    let find = json!([{"FindDescriptor": {"set": "faces", "k": 1}}]);
    let response = send(&mut stream, find, vec![vector_bytes(&query)]).await;
    assert_eq!(response[0]["entities"][0]["id"], 1);
    assert_eq!(response[0]["entities"][0]["distance"], 0.0);
}

#[tokio::test]
async fn classify_with_quorum_resolves_majority_label() {
    let (mut stream, _dir) = harness().await;

    let create = json!([{"AddDescriptorSet": {"name": "people", "dimensions": 4, "engine": "FaissFlat", "metric": "L2"}}]);
    send(&mut stream, create, Vec::new()).await;

    for i in 0..10 {
        let v = vec![1.0f32, 0.0, i as f32 * 0.001, 0.0];
        let add = json!([{"AddDescriptor": {"set": "people", "label": "7"}}]);
        send(&mut stream, add, vec![vector_bytes(&v)]).await;
    }
    for i in 0..10 {
        let v = vec![0.0f32, 1.0, i as f32 * 0.001, 0.0];
        let add = json!([{"AddDescriptor": {"set": "people", "label": "3"}}]);
        send(&mut stream, add, vec![vector_bytes(&v)]).await;
    }

    let query = vec![1.0f32, 0.0, 0.0005, 0.0];
    let classify = json!([{"ClassifyDescriptor": {"set": "people", "k": 7}}]);
    let response = send(&mut stream, classify, vec![vector_bytes(&query)]).await;
    assert_eq!(response[0]["label"], "7");
}

/// A mixed quorum where the majority label spans several distinct
/// descriptor ids and the minority label holds only one: voting by raw
/// neighbor id (every id distinct, every count 1) cannot distinguish this
/// from a tie, but voting by label must still pick the 3-1 majority.
#[tokio::test]
async fn classify_tallies_votes_by_label_not_by_descriptor_id() {
    let (mut stream, _dir) = harness().await;

    let create = json!([{"AddDescriptorSet": {"name": "mixed", "dimensions": 4, "engine": "FaissFlat", "metric": "L2"}}]);
    send(&mut stream, create, Vec::new()).await;

    for (i, label) in ["majority", "majority", "majority", "minority"].iter().enumerate() {
        let v = vec![1.0f32, 0.0, i as f32 * 0.001, 0.0];
        let add = json!([{"AddDescriptor": {"set": "mixed", "label": label}}]);
        send(&mut stream, add, vec![vector_bytes(&v)]).await;
    }

    let query = vec![1.0f32, 0.0, 0.0, 0.0];
    let classify = json!([{"ClassifyDescriptor": {"set": "mixed", "k": 4}}]);
    let response = send(&mut stream, classify, vec![vector_bytes(&query)]).await;
    assert_eq!(response[0]["label"], "majority");
}

#[tokio::test]
async fn find_descriptor_on_unknown_set_fails_cleanly() {
    let (mut stream, _dir) = harness().await;
    let find = json!([{"FindDescriptor": {"set": "missing", "k": 1}}]);
    let response = send(&mut stream, find, vec![vector_bytes(&[0.0, 0.0, 0.0, 0.0])]).await;
    assert_eq!(response[0]["status"], -1);
}

#[tokio::test]
async fn train_descriptor_set_reports_success() {
    let (mut stream, _dir) = harness().await;
    let create = json!([{"AddDescriptorSet": {"name": "trainable", "dimensions": 4, "engine": "FaissIVFFlat", "metric": "L2"}}]);
    send(&mut stream, create, Vec::new()).await;

    for _ in 0..20 {
        let add = json!([{"AddDescriptor": {"set": "trainable"}}]);
        send(&mut stream, add, vec![vector_bytes(&[0.1, 0.2, 0.3, 0.4])]).await;
    }

    let train = json!([{"TrainDescriptorSet": {"set": "trainable"}}]);
    let response = send(&mut stream, train, Vec::new()).await;
    assert_eq!(response[0]["status"], 0);
}
