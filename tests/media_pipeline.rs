//! Image-resize and video-interval seed scenarios from spec.md §8, driven
//! through the wire protocol end to end (AddImage/FindImage,
//! AddVideo/FindVideo).

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde_json::{json, Value};
use vdms::config::Config;
use vdms::context::AppContext;
use vdms::media::video::{encode_container, Codec, Frame, Video};
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

async fn send(stream: &mut tokio::io::DuplexStream, commands: Value, blobs: Vec<Vec<u8>>) -> (Value, Vec<Vec<u8>>) {
    let envelope = Envelope::new(commands.to_string(), blobs);
    write_envelope(stream, &envelope).await.unwrap();
    let response = read_envelope(stream).await.unwrap().unwrap();
    (serde_json::from_str(&response.json).unwrap(), response.blobs)
}

fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

#[tokio::test]
async fn image_resize_then_find_returns_resized_blob() {
    let (mut stream, _dir) = harness().await;

    let add = json!([{
        "AddImage": {"class": "VD:IMG", "operations": [{"type": "resize", "width": 100, "height": 100}]},
    }]);
    let (response, _) = send(&mut stream, add, vec![sample_png(40, 40)]).await;
    assert_eq!(response[0]["status"], 0);

    let find = json!([{"FindImage": {"class": "VD:IMG", "results": {"list": []}}}]);
    let (response, blobs) = send(&mut stream, find, Vec::new()).await;
    assert_eq!(response[0]["returned"], 1);
    assert_eq!(blobs.len(), 1);

    let decoded = image::load_from_memory(&blobs[0]).unwrap();
    assert_eq!(decoded.dimensions(), (100, 100));
}

fn sample_video(frame_count: usize, width: u32, height: u32) -> Vec<u8> {
    let frames: Vec<Frame> = (0..frame_count).map(|_| Frame { rgb: vec![0u8; (width * height * 3) as usize] }).collect();
    encode_container(width, height, 30.0, Codec::H264, &frames)
}

#[tokio::test]
async fn video_interval_op_trims_frame_count() {
    let (mut stream, _dir) = harness().await;

    let add = json!([{"AddVideo": {"class": "VD:VID"}}]);
    let (response, _) = send(&mut stream, add, vec![sample_video(270, 4, 4)]).await;
    assert_eq!(response[0]["status"], 0);

    let find = json!([{
        "FindVideo": {
            "class": "VD:VID",
            "results": {"list": []},
            "operations": [{"type": "interval", "start": 10, "stop": 100, "step": 5}],
        }
    }]);
    let (response, blobs) = send(&mut stream, find, Vec::new()).await;
    assert_eq!(response[0]["returned"], 1);
    assert_eq!(blobs.len(), 1);

    let video = Video::from_encoded_bytes(blobs[0].clone()).unwrap();
    assert_eq!(video.frame_count().unwrap(), 18);
}
