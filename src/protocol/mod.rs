//! Wire framing (SPEC_FULL.md §4.A).
//!
//! Grounded on `original_source/src/QueryMessage.{h,cc}` for the envelope's
//! two-field shape (a JSON command list plus a parallel list of opaque
//! blobs) and on the teacher's manual `AsyncRead`/`AsyncWriteExt` framing
//! style. The outer transport is a raw length-prefixed TCP stream, not
//! HTTP/WebSocket, so framing here is hand-rolled rather than reusing the
//! teacher's `axum`/`tokio-tungstenite` message types.
//!
//! Wire shape: `u32` (LE) `json_len`, then `json_len` bytes of UTF-8 JSON,
//! then `u32` `blob_count`, then `blob_count` repetitions of (`u32` `len`,
//! `len` bytes).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;

/// Largest single JSON payload or blob this server will read before
/// treating the frame as malformed, guarding against a peer claiming an
/// absurd length and exhausting memory before the real data arrives.
const MAX_FRAME_BYTES: u32 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub json: String,
    pub blobs: Vec<Vec<u8>>,
}

impl Envelope {
    pub fn new(json: String, blobs: Vec<Vec<u8>>) -> Self {
        Envelope { json, blobs }
    }

    pub fn commands(&self) -> Result<serde_json::Value, AppError> {
        serde_json::from_str(&self.json)
            .map_err(|e| AppError::protocol("malformed_json", format!("ill-formed command list JSON: {e}")))
    }
}

pub async fn read_envelope<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Envelope>, AppError> {
    let json_len = match read_u32_or_eof(reader).await? {
        Some(n) => n,
        None => return Ok(None),
    };
    check_len(json_len)?;
    let mut json_bytes = vec![0u8; json_len as usize];
    reader.read_exact(&mut json_bytes).await.map_err(AppError::from)?;
    let json = String::from_utf8(json_bytes).map_err(|e| AppError::protocol("invalid_utf8", e.to_string()))?;

    let blob_count = read_u32(reader).await?;
    let mut blobs = Vec::with_capacity(blob_count as usize);
    for _ in 0..blob_count {
        let len = read_u32(reader).await?;
        check_len(len)?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await.map_err(AppError::from)?;
        blobs.push(buf);
    }

    Ok(Some(Envelope { json, blobs }))
}

pub async fn write_envelope<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<(), AppError> {
    let json_bytes = envelope.json.as_bytes();
    writer.write_u32_le(json_bytes.len() as u32).await.map_err(AppError::from)?;
    writer.write_all(json_bytes).await.map_err(AppError::from)?;

    writer.write_u32_le(envelope.blobs.len() as u32).await.map_err(AppError::from)?;
    for blob in &envelope.blobs {
        writer.write_u32_le(blob.len() as u32).await.map_err(AppError::from)?;
        writer.write_all(blob).await.map_err(AppError::from)?;
    }
    writer.flush().await.map_err(AppError::from)?;
    Ok(())
}

async fn read_u32<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, AppError> {
    reader.read_u32_le().await.map_err(AppError::from)
}

/// Like `read_u32`, but a clean EOF on the very first byte is reported as
/// `Ok(None)` (the peer closed the connection between requests) rather
/// than as an error.
async fn read_u32_or_eof<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<u32>, AppError> {
    let mut buf = [0u8; 4];
    let mut read = 0;
    loop {
        match reader.read(&mut buf[read..]).await {
            Ok(0) if read == 0 => return Ok(None),
            Ok(0) => return Err(AppError::protocol("truncated_frame", "connection closed mid-frame".to_string())),
            Ok(n) => {
                read += n;
                if read == buf.len() {
                    return Ok(Some(u32::from_le_bytes(buf)));
                }
            }
            Err(e) => return Err(AppError::from(e)),
        }
    }
}

fn check_len(len: u32) -> Result<(), AppError> {
    if len > MAX_FRAME_BYTES {
        return Err(AppError::protocol("frame_too_large", format!("frame length {len} exceeds {MAX_FRAME_BYTES} byte limit")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_json_and_blobs() {
        let envelope = Envelope::new(r#"[{"FindNode":{}}]"#.to_string(), vec![b"blob-a".to_vec(), b"blob-b".to_vec()]);
        let mut buf = Vec::new();
        write_envelope(&mut buf, &envelope).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_envelope(&mut cursor).await.unwrap().unwrap();
        assert_eq!(read_back, envelope);
    }

    #[tokio::test]
    async fn clean_eof_before_any_bytes_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_envelope(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_envelope(&mut cursor).await.is_err());
    }
}
