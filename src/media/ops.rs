//! Deferred media operations, grounded on spec.md §4.F/§4.G's "ordered
//! list of pending operations" design and `original_source/include/vcl/
//! Video.h`'s operation set.

use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum MediaOp {
    Resize { width: u32, height: u32 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Threshold { value: u8 },
    /// Video-only stream-level op: keep frames in `[start, stop)` every
    /// `step`-th frame. `unit` is always `"frames"` per spec.md §4.G.
    Interval { start: u64, stop: u64, step: u64 },
    SyncRemoteOp { url: String, params: Value },
    RemoteOp { url: String, params: Value },
    UserOp { name: String, params: Value },
}

impl MediaOp {
    /// True for ops that only make sense applied to a whole video stream
    /// rather than per-frame (spec.md §4.G: "stream-level ops... executed
    /// between frame loops").
    pub fn is_stream_level(&self) -> bool {
        matches!(self, MediaOp::Interval { .. })
    }

    pub fn parse(name: &str, params: &Value) -> Result<MediaOp, AppError> {
        match name {
            "resize" => Ok(MediaOp::Resize { width: req_u32(params, "width")?, height: req_u32(params, "height")? }),
            "crop" => Ok(MediaOp::Crop {
                x: req_u32(params, "x")?,
                y: req_u32(params, "y")?,
                width: req_u32(params, "width")?,
                height: req_u32(params, "height")?,
            }),
            "threshold" => Ok(MediaOp::Threshold { value: req_u32(params, "value")?.min(255) as u8 }),
            "interval" => {
                let unit = params.get("unit").and_then(Value::as_str).unwrap_or("frames");
                if unit != "frames" {
                    return Err(AppError::media("unsupported_interval_unit", format!("unit '{unit}' is not supported; only 'frames' is")));
                }
                let start = req_u64(params, "start")?;
                let stop = req_u64(params, "stop")?;
                let step = params.get("step").and_then(Value::as_u64).unwrap_or(1).max(1);
                if stop <= start {
                    return Err(AppError::media("bad_interval", "interval stop must be greater than start"));
                }
                Ok(MediaOp::Interval { start, stop, step })
            }
            "sync_remote_op" => Ok(MediaOp::SyncRemoteOp { url: req_str(params, "url")?, params: params.clone() }),
            "remote_op" => Ok(MediaOp::RemoteOp { url: req_str(params, "url")?, params: params.clone() }),
            "user_op" => Ok(MediaOp::UserOp { name: req_str(params, "function")?, params: params.clone() }),
            other => Err(AppError::media("unknown_operation", format!("unrecognized media operation '{other}'"))),
        }
    }
}

fn req_u32(params: &Value, key: &str) -> Result<u32, AppError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .ok_or_else(|| AppError::media("missing_parameter", format!("operation parameter '{key}' is required")))
}

fn req_u64(params: &Value, key: &str) -> Result<u64, AppError> {
    params.get(key).and_then(Value::as_u64).ok_or_else(|| AppError::media("missing_parameter", format!("operation parameter '{key}' is required")))
}

fn req_str(params: &Value, key: &str) -> Result<String, AppError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::media("missing_parameter", format!("operation parameter '{key}' is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_resize() {
        let op = MediaOp::parse("resize", &json!({"width": 100, "height": 200})).unwrap();
        match op {
            MediaOp::Resize { width, height } => assert_eq!((width, height), (100, 200)),
            _ => panic!("expected Resize"),
        }
    }

    #[test]
    fn interval_requires_frames_unit() {
        let err = MediaOp::parse("interval", &json!({"unit": "seconds", "start": 0, "stop": 10})).unwrap_err();
        assert_eq!(err.code_str(), "unsupported_interval_unit");
    }

    #[test]
    fn interval_rejects_inverted_range() {
        let err = MediaOp::parse("interval", &json!({"start": 10, "stop": 5})).unwrap_err();
        assert_eq!(err.code_str(), "bad_interval");
    }

    #[test]
    fn interval_is_stream_level() {
        let op = MediaOp::parse("interval", &json!({"start": 0, "stop": 10, "step": 2})).unwrap();
        assert!(op.is_stream_level());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(MediaOp::parse("not_a_real_op", &json!({})).is_err());
    }
}
