//! Image and video pipelines (SPEC_FULL.md §4.F/§4.G).

pub mod image;
pub mod ops;
pub mod remote;
pub mod udf;
pub mod video;

pub use ops::MediaOp;
pub use remote::RemoteOpClient;
pub use udf::UserOpRegistry;

/// Splits an `operations` JSON array (spec.md §6's `operations` sub-schema)
/// into parsed `MediaOp`s in list order.
pub fn parse_operations(value: &serde_json::Value) -> Result<Vec<MediaOp>, crate::error::AppError> {
    let Some(array) = value.as_array() else {
        return Ok(Vec::new());
    };
    array
        .iter()
        .map(|entry| {
            let name = entry
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| crate::error::AppError::media("missing_parameter", "each operation requires a 'type' field"))?;
            MediaOp::parse(name, entry)
        })
        .collect()
}
