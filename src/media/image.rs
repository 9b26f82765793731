//! Image object with a deferred operation list, grounded on spec.md §4.F.
//! Pixel operations (`resize`/`crop`/`threshold`) and encode/decode use the
//! `image` crate, following the resize/encode shape in
//! `arkCyber-Matrixon`'s `service/media/mod.rs` (the teacher carries no
//! image-processing crate of its own).

use std::path::PathBuf;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::error::AppError;
use crate::media::ops::MediaOp;

pub struct Image {
    /// Present once the image has been decoded or materialized; `None`
    /// means only the pending ops and, if loaded from an existing path,
    /// the encoded bytes are known so far.
    matrix: Option<DynamicImage>,
    encoded: Option<Vec<u8>>,
    format: ImageFormat,
    path: Option<PathBuf>,
    pending: Vec<MediaOp>,
}

impl Image {
    pub fn from_encoded_bytes(bytes: Vec<u8>) -> Result<Image, AppError> {
        let format = image::guess_format(&bytes).map_err(|e| AppError::media("bad_image_format", format!("could not detect image format: {e}")))?;
        Ok(Image { matrix: None, encoded: Some(bytes), format, path: None, pending: Vec::new() })
    }

    pub fn from_path(path: PathBuf) -> Result<Image, AppError> {
        let bytes = std::fs::read(&path).map_err(AppError::from)?;
        let format = image::guess_format(&bytes).map_err(|e| AppError::media("bad_image_format", format!("could not detect image format: {e}")))?;
        Ok(Image { matrix: None, encoded: Some(bytes), format, path: Some(path), pending: Vec::new() })
    }

    pub fn push_op(&mut self, op: MediaOp) {
        self.pending.push(op);
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// The format this image was last decoded from or encoded to, used by
    /// callers that need to flush pending ops to bytes mid-pipeline (remote
    /// and user ops replace the whole buffer, so they need an intermediate
    /// encode) without hand-picking a format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    fn decode(&mut self) -> Result<(), AppError> {
        if self.matrix.is_some() {
            return Ok(());
        }
        let bytes = self.encoded.as_deref().ok_or_else(|| AppError::media("no_image_data", "image has neither encoded bytes nor a decoded matrix"))?;
        let decoded = image::load_from_memory(bytes).map_err(|e| AppError::media("decode_failed", format!("image decode failed: {e}")))?;
        self.matrix = Some(decoded);
        Ok(())
    }

    /// Folds the pending op list over the current matrix in order, then
    /// clears it, per spec.md §4.F "Materialization".
    fn materialize(&mut self) -> Result<(), AppError> {
        self.decode()?;
        let ops = std::mem::take(&mut self.pending);
        for op in ops {
            let current = self.matrix.take().expect("decode() guarantees a matrix");
            self.matrix = Some(apply_op(current, &op)?);
        }
        self.encoded = None;
        Ok(())
    }

    /// Returns the current pixel matrix after folding any pending ops.
    pub fn get_matrix(&mut self) -> Result<&DynamicImage, AppError> {
        self.materialize()?;
        Ok(self.matrix.as_ref().expect("materialize() guarantees a matrix"))
    }

    /// Encodes the current (materialized) image as `format`.
    pub fn get_encoded(&mut self, format: ImageFormat) -> Result<Vec<u8>, AppError> {
        self.materialize()?;
        let matrix = self.matrix.as_ref().expect("materialize() guarantees a matrix");
        let mut buf = Vec::new();
        matrix.write_to(&mut std::io::Cursor::new(&mut buf), format).map_err(|e| AppError::media("encode_failed", format!("image encode failed: {e}")))?;
        self.format = format;
        Ok(buf)
    }

    /// Materializes and writes the image to `path`, assigning it as the
    /// image's path if none was set (spec.md §4.F "Storage paths").
    pub fn store(&mut self, path: PathBuf) -> Result<(), AppError> {
        let format = image_format_for_extension(&path);
        let bytes = self.get_encoded(format)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(AppError::from)?;
        }
        std::fs::write(&path, bytes).map_err(AppError::from)?;
        self.path = Some(path);
        Ok(())
    }
}

fn apply_op(image: DynamicImage, op: &MediaOp) -> Result<DynamicImage, AppError> {
    match op {
        MediaOp::Resize { width, height } => Ok(image.resize_exact(*width, *height, FilterType::CatmullRom)),
        MediaOp::Crop { x, y, width, height } => {
            if x + width > image.width() || y + height > image.height() {
                return Err(AppError::media("crop_out_of_bounds", "crop rectangle extends past the image bounds"));
            }
            Ok(image.crop_imm(*x, *y, *width, *height))
        }
        MediaOp::Threshold { value } => {
            // cv::threshold(..., THRESH_TOZERO) zeroes each channel
            // independently rather than deciding from a computed luma, so a
            // pixel that fails on one channel can still keep the others.
            let mut rgb = image.to_rgb8();
            for pixel in rgb.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    if *channel <= *value {
                        *channel = 0;
                    }
                }
            }
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        MediaOp::Interval { .. } => Err(AppError::media("unsupported_operation", "interval is a video-only stream-level operation")),
        MediaOp::SyncRemoteOp { .. } | MediaOp::RemoteOp { .. } | MediaOp::UserOp { .. } => {
            // Dispatched by the handler layer before materialization (they
            // replace the whole byte buffer rather than transform pixels),
            // so reaching here means the op list was folded out of order.
            Err(AppError::media("unsupported_operation", "remote/user ops must be resolved before pixel materialization"))
        }
    }
}

fn image_format_for_extension(path: &std::path::Path) -> ImageFormat {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase().as_str() {
        "png" => ImageFormat::Png,
        "bmp" => ImageFormat::Bmp,
        "tiff" | "tif" => ImageFormat::Tiff,
        _ => ImageFormat::Jpeg,
    }
}
