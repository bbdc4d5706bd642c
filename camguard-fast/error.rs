use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FastError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },
    #[error("Image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
    #[error("Invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),
    #[error("Patch size {patch_size} invalid for minimum image dimension {min_image_dim}")]
    InvalidPatchSize { patch_size: usize, min_image_dim: usize },
    #[error("Image {width}x{height} too small (minimum {min_size}x{min_size})")]
    ImageTooSmall { width: usize, height: usize, min_size: usize },
    #[error("Invalid extractor configuration: {0}")]
    InvalidConfig(String),
}

pub type FastResult<T> = Result<T, FastError>;
