use std::path::PathBuf;

use camguard_brief::BriefError;
use camguard_fast::FastError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("image has no pixels")]
    EmptyImage,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("keypoint detection failed: {0}")]
    Fast(#[from] FastError),

    #[error("descriptor extraction failed: {0}")]
    Brief(#[from] BriefError),

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot write image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid font {path}")]
    Font { path: PathBuf },

    #[error("result writer thread panicked")]
    WriterPanicked,

    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type GuardResult<T> = Result<T, GuardError>;

pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> GuardResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> GuardResult<T> {
        self.map_err(|source| GuardError::Io {
            path: path.into(),
            source,
        })
    }
}
