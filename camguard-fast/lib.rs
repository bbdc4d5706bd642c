//! Multi-scale FAST-9 corner detection with Harris ranking, non-maximum
//! suppression, a per-image feature budget and intensity-centroid
//! orientation.

pub mod builder;
pub mod config;
pub mod configured_detector;
pub mod corner_detection;
pub mod detector;
pub mod error;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use builder::DetectorBuilder;
pub use config::DetectorConfig;
pub use configured_detector::{ConfiguredDetector, DetectionStats};
pub use detector::FastDetector;
pub use error::{FastError, FastResult};
pub use types::{ScaleLevel, ScoredKeypoint};
