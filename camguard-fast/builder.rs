use camguard_core::ExtractorConfig;
use crate::config::DetectorConfig;
use crate::configured_detector::ConfiguredDetector;
use crate::detector::FastDetector;
use crate::error::FastResult;

/// Builder for creating a `ConfiguredDetector`
#[derive(Debug, Clone)]
pub struct DetectorBuilder {
    config: ExtractorConfig,
    width: usize,
    height: usize,
    nms_distance: f32,
}

impl DetectorBuilder {
    /// Create a new builder with default settings
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            config: ExtractorConfig::default(),
            width,
            height,
            nms_distance: 3.0,
        }
    }

    /// Replace all extraction settings at once
    pub fn extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the FAST threshold (1-127)
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the patch size for orientation calculation
    pub fn patch_size(mut self, patch_size: usize) -> Self {
        self.config.patch_size = patch_size;
        self
    }

    /// Cap on the number of keypoints returned
    pub fn max_features(mut self, max_features: usize) -> Self {
        self.config.max_features = max_features;
        self
    }

    /// Number of pyramid levels
    pub fn levels(mut self, n_levels: usize) -> Self {
        self.config.n_levels = n_levels;
        self
    }

    pub fn scale_factor(mut self, scale_factor: f32) -> Self {
        self.config.scale_factor = scale_factor;
        self
    }

    pub fn edge_threshold(mut self, edge_threshold: usize) -> Self {
        self.config.edge_threshold = edge_threshold;
        self
    }

    /// Set the number of threads for parallel processing
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Set the non-maximum suppression (NMS) distance
    pub fn nms_distance(mut self, distance: f32) -> Self {
        self.nms_distance = distance;
        self
    }

    /// Build the `ConfiguredDetector`
    pub fn build(self) -> FastResult<ConfiguredDetector> {
        let config = self.clone().to_config();
        config.validate()?;
        let detector = FastDetector::new(config.core, config.width, config.height)?
            .with_nms_distance(config.nms_distance);
        Ok(ConfiguredDetector {
            detector,
            config: self,
        })
    }

    /// Convert the builder into a `DetectorConfig`
    pub fn to_config(self) -> DetectorConfig {
        DetectorConfig {
            core: self.config,
            width: self.width,
            height: self.height,
            nms_distance: self.nms_distance,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}
