use camguard_core::ExtractorConfig;
use crate::error::{FastError, FastResult};

/// Complete detector configuration for one image size
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Core extraction settings
    pub core: ExtractorConfig,
    /// Image dimensions
    pub width: usize,
    pub height: usize,
    /// Minimum distance between surviving corners
    pub nms_distance: f32,
}

impl DetectorConfig {
    /// Create new configuration with default settings
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            core: ExtractorConfig::default(),
            width,
            height,
            nms_distance: 3.0,
        }
    }

    /// Few, strong corners on a single level; fastest comparisons
    pub fn fast_preset(width: usize, height: usize) -> Self {
        Self {
            core: ExtractorConfig {
                threshold: 30,
                max_features: 2000,
                n_levels: 1,
                ..ExtractorConfig::default()
            },
            nms_distance: 5.0,
            ..Self::new(width, height)
        }
    }

    /// Low threshold and tight suppression for low-contrast scenes
    pub fn dense_preset(width: usize, height: usize) -> Self {
        Self {
            core: ExtractorConfig {
                threshold: 10,
                max_features: 30000,
                ..ExtractorConfig::default()
            },
            nms_distance: 2.0,
            ..Self::new(width, height)
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> FastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FastError::InvalidImageSize { width: self.width, height: self.height });
        }
        if self.core.threshold == 0 || self.core.threshold > 127 {
            return Err(FastError::InvalidThreshold(self.core.threshold));
        }
        if !(self.nms_distance >= 0.0) {
            return Err(FastError::InvalidConfig(format!("nms_distance {}", self.nms_distance)));
        }
        self.core.validate().map_err(FastError::InvalidConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for cfg in [
            DetectorConfig::new(640, 384),
            DetectorConfig::fast_preset(640, 384),
            DetectorConfig::dense_preset(640, 384),
        ] {
            assert!(cfg.validate().is_ok(), "{cfg:?}");
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        let cfg = DetectorConfig::new(0, 10);
        assert!(matches!(cfg.validate(), Err(FastError::InvalidImageSize { .. })));
    }

    #[test]
    fn negative_nms_distance_is_rejected() {
        let cfg = DetectorConfig { nms_distance: -1.0, ..DetectorConfig::new(64, 64) };
        assert!(matches!(cfg.validate(), Err(FastError::InvalidConfig(_))));
    }
}
