use camguard_brief::BriefGenerator;
use camguard_core::{Descriptor, ExtractorConfig, Keypoint};
use camguard_fast::{DetectorBuilder, FastError};
use image::GrayImage;
use tracing::{debug, warn};

use crate::error::GuardResult;

/// Keypoints and their descriptors, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, gray: &GrayImage) -> GuardResult<Features>;
}

/// Multi-scale FAST corners described with rotated BRIEF
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    config: ExtractorConfig,
}

impl OrbExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }
}

impl FeatureExtractor for OrbExtractor {
    fn extract(&self, gray: &GrayImage) -> GuardResult<Features> {
        let (w, h) = (gray.width() as usize, gray.height() as usize);

        let detector = match DetectorBuilder::new(w, h)
            .extractor_config(self.config.clone())
            .build()
        {
            Ok(d) => d,
            Err(FastError::ImageTooSmall { .. } | FastError::InvalidPatchSize { .. }) => {
                warn!(width = w, height = h, "image too small for keypoint detection");
                return Ok(Features::default());
            }
            Err(e) => return Err(e.into()),
        };

        let img = gray.as_raw();
        let (keypoints, stats) = detector.detect_with_stats(img)?;
        let descriptors = BriefGenerator::new(w, h)?.generate_descriptors(img, &keypoints)?;
        debug!(
            width = w,
            height = h,
            keypoints = keypoints.len(),
            per_level = ?stats.per_level,
            "extracted features"
        );

        Ok(Features { keypoints, descriptors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_has_no_features() {
        let gray = GrayImage::from_pixel(120, 90, image::Luma([77]));
        let f = OrbExtractor::new(ExtractorConfig::default()).extract(&gray).unwrap();
        assert!(f.is_empty());
        assert!(f.descriptors.is_empty());
    }

    #[test]
    fn tiny_image_is_degenerate_not_an_error() {
        let gray = GrayImage::from_pixel(5, 5, image::Luma([0]));
        let f = OrbExtractor::new(ExtractorConfig::default()).extract(&gray).unwrap();
        assert!(f.is_empty());
    }

    #[test]
    fn textured_image_has_aligned_features() {
        let gray = GrayImage::from_fn(160, 120, |x, y| {
            let v = ((x / 8) * 37 + (y / 8) * 91) % 256;
            image::Luma([v as u8])
        });
        let f = OrbExtractor::new(ExtractorConfig::default()).extract(&gray).unwrap();
        assert!(!f.is_empty());
        assert_eq!(f.keypoints.len(), f.descriptors.len());
    }
}
