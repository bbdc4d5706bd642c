use camguard_core::{ExtractorConfig, Image, Keypoint};
use crate::corner_detection::CornerDetector;
use crate::error::{FastError, FastResult};
use crate::pyramid::ImagePyramid;
use crate::refinement::KeypointRefinement;
use crate::types::ScaleLevel;
use rayon::prelude::*;
use tracing::debug;

/// FAST requires at least 7x7 image (3-pixel border on each side)
const MIN_SIZE: usize = 7;

/// Main FAST corner detector with multi-scale capability
#[derive(Debug, Clone)]
pub struct FastDetector {
    cfg: ExtractorConfig,
    w: usize,
    h: usize,
    nms_distance: f32,
    scale_levels: Vec<ScaleLevel>,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(cfg: ExtractorConfig, width: usize, height: usize) -> FastResult<Self> {
        if width == 0 || height == 0 {
            return Err(FastError::InvalidImageSize { width, height });
        }

        if width < MIN_SIZE || height < MIN_SIZE {
            return Err(FastError::ImageTooSmall {
                width,
                height,
                min_size: MIN_SIZE,
            });
        }

        // 0 would detect everything, >127 could cause issues with u8 arithmetic
        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(FastError::InvalidThreshold(cfg.threshold));
        }

        let min_dim = std::cmp::min(width, height);
        if cfg.patch_size % 2 == 0 || cfg.patch_size >= min_dim {
            return Err(FastError::InvalidPatchSize {
                patch_size: cfg.patch_size,
                min_image_dim: min_dim,
            });
        }

        cfg.validate().map_err(FastError::InvalidConfig)?;

        let scale_levels =
            ImagePyramid::generate_scale_levels(width, height, cfg.n_levels, cfg.scale_factor);

        Ok(Self {
            cfg,
            w: width,
            h: height,
            nms_distance: 3.0,
            scale_levels,
        })
    }

    /// Override the non-maximum suppression radius (default 3 px)
    pub fn with_nms_distance(mut self, nms_distance: f32) -> Self {
        self.nms_distance = nms_distance;
        self
    }

    /// Validates image data before processing
    fn validate_image(&self, img: &Image) -> FastResult<()> {
        let expected_len = self.w * self.h;
        if img.len() != expected_len {
            return Err(FastError::InvalidImageData {
                expected_len,
                actual_len: img.len(),
            });
        }
        Ok(())
    }

    /// Detect oriented keypoints across all pyramid levels.
    ///
    /// The result is sorted by descending response and holds at most
    /// `max_features` points, in base-level coordinates.
    pub fn detect_keypoints(&self, img: &Image) -> FastResult<Vec<Keypoint>> {
        self.validate_image(img)?;

        let pyramid = ImagePyramid::build_image_pyramid(img, self.w, self.h, &self.scale_levels)?;
        let quotas = self.level_quotas();

        let per_level: Vec<Vec<Keypoint>> = self
            .scale_levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(quotas.par_iter())
            .map(|((scale_level, level_img), &quota)| {
                self.detect_oriented_at_scale(level_img, scale_level, quota)
            })
            .collect();

        let mut keypoints: Vec<Keypoint> = per_level.into_iter().flatten().collect();
        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        keypoints.truncate(self.cfg.max_features);

        debug!(
            levels = self.scale_levels.len(),
            keypoints = keypoints.len(),
            "FAST detection finished"
        );
        Ok(keypoints)
    }

    /// Suppress, cap to `quota`, orient, and lift one level's corners to base coordinates
    fn detect_oriented_at_scale(&self, img: &Image, scale_level: &ScaleLevel, quota: usize) -> Vec<Keypoint> {
        if quota == 0 {
            return Vec::new();
        }

        let candidates = CornerDetector::detect_keypoints_at_scale(
            img,
            scale_level,
            self.cfg.threshold,
            self.cfg.edge_threshold,
        );
        let mut suppressed = KeypointRefinement::non_maximum_suppression(&candidates, self.nms_distance);
        suppressed.truncate(quota);

        suppressed
            .into_iter()
            .map(|sk| {
                let angle = KeypointRefinement::compute_orientation(
                    img,
                    scale_level.width,
                    scale_level.height,
                    sk.keypoint.x,
                    sk.keypoint.y,
                    self.cfg.patch_size,
                );
                Keypoint {
                    x: sk.keypoint.x * scale_level.scale,
                    y: sk.keypoint.y * scale_level.scale,
                    angle,
                    size: self.cfg.patch_size as f32 * scale_level.scale,
                    octave: scale_level.level as u8,
                    response: sk.response,
                }
            })
            .collect()
    }

    /// Split the feature budget over levels geometrically by scale factor;
    /// the last level takes whatever the rounding left over.
    fn level_quotas(&self) -> Vec<usize> {
        let n = self.scale_levels.len();
        let max_features = self.cfg.max_features;
        if n == 1 {
            return vec![max_features];
        }

        let factor = 1.0 / self.cfg.scale_factor as f64;
        let mut per_level = max_features as f64 * (1.0 - factor) / (1.0 - factor.powi(n as i32));
        let mut quotas = Vec::with_capacity(n);
        let mut assigned = 0usize;
        for _ in 0..n - 1 {
            let quota = (per_level.round() as usize).min(max_features - assigned);
            quotas.push(quota);
            assigned += quota;
            per_level *= factor;
        }
        quotas.push(max_features - assigned);
        quotas
    }

    /// Get scale levels for this detector
    pub fn get_scale_levels(&self) -> &[ScaleLevel] {
        &self.scale_levels
    }

    /// Get detector configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    /// Get image dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    pub fn nms_distance(&self) -> f32 {
        self.nms_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> ExtractorConfig {
        ExtractorConfig {
            threshold: 20,
            patch_size: 15,
            max_features: 500,
            n_levels: 3,
            scale_factor: 1.2,
            edge_threshold: 8,
            n_threads: 1,
        }
    }

    fn create_small_test_config() -> ExtractorConfig {
        ExtractorConfig {
            patch_size: 5,
            n_levels: 1,
            edge_threshold: 3,
            ..create_test_config()
        }
    }

    fn create_test_image(width: usize, height: usize) -> Image {
        vec![128; width * height]
    }

    /// Bright squares of varying size on a dark background
    fn create_multiple_corners_image(width: usize, height: usize) -> Image {
        let mut img = vec![50; width * height];
        let squares = [(width / 4, height / 4, 5), (3 * width / 4, height / 4, 7), (width / 2, 3 * height / 4, 9)];
        for &(cx, cy, half) in &squares {
            for y in cy - half..=cy + half {
                for x in cx - half..=cx + half {
                    img[y * width + x] = 230;
                }
            }
        }
        img
    }

    #[test]
    fn test_valid_constructor() {
        assert!(FastDetector::new(create_test_config(), 100, 100).is_ok());
    }

    #[test]
    fn test_invalid_dimensions() {
        let result = FastDetector::new(create_test_config(), 0, 100);
        assert!(matches!(result, Err(FastError::InvalidImageSize { .. })));

        let result = FastDetector::new(create_test_config(), 100, 0);
        assert!(matches!(result, Err(FastError::InvalidImageSize { .. })));
    }

    #[test]
    fn test_too_small_image() {
        let result = FastDetector::new(create_test_config(), 6, 6);
        assert!(matches!(result, Err(FastError::ImageTooSmall { .. })));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut cfg = create_test_config();

        cfg.threshold = 0;
        let result = FastDetector::new(cfg.clone(), 100, 100);
        assert!(matches!(result, Err(FastError::InvalidThreshold(0))));

        cfg.threshold = 200;
        let result = FastDetector::new(cfg, 100, 100);
        assert!(matches!(result, Err(FastError::InvalidThreshold(200))));
    }

    #[test]
    fn test_invalid_patch_size() {
        let mut cfg = create_test_config();

        cfg.patch_size = 16;
        let result = FastDetector::new(cfg.clone(), 100, 100);
        assert!(matches!(result, Err(FastError::InvalidPatchSize { .. })));

        cfg.patch_size = 101;
        let result = FastDetector::new(cfg, 100, 100);
        assert!(matches!(result, Err(FastError::InvalidPatchSize { .. })));
    }

    #[test]
    fn test_zero_feature_budget_rejected() {
        let cfg = ExtractorConfig { max_features: 0, ..create_test_config() };
        let result = FastDetector::new(cfg, 100, 100);
        assert!(matches!(result, Err(FastError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_image_data() {
        let detector = FastDetector::new(create_small_test_config(), 10, 10).unwrap();
        let img = vec![0; 50];
        let result = detector.detect_keypoints(&img);
        assert!(matches!(result, Err(FastError::InvalidImageData { .. })));
    }

    #[test]
    fn test_uniform_image_has_no_keypoints() {
        let detector = FastDetector::new(create_test_config(), 64, 64).unwrap();
        let keypoints = detector.detect_keypoints(&create_test_image(64, 64)).unwrap();
        assert!(keypoints.is_empty());
    }

    #[test]
    fn test_corner_detection() {
        let detector = FastDetector::new(create_test_config(), 96, 96).unwrap();
        let keypoints = detector.detect_keypoints(&create_multiple_corners_image(96, 96)).unwrap();
        assert!(!keypoints.is_empty());
        for kp in &keypoints {
            assert!(kp.x >= 0.0 && kp.x < 96.0 && kp.y >= 0.0 && kp.y < 96.0);
            assert!(kp.angle.is_finite());
            assert!(kp.response > 0.0);
        }
    }

    #[test]
    fn test_output_sorted_and_capped() {
        let cfg = ExtractorConfig { max_features: 5, ..create_test_config() };
        let detector = FastDetector::new(cfg, 96, 96).unwrap();
        let keypoints = detector.detect_keypoints(&create_multiple_corners_image(96, 96)).unwrap();
        assert!(keypoints.len() <= 5);
        for pair in keypoints.windows(2) {
            assert!(pair[0].response >= pair[1].response);
        }
    }

    #[test]
    fn test_level_quotas_sum_to_budget() {
        let cfg = ExtractorConfig { max_features: 1000, n_levels: 5, ..create_test_config() };
        let detector = FastDetector::new(cfg, 400, 300).unwrap();
        let quotas = detector.level_quotas();
        assert_eq!(quotas.len(), detector.get_scale_levels().len());
        assert_eq!(quotas.iter().sum::<usize>(), 1000);
        assert!(quotas[0] > quotas[1]);
    }

    #[test]
    fn test_configuration_access() {
        let cfg = create_test_config();
        let detector = FastDetector::new(cfg.clone(), 20, 20).unwrap();

        assert_eq!(detector.config().threshold, cfg.threshold);
        assert_eq!(detector.config().patch_size, cfg.patch_size);
        assert_eq!(detector.dimensions(), (20, 20));
    }

    #[test]
    fn test_boundary_cases() {
        let detector = FastDetector::new(create_small_test_config(), 7, 7).unwrap();
        let result = detector.detect_keypoints(&create_test_image(7, 7));
        assert!(result.is_ok());
    }

    #[test]
    fn test_parallel_determinism() {
        let detector = FastDetector::new(create_test_config(), 96, 96).unwrap();
        let img = create_multiple_corners_image(96, 96);
        let first = detector.detect_keypoints(&img).unwrap();
        for _ in 0..5 {
            assert_eq!(detector.detect_keypoints(&img).unwrap(), first);
        }
    }
}
