use camguard_core::{Image, Keypoint};
use crate::builder::DetectorBuilder;
use crate::detector::FastDetector;
use crate::error::FastResult;
use crate::types::ScaleLevel;

/// Keypoint counts of one detection, per pyramid level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub per_level: Vec<usize>,
}

impl DetectionStats {
    pub fn total(&self) -> usize {
        self.per_level.iter().sum()
    }
}

/// Detector bound to one image size, built by [`DetectorBuilder::build`].
#[derive(Debug, Clone)]
pub struct ConfiguredDetector {
    pub(crate) detector: FastDetector,
    pub(crate) config: DetectorBuilder,
}

impl ConfiguredDetector {
    /// Oriented keypoints in base-level coordinates, strongest first.
    pub fn detect_keypoints(&self, img: &Image) -> FastResult<Vec<Keypoint>> {
        self.detector.detect_keypoints(img)
    }

    /// Like [`detect_keypoints`](Self::detect_keypoints), also reporting
    /// which pyramid levels the kept keypoints came from.
    pub fn detect_with_stats(&self, img: &Image) -> FastResult<(Vec<Keypoint>, DetectionStats)> {
        let keypoints = self.detector.detect_keypoints(img)?;
        let mut per_level = vec![0; self.detector.get_scale_levels().len()];
        for kp in &keypoints {
            if let Some(n) = per_level.get_mut(kp.octave as usize) {
                *n += 1;
            }
        }
        Ok((keypoints, DetectionStats { per_level }))
    }

    pub fn detector(&self) -> &FastDetector {
        &self.detector
    }

    /// `(width, height)` the detector was built for
    pub fn dimensions(&self) -> (usize, usize) {
        (self.config.width(), self.config.height())
    }

    pub fn scale_levels(&self) -> &[ScaleLevel] {
        self.detector.get_scale_levels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squares(width: usize, height: usize) -> Image {
        let mut img = vec![30u8; width * height];
        for (i, (cx, cy)) in [(40, 40), (100, 60), (160, 100)].into_iter().enumerate() {
            let v = 120 + 40 * i as u8;
            for y in cy - 8..cy + 8 {
                for x in cx - 8..cx + 8 {
                    img[y * width + x] = v;
                }
            }
        }
        img
    }

    #[test]
    fn stats_account_for_every_keypoint() {
        let detector = DetectorBuilder::new(200, 140).levels(3).scale_factor(1.5).build().unwrap();
        let (kps, stats) = detector.detect_with_stats(&squares(200, 140)).unwrap();
        assert!(!kps.is_empty());
        assert_eq!(stats.per_level.len(), detector.scale_levels().len());
        assert_eq!(stats.total(), kps.len());
    }
}
