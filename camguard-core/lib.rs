#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Key-point ≙ FAST corner + orientation (radians).
///
/// Coordinates are always expressed in the base (level 0) image, whatever
/// pyramid level the corner was found on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    /// Diameter of the described neighbourhood at base scale
    pub size: f32,
    /// Pyramid level the corner was detected on
    pub octave: u8,
    pub response: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            angle: 0.0,
            size: 31.0,
            octave: 0,
            response: 0.0,
        }
    }

    pub fn pt(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; 32];

/// Keypoint extraction settings shared by the detector and descriptor stages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtractorConfig {
    /// FAST intensity threshold
    pub threshold: u8,
    /// Orientation / descriptor patch (odd)
    pub patch_size: usize,
    /// Upper bound on keypoints kept per image
    pub max_features: usize,
    pub n_levels: usize,
    pub scale_factor: f32,
    /// Border (in level pixels) where no corner is kept
    pub edge_threshold: usize,
    pub n_threads: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 31,
            max_features: 15000,
            n_levels: 8,
            scale_factor: 1.2,
            edge_threshold: 19,
            n_threads: num_cpus::get().max(1),
        }
    }
}

impl ExtractorConfig {
    /// Image-independent sanity checks; returns a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold == 0 || self.threshold > 127 {
            return Err(format!("threshold {} outside 1..=127", self.threshold));
        }
        if self.patch_size % 2 == 0 || self.patch_size < 3 {
            return Err(format!("patch size {} must be odd and >= 3", self.patch_size));
        }
        if self.max_features == 0 {
            return Err("max_features must be > 0".to_string());
        }
        if self.n_levels == 0 {
            return Err("n_levels must be > 0".to_string());
        }
        if self.n_levels > 1 && !(self.scale_factor > 1.0) {
            return Err(format!("scale factor {} must be > 1.0", self.scale_factor));
        }
        if self.n_threads == 0 {
            return Err("n_threads must be > 0".to_string());
        }
        Ok(())
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExtractorConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_even_patch() {
        let cfg = ExtractorConfig {
            patch_size: 30,
            ..ExtractorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn single_level_ignores_scale_factor() {
        let cfg = ExtractorConfig {
            n_levels: 1,
            scale_factor: 1.0,
            ..ExtractorConfig::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = ExtractorConfig {
            n_levels: 4,
            scale_factor: 1.0,
            ..ExtractorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
