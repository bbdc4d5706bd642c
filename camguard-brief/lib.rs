use camguard_core::{Descriptor, Image, Keypoint};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::trace;

const DESCRIPTOR_SIZE: usize = 32;
const N_PAIRS: usize = DESCRIPTOR_SIZE * 8;
/// Sampling radius for a keypoint of size `REFERENCE_PATCH`
const PATTERN_RADIUS: i32 = 13;
const REFERENCE_PATCH: f32 = 31.0;
const PATTERN_SEED: u64 = 0x0b21_ef00_5eed;

/// One binary test: compare intensity at `(x1, y1)` with `(x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Error, PartialEq)]
pub enum BriefError {
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: usize, height: usize },
    #[error("image buffer holds {actual} bytes, expected {expected}")]
    InvalidImageData { expected: usize, actual: usize },
    #[error("smoothing sigma must be positive, got {0}")]
    InvalidSigma(f32),
}

/// The 256 point pairs shared by every descriptor, uniformly drawn
/// inside a disc of radius 13 from a fixed ChaCha stream.
pub fn sampling_pattern() -> &'static [SamplePair] {
    static PATTERN: OnceLock<Vec<SamplePair>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
        let mut point = move || loop {
            let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x as f32, y as f32);
            }
        };
        let mut pairs = Vec::with_capacity(N_PAIRS);
        while pairs.len() < N_PAIRS {
            let (x1, y1) = point();
            let (x2, y2) = point();
            if (x1, y1) != (x2, y2) {
                pairs.push(SamplePair { x1, y1, x2, y2 });
            }
        }
        pairs
    })
}

pub struct BriefGenerator {
    w: usize,
    h: usize,
    sigma: Option<f32>,
}

impl BriefGenerator {
    /// Generator for `width` x `height` images, smoothing with sigma 2 before sampling.
    pub fn new(width: usize, height: usize) -> Result<Self, BriefError> {
        if width == 0 || height == 0 {
            return Err(BriefError::InvalidImageSize { width, height });
        }
        Ok(Self { w: width, h: height, sigma: Some(2.0) })
    }

    /// Override the pre-sampling Gaussian; `None` samples raw pixels.
    pub fn with_smoothing(mut self, sigma: Option<f32>) -> Result<Self, BriefError> {
        if let Some(s) = sigma {
            if !(s > 0.0) {
                return Err(BriefError::InvalidSigma(s));
            }
        }
        self.sigma = sigma;
        Ok(self)
    }

    /// One descriptor per keypoint, in the same order.
    ///
    /// The pattern is rotated by `kp.angle` and scaled by `kp.size / 31`.
    pub fn generate_descriptors(&self, img: &Image, kps: &[Keypoint]) -> Result<Vec<Descriptor>, BriefError> {
        let expected = self.w * self.h;
        if img.len() != expected {
            return Err(BriefError::InvalidImageData { expected, actual: img.len() });
        }

        let smoothed;
        let pixels: &[u8] = match self.sigma {
            Some(sigma) => {
                let gray = GrayImage::from_raw(self.w as u32, self.h as u32, img.clone())
                    .ok_or(BriefError::InvalidImageData { expected, actual: img.len() })?;
                smoothed = gaussian_blur_f32(&gray, sigma).into_raw();
                &smoothed
            }
            None => img,
        };

        let pattern = sampling_pattern();
        trace!(keypoints = kps.len(), "computing descriptors");

        Ok(kps
            .par_iter()
            .map(|kp| {
                let scale = if kp.size > 0.0 { kp.size / REFERENCE_PATCH } else { 1.0 };
                let (s, c) = kp.angle.sin_cos();
                let (s, c) = (s * scale, c * scale);
                let (cx, cy) = (kp.x, kp.y);
                let mut d = [0u8; DESCRIPTOR_SIZE];

                for (i, p) in pattern.iter().enumerate() {
                    let (rx1, ry1) = (cx + c * p.x1 - s * p.y1, cy + s * p.x1 + c * p.y1);
                    let (rx2, ry2) = (cx + c * p.x2 - s * p.y2, cy + s * p.x2 + c * p.y2);

                    let val1 = self.bilinear_sample(pixels, rx1, ry1);
                    let val2 = self.bilinear_sample(pixels, rx2, ry2);

                    d[i / 8] |= ((val1 < val2) as u8) << (i % 8);
                }
                d
            })
            .collect())
    }

    /// Bilinear interpolation for subpixel sampling
    fn bilinear_sample(&self, img: &[u8], x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let x1 = x0 + 1.0;
        let y1 = y0 + 1.0;

        // Clamp samples that fall off the image
        if x0 < 0.0 || y0 < 0.0 || x1 >= self.w as f32 || y1 >= self.h as f32 {
            let cx = x.round().clamp(0.0, (self.w - 1) as f32) as usize;
            let cy = y.round().clamp(0.0, (self.h - 1) as f32) as usize;
            return img[cy * self.w + cx] as f32;
        }

        let dx = x - x0;
        let dy = y - y0;
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);

        let p00 = img[y0 * self.w + x0] as f32;
        let p10 = img[y0 * self.w + x1] as f32;
        let p01 = img[y1 * self.w + x0] as f32;
        let p11 = img[y1 * self.w + x1] as f32;

        let top = p00 * (1.0 - dx) + p10 * dx;
        let bottom = p01 * (1.0 - dx) + p11 * dx;
        top * (1.0 - dy) + bottom * dy
    }
}
