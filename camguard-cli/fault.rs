//! Screen fault classification from intensity histograms and edge density.

use image::{GrayImage, ImageBuffer, Luma, RgbImage, imageops};
use imageproc::filter::separable_filter_equal;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::debug;

use crate::config::FaultConfig;
use crate::error::{GuardError, GuardResult};
use crate::sink::Category;

/// Lowest histogram band counted as black
const BLACK_BAND: std::ops::RangeInclusive<usize> = 0..=20;
/// Near-black band, also counted as black
const DARK_BAND: std::ops::RangeInclusive<usize> = 21..=40;
const FIRST_WINDOW_BIN: usize = 41;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultFlags {
    pub is_black: bool,
    pub is_other_fault: bool,
    pub is_edge_fault: bool,
    pub edge_density: f64,
}

impl FaultFlags {
    /// Black wins over snow, snow over other faults
    pub fn category(&self) -> Option<Category> {
        if self.is_black {
            Some(Category::BlackScreen)
        } else if self.is_edge_fault {
            Some(Category::SnowScreen)
        } else if self.is_other_fault {
            Some(Category::OtherScreen)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenFaultDetector {
    config: FaultConfig,
    kernel: Vec<f32>,
}

impl ScreenFaultDetector {
    pub fn new(config: FaultConfig) -> GuardResult<Self> {
        config.validate()?;
        let kernel = gaussian_kernel(config.blur_kernel, config.blur_sigma);
        Ok(Self { config, kernel })
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn analyse(&self, image: &RgbImage) -> GuardResult<FaultFlags> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(GuardError::EmptyImage);
        }
        let total = w as u64 * h as u64;
        let limit = total as f64 * self.config.hist_threshold;

        let hist = channel_histogram(image, self.config.channel.index());
        let (is_black, is_other_fault) = self.histogram_flags(&hist, limit);

        let gray = imageops::grayscale(image);
        let edge_density = self.edge_density(&gray);
        let is_edge_fault = edge_density > self.config.edge_density_cutoff;

        let flags = FaultFlags {
            is_black,
            is_other_fault,
            is_edge_fault,
            edge_density,
        };
        debug!(?flags, width = w, height = h, "fault analysis");
        Ok(flags)
    }

    /// `(is_black, is_other_fault)`; the window scan only runs when the frame is not black.
    fn histogram_flags(&self, hist: &[u64; 256], limit: f64) -> (bool, bool) {
        let band = |r: std::ops::RangeInclusive<usize>| hist[r].iter().sum::<u64>() as f64;
        if band(BLACK_BAND) > limit || band(DARK_BAND) > limit {
            return (true, false);
        }

        let win = self.config.slide_window_size;
        let other = (FIRST_WINDOW_BIN..256 - win)
            .any(|i| hist[i..i + win].iter().sum::<u64>() as f64 > limit);
        (false, other)
    }

    /// Fraction of pixels marked as edges after smoothing.
    ///
    /// The edge step runs Sobel, non-maximum suppression and hysteresis
    /// directly on the smoothed frame; `imageproc::edges::canny` would blur
    /// a second time.
    pub fn edge_density(&self, gray: &GrayImage) -> f64 {
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return 0.0;
        }
        let blurred = separable_filter_equal(gray, &self.kernel);
        let count = edge_pixels(&blurred, self.config.canny_low, self.config.canny_high);
        count as f64 / (w as f64 * h as f64)
    }
}

type Magnitude = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Number of pixels that survive thinning and `low`/`high` hysteresis.
fn edge_pixels(image: &GrayImage, low: f32, high: f32) -> usize {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return 0;
    }
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let magnitude = Magnitude::from_fn(w, h, |x, y| {
        Luma([(gx.get_pixel(x, y)[0] as f32).hypot(gy.get_pixel(x, y)[0] as f32)])
    });

    // Keep only maxima along the gradient, quantised to 0/45/90/135 degrees
    let thinned = Magnitude::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
            return Luma([0.0]);
        }
        let g = magnitude.get_pixel(x, y)[0];
        let sx = gx.get_pixel(x, y)[0] as f32;
        let sy = gy.get_pixel(x, y)[0] as f32;
        let mut angle = sy.atan2(sx).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        let ((ax, ay), (bx, by)) = if !(22.5..157.5).contains(&angle) {
            ((x - 1, y), (x + 1, y))
        } else if angle < 67.5 {
            ((x + 1, y + 1), (x - 1, y - 1))
        } else if angle < 112.5 {
            ((x, y - 1), (x, y + 1))
        } else {
            ((x - 1, y + 1), (x + 1, y - 1))
        };
        if g < magnitude.get_pixel(ax, ay)[0] || g < magnitude.get_pixel(bx, by)[0] {
            Luma([0.0])
        } else {
            Luma([g])
        }
    });

    hysteresis(&thinned, low, high)
}

/// Seeds at `high`, then grows through 8-connected pixels at or above `low`.
fn hysteresis(thinned: &Magnitude, low: f32, high: f32) -> usize {
    let (w, h) = thinned.dimensions();
    let mut marked = vec![false; (w * h) as usize];
    let mut stack = Vec::new();
    let mut count = 0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = (y * w + x) as usize;
            if marked[idx] || thinned.get_pixel(x, y)[0] < high {
                continue;
            }
            marked[idx] = true;
            count += 1;
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for ny in cy - 1..=cy + 1 {
                    for nx in cx - 1..=cx + 1 {
                        if nx == 0 || ny == 0 || nx == w - 1 || ny == h - 1 {
                            continue;
                        }
                        let n = (ny * w + nx) as usize;
                        if !marked[n] && thinned.get_pixel(nx, ny)[0] >= low {
                            marked[n] = true;
                            count += 1;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
        }
    }
    count
}

pub fn channel_histogram(image: &RgbImage, channel: usize) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for px in image.pixels() {
        hist[px.0[channel] as usize] += 1;
    }
    hist
}

/// Normalised `size`-tap Gaussian
fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|v| v / sum).collect()
}
