use camguard_core::{Image, Keypoint};
use crate::types::{CornerType, ScoredKeypoint, ScaleLevel};
use crate::utils::has_contiguous_arc;
use rayon::prelude::*;

/// Arc length of the FAST-9 segment test
const FAST_ARC: usize = 9;
/// Radius of the FAST circle
const FAST_RADIUS: usize = 3;
/// Half-width of the Harris summation window (7x7)
const HARRIS_RADIUS: i32 = 3;
const HARRIS_K: f32 = 0.04;

/// Corner detection algorithms (FAST and Harris)
pub struct CornerDetector;

impl CornerDetector {
    /// FAST circle offsets for corner detection
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Detect FAST-9 corners on one pyramid level, scored by Harris response.
    ///
    /// Corners closer than `border` pixels to the level edge are skipped.
    /// Returned coordinates are in level space.
    pub fn detect_keypoints_at_scale(
        img: &Image,
        scale_level: &ScaleLevel,
        threshold: u8,
        border: usize,
    ) -> Vec<ScoredKeypoint> {
        let width = scale_level.width;
        let height = scale_level.height;
        let border = border.max(FAST_RADIUS + HARRIS_RADIUS as usize + 1);
        if width <= 2 * border || height <= 2 * border {
            return Vec::new();
        }

        (border..height - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row_keypoints = Vec::new();
                for x in border..width - border {
                    let center_pixel = img[y * width + x];
                    if Self::classify_pixel(img, width, x, y, center_pixel, threshold) == CornerType::None {
                        continue;
                    }
                    let response = Self::compute_harris_response(img, width, height, x, y);
                    if response <= 0.0 {
                        continue;
                    }
                    let mut keypoint = Keypoint::new(x as f32, y as f32);
                    keypoint.octave = scale_level.level as u8;
                    keypoint.response = response;
                    row_keypoints.push(ScoredKeypoint { keypoint, response });
                }
                row_keypoints
            })
            .collect()
    }

    /// FAST segment test: nine contiguous circle pixels all brighter or all
    /// darker than the centre by more than `threshold`
    pub(crate) fn classify_pixel(
        img: &Image,
        width: usize,
        x: usize,
        y: usize,
        center_pixel: u8,
        threshold: u8,
    ) -> CornerType {
        let center = center_pixel as i32;
        let t = threshold as i32;

        // Cheap rejection on the four compass pixels: a 9-arc covers at least two of them
        let mut compass_bright = 0;
        let mut compass_dark = 0;
        for &i in &[0usize, 4, 8, 12] {
            let (dx, dy) = Self::FAST_OFFSETS[i];
            let p = img[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize] as i32;
            if p > center + t {
                compass_bright += 1;
            } else if p < center - t {
                compass_dark += 1;
            }
        }
        if compass_bright < 2 && compass_dark < 2 {
            return CornerType::None;
        }

        let mut bright_mask = 0u16;
        let mut dark_mask = 0u16;
        for (i, &(dx, dy)) in Self::FAST_OFFSETS.iter().enumerate() {
            let p = img[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize] as i32;
            if p > center + t {
                bright_mask |= 1 << i;
            } else if p < center - t {
                dark_mask |= 1 << i;
            }
        }

        if has_contiguous_arc(bright_mask, FAST_ARC) {
            CornerType::Bright
        } else if has_contiguous_arc(dark_mask, FAST_ARC) {
            CornerType::Dark
        } else {
            CornerType::None
        }
    }

    /// Harris corner response over a 7x7 window: det(M) - k * trace(M)^2
    pub fn compute_harris_response(img: &Image, width: usize, height: usize, x: usize, y: usize) -> f32 {
        let r = HARRIS_RADIUS as usize + 1;
        if x < r || y < r || x + r >= width || y + r >= height {
            return 0.0;
        }

        let mut ixx = 0.0f64;
        let mut ixy = 0.0f64;
        let mut iyy = 0.0f64;

        for dy in -HARRIS_RADIUS..=HARRIS_RADIUS {
            for dx in -HARRIS_RADIUS..=HARRIS_RADIUS {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                let (gx, gy) = Self::compute_gradients(img, width, nx, ny);
                ixx += (gx * gx) as f64;
                ixy += (gx * gy) as f64;
                iyy += (gy * gy) as f64;
            }
        }

        let det = ixx * iyy - ixy * ixy;
        let trace = ixx + iyy;
        let harris_response = det - HARRIS_K as f64 * trace * trace;

        if harris_response > 0.0 {
            harris_response as f32
        } else {
            0.0
        }
    }

    /// Compute image gradients using Sobel operator; caller guarantees a 1 px margin
    fn compute_gradients(img: &Image, width: usize, x: usize, y: usize) -> (f32, f32) {
        let at = |xx: usize, yy: usize| img[yy * width + xx] as f32;

        // Sobel X kernel: [-1, 0, 1; -2, 0, 2; -1, 0, 1]
        let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
            - at(x - 1, y - 1) - 2.0 * at(x - 1, y) - at(x - 1, y + 1);

        // Sobel Y kernel: [-1, -2, -1; 0, 0, 0; 1, 2, 1]
        let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
            - at(x - 1, y - 1) - 2.0 * at(x, y - 1) - at(x + 1, y - 1);

        (gx / 8.0, gy / 8.0)
    }
}
