//! Diagnostic composites written next to shift verdicts.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{GuardError, GuardResult, IoContext};
use crate::shift::FilteredMatch;

pub const GRID_COLOUR: Rgb<u8> = Rgb([154, 131, 152]);
const NEAR_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_SCALE: f32 = 24.0;

/// Both images left to right on a white canvas as tall as the taller one
pub fn compose_side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// Options for `render_overlay`
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub draw_grid: bool,
    pub draw_matches: bool,
    /// Matches closer than this are drawn as unmoved
    pub threshold: f32,
    /// Rows cut from the top before matching; added back when drawing
    pub crop_offset: u32,
    pub seed: Option<u64>,
    pub font: Option<FontArc>,
}

/// Side-by-side composite of two equally sized images with grid lines at
/// every tenth of each axis and, optionally, the filtered matches.
pub fn render_overlay(
    baseline: &RgbImage,
    comparison: &RgbImage,
    matches: &[FilteredMatch],
    options: &RenderOptions,
) -> RgbImage {
    let mut canvas = compose_side_by_side(baseline, comparison);
    let (w, h) = (baseline.width() as f32, baseline.height() as f32);

    if options.draw_matches {
        let mut rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let dy = options.crop_offset as f32;

        for m in matches {
            let p1 = (m.baseline.0, m.baseline.1 + dy);
            let p2 = (m.comparison.0 + w, m.comparison.1 + dy);
            let c1 = (p1.0 as i32, p1.1 as i32);
            let c2 = (p2.0 as i32, p2.1 as i32);

            if m.distance < options.threshold {
                draw_hollow_circle_mut(&mut canvas, c1, 4, NEAR_COLOUR);
                draw_hollow_circle_mut(&mut canvas, c2, 4, NEAR_COLOUR);
                draw_line_segment_mut(&mut canvas, p1, p2, NEAR_COLOUR);
                if let Some(font) = &options.font {
                    let x = ((p1.0 + p2.0) / 2.0) as i32;
                    let label = format!("{:.2}", m.distance);
                    draw_text_mut(&mut canvas, NEAR_COLOUR, x, c1.1, PxScale::from(LABEL_SCALE), font, &label);
                }
            } else {
                let colour = Rgb([rng.random(), rng.random(), rng.random()]);
                draw_filled_circle_mut(&mut canvas, c1, 2, colour);
                draw_filled_circle_mut(&mut canvas, c2, 2, colour);
            }
        }
    }

    if options.draw_grid {
        let step_y = (baseline.height() / 10) as f32;
        let step_x = (baseline.width() / 10) as f32;
        for i in 1..=10 {
            let y = step_y * i as f32;
            draw_line_segment_mut(&mut canvas, (0.0, y), (2.0 * w, y), GRID_COLOUR);
            let x = step_x * i as f32;
            draw_line_segment_mut(&mut canvas, (x, 0.0), (x, h), GRID_COLOUR);
            draw_line_segment_mut(&mut canvas, (x + w, 0.0), (x + w, h), GRID_COLOUR);
        }
    }

    debug!(matches = matches.len(), "rendered overlay");
    canvas
}

pub fn load_font(path: &Path) -> GuardResult<FontArc> {
    let bytes = std::fs::read(path).with_path(path)?;
    FontArc::try_from_vec(bytes).map_err(|_| GuardError::Font {
        path: path.to_path_buf(),
    })
}

/// Encode by extension, creating parent directories as needed
pub fn save_artifact(image: &RgbImage, path: &Path) -> GuardResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    image.save(path).map_err(|source| GuardError::Encode {
        path: path.to_path_buf(),
        source,
    })
}
