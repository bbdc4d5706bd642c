use camguard_core::Image;
use crate::error::FastResult;
use crate::types::ScaleLevel;

/// Smallest level side that still leaves room for the FAST circle and a patch
const MIN_LEVEL_SIZE: usize = 32;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate scale levels for image pyramid
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        n_levels: usize,
        scale_factor: f32,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::with_capacity(n_levels);
        let mut current_scale = 1.0f32;

        for level in 0..n_levels.max(1) {
            let scaled_width = ((width as f32) / current_scale).round() as usize;
            let scaled_height = ((height as f32) / current_scale).round() as usize;

            // The base level is always kept, even for tiny images
            if level > 0 && (scaled_width < MIN_LEVEL_SIZE || scaled_height < MIN_LEVEL_SIZE) {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build image pyramid from base image
    pub fn build_image_pyramid(
        img: &Image,
        width: usize,
        height: usize,
        scale_levels: &[ScaleLevel],
    ) -> FastResult<Vec<Image>> {
        let mut pyramid = Vec::with_capacity(scale_levels.len());

        for scale_level in scale_levels {
            if scale_level.level == 0 {
                pyramid.push(img.clone());
            } else {
                let downsampled = Self::downsample_image(
                    img,
                    width,
                    height,
                    scale_level.width,
                    scale_level.height,
                )?;
                pyramid.push(downsampled);
            }
        }

        Ok(pyramid)
    }

    /// Downsample image using bilinear interpolation
    fn downsample_image(
        img: &Image,
        src_width: usize,
        src_height: usize,
        target_width: usize,
        target_height: usize,
    ) -> FastResult<Image> {
        let mut downsampled = vec![0u8; target_width * target_height];

        let x_ratio = src_width as f32 / target_width as f32;
        let y_ratio = src_height as f32 / target_height as f32;

        for y in 0..target_height {
            let src_y = y as f32 * y_ratio;
            let row = &mut downsampled[y * target_width..(y + 1) * target_width];
            for (x, out) in row.iter_mut().enumerate() {
                let src_x = x as f32 * x_ratio;
                *out = Self::bilinear_sample(img, src_width, src_height, src_x, src_y)
                    .round()
                    .clamp(0.0, 255.0) as u8;
            }
        }

        Ok(downsampled)
    }

    /// Sample image at fractional coordinates using bilinear interpolation
    fn bilinear_sample(img: &Image, width: usize, height: usize, x: f32, y: f32) -> f32 {
        let x1 = (x.floor() as usize).min(width - 1);
        let y1 = (y.floor() as usize).min(height - 1);
        let x2 = (x1 + 1).min(width - 1);
        let y2 = (y1 + 1).min(height - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let p11 = img[y1 * width + x1] as f32;
        let p12 = img[y1 * width + x2] as f32;
        let p21 = img[y2 * width + x1] as f32;
        let p22 = img[y2 * width + x2] as f32;

        let interpolated_top = p11 * (1.0 - fx) + p12 * fx;
        let interpolated_bottom = p21 * (1.0 - fx) + p22 * fx;

        interpolated_top * (1.0 - fy) + interpolated_bottom * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_shrink_geometrically() {
        let levels = ImagePyramid::generate_scale_levels(640, 384, 8, 1.2);
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[0].width, 640);
        assert_eq!(levels[0].scale, 1.0);
        for pair in levels.windows(2) {
            assert!(pair[1].width < pair[0].width);
            assert!((pair[1].scale / pair[0].scale - 1.2).abs() < 1e-4);
        }
    }

    #[test]
    fn small_images_keep_only_base_level() {
        let levels = ImagePyramid::generate_scale_levels(20, 20, 8, 1.2);
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn flat_image_stays_flat() {
        let img = vec![77u8; 64 * 64];
        let levels = ImagePyramid::generate_scale_levels(64, 64, 3, 1.5);
        let pyramid = ImagePyramid::build_image_pyramid(&img, 64, 64, &levels).unwrap();
        assert_eq!(pyramid.len(), levels.len());
        for (level, data) in levels.iter().zip(&pyramid) {
            assert_eq!(data.len(), level.width * level.height);
            assert!(data.iter().all(|&v| v == 77));
        }
    }
}
