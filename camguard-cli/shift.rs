//! Keypoint-based detection of camera shift between a baseline and a sample.

use std::fmt;
use std::path::{Path, PathBuf};

use camguard_match::DescriptorMatcher;
use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ShiftConfig;
use crate::error::{GuardError, GuardResult};
use crate::extractor::{FeatureExtractor, OrbExtractor};
use crate::region::{RegionAngleFilter, RegionGrid};
use crate::render::{RenderOptions, compose_side_by_side, load_font, render_overlay, save_artifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftVerdict {
    NoMove,
    Moved,
    /// Baseline and sample differ in size
    ShapeError,
    /// One of the images produced no descriptors
    Undetermined,
}

impl fmt::Display for ShiftVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShiftVerdict::NoMove => "NoMove",
            ShiftVerdict::Moved => "Moved",
            ShiftVerdict::ShapeError => "ShapeError",
            ShiftVerdict::Undetermined => "Undetermined",
        };
        f.write_str(s)
    }
}

/// Verdict when either image has no descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    #[default]
    Undetermined,
    ReportMoved,
}

/// Which nearest-neighbour candidates become matches
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSelection {
    /// Always take the nearest neighbour
    #[default]
    NearestOnly,
    /// Keep the nearest only if it beats the runner-up by this ratio
    RatioTest(f32),
}

/// A match that passed the region and angle filter.
///
/// Coordinates are in the cropped images the keypoints were found in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredMatch {
    pub baseline: (f32, f32),
    pub comparison: (f32, f32),
    pub distance: f32,
}

/// Everything one `detect` call learned
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftReport {
    pub verdict: ShiftVerdict,
    pub matches: Vec<FilteredMatch>,
    /// Filtered matches displaced less than the threshold
    pub below_threshold: usize,
    pub baseline_keypoints: usize,
    pub comparison_keypoints: usize,
    /// Rows dropped from the top before extraction
    pub crop_offset: u32,
    /// Diagnostic image, when one was written
    pub artifact: Option<PathBuf>,
}

impl ShiftReport {
    fn new(verdict: ShiftVerdict) -> Self {
        Self {
            verdict,
            matches: Vec::new(),
            below_threshold: 0,
            baseline_keypoints: 0,
            comparison_keypoints: 0,
            crop_offset: 0,
            artifact: None,
        }
    }

    /// Median displacement of the filtered matches
    pub fn median_distance(&self) -> Option<f32> {
        if self.matches.is_empty() {
            return None;
        }
        let mut d: Vec<f32> = self.matches.iter().map(|m| m.distance).collect();
        d.sort_by(f32::total_cmp);
        Some(d[d.len() / 2])
    }
}

pub struct ShiftDetector {
    config: ShiftConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: Box<dyn DescriptorMatcher>,
    render: RenderOptions,
}

impl ShiftDetector {
    pub fn new(config: ShiftConfig) -> GuardResult<Self> {
        let extractor = OrbExtractor::new(config.extractor.clone());
        Self::with_extractor(config, Box::new(extractor))
    }

    /// Use `extractor` instead of the built-in ORB extractor
    pub fn with_extractor(config: ShiftConfig, extractor: Box<dyn FeatureExtractor>) -> GuardResult<Self> {
        config.validate()?;
        let font = config.diagnostics.font.as_deref().map(load_font).transpose()?;
        let render = RenderOptions {
            draw_grid: config.diagnostics.draw_grid,
            draw_matches: config.diagnostics.draw_matches,
            threshold: config.threshold,
            crop_offset: 0,
            seed: config.diagnostics.seed,
            font,
        };
        let matcher = config.matcher.build(config.lsh);
        Ok(Self {
            config,
            extractor,
            matcher,
            render,
        })
    }

    pub fn config(&self) -> &ShiftConfig {
        &self.config
    }

    /// Compare `comparison` against `baseline`.
    ///
    /// A diagnostic image is written to `artifact` for every verdict but
    /// `NoMove`.
    pub fn detect(
        &self,
        baseline: &RgbImage,
        comparison: &RgbImage,
        artifact: Option<&Path>,
    ) -> GuardResult<ShiftReport> {
        if is_empty(baseline) || is_empty(comparison) {
            return Err(GuardError::EmptyImage);
        }

        if baseline.dimensions() != comparison.dimensions() {
            debug!(
                baseline = ?baseline.dimensions(),
                comparison = ?comparison.dimensions(),
                "size mismatch"
            );
            let mut report = ShiftReport::new(ShiftVerdict::ShapeError);
            report.artifact = self.write(&compose_side_by_side(baseline, comparison), artifact)?;
            return Ok(report);
        }

        let (width, height) = baseline.dimensions();
        let (top, band) = self.crop_band(height);
        if band == 0 {
            return Err(GuardError::EmptyImage);
        }
        let base_gray = crop_gray(baseline, top, band);
        let cmp_gray = crop_gray(comparison, top, band);

        let base = self.extractor.extract(&base_gray)?;
        let cmp = self.extractor.extract(&cmp_gray)?;

        let mut report = ShiftReport::new(ShiftVerdict::Moved);
        report.baseline_keypoints = base.len();
        report.comparison_keypoints = cmp.len();
        report.crop_offset = top;

        if base.descriptors.is_empty() || cmp.descriptors.is_empty() {
            warn!(
                baseline = base.len(),
                comparison = cmp.len(),
                "no features to compare"
            );
            report.verdict = match self.config.degenerate {
                DegeneratePolicy::Undetermined => ShiftVerdict::Undetermined,
                DegeneratePolicy::ReportMoved => ShiftVerdict::Moved,
            };
            report.artifact = self.write_overlay(baseline, comparison, &report, artifact)?;
            return Ok(report);
        }

        let grid = RegionGrid::new(width as usize, height as usize, self.config.split)?;
        let filter = RegionAngleFilter::new(grid).with_tolerance(self.config.slope_tolerance);

        let knn = self.matcher.knn_match(&base.descriptors, &cmp.descriptors);
        let candidates = knn.len();
        report.matches = knn
            .iter()
            .filter(|m| match self.config.selection {
                MatchSelection::NearestOnly => true,
                MatchSelection::RatioTest(r) => m.passes_ratio(r),
            })
            .filter_map(|m| {
                let p1 = base.keypoints[m.best.query_idx].pt();
                let p2 = cmp.keypoints[m.best.train_idx].pt();
                filter.accepts(p1, p2).then(|| FilteredMatch {
                    baseline: p1,
                    comparison: p2,
                    distance: (p2.0 - p1.0).hypot(p2.1 - p1.1),
                })
            })
            .collect();
        report.below_threshold = report
            .matches
            .iter()
            .filter(|m| m.distance < self.config.threshold)
            .count();

        debug!(
            baseline = base.len(),
            comparison = cmp.len(),
            candidates,
            filtered = report.matches.len(),
            below_threshold = report.below_threshold,
            median = ?report.median_distance(),
            "shift matches"
        );

        if report.below_threshold >= self.config.min_matched_points {
            report.verdict = ShiftVerdict::NoMove;
        } else {
            report.artifact = self.write_overlay(baseline, comparison, &report, artifact)?;
        }
        Ok(report)
    }

    /// First kept row and number of kept rows
    fn crop_band(&self, height: u32) -> (u32, u32) {
        let top = (self.config.crop_top * height as f32) as u32;
        let bottom = ((self.config.crop_bottom * height as f32) as u32).min(height);
        (top, bottom.saturating_sub(top))
    }

    fn write_overlay(
        &self,
        baseline: &RgbImage,
        comparison: &RgbImage,
        report: &ShiftReport,
        path: Option<&Path>,
    ) -> GuardResult<Option<PathBuf>> {
        if path.is_none() {
            return Ok(None);
        }
        let options = RenderOptions {
            crop_offset: report.crop_offset,
            ..self.render.clone()
        };
        let overlay = render_overlay(baseline, comparison, &report.matches, &options);
        self.write(&overlay, path)
    }

    fn write(&self, image: &RgbImage, path: Option<&Path>) -> GuardResult<Option<PathBuf>> {
        match path {
            Some(p) => {
                save_artifact(image, p)?;
                Ok(Some(p.to_path_buf()))
            }
            None => Ok(None),
        }
    }
}

fn is_empty(image: &RgbImage) -> bool {
    image.width() == 0 || image.height() == 0
}

fn crop_gray(image: &RgbImage, top: u32, rows: u32) -> GrayImage {
    let band = imageops::crop_imm(image, 0, top, image.width(), rows).to_image();
    imageops::grayscale(&band)
}
