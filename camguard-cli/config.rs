use std::path::{Path, PathBuf};

use camguard_core::ExtractorConfig;
use camguard_fast::DetectorConfig;
use camguard_match::{LshParams, MatcherKind};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult, IoContext};
use crate::region::GridSplit;
use crate::shift::{DegeneratePolicy, MatchSelection};

/// tan(5°), rounded as the slope itself is
pub const DEFAULT_SLOPE_TOLERANCE: f64 = 0.0874759;

/// Settings of the keypoint-based shift check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    /// Displacement (pixels) below which a match counts as unmoved
    pub threshold: f32,
    /// Unmoved matches needed for `NoMove`
    pub min_matched_points: usize,
    pub split: GridSplit,
    /// Kept band of rows, as fractions of the height
    pub crop_top: f32,
    pub crop_bottom: f32,
    /// Largest accepted |dy/dx| of a match
    pub slope_tolerance: f64,
    pub extractor: ExtractorConfig,
    pub matcher: MatcherKind,
    pub lsh: LshParams,
    pub selection: MatchSelection,
    pub degenerate: DegeneratePolicy,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            threshold: 4.0,
            min_matched_points: 2,
            split: GridSplit { rows: 3, cols: 3 },
            crop_top: 0.1,
            crop_bottom: 0.9,
            slope_tolerance: DEFAULT_SLOPE_TOLERANCE,
            extractor: ExtractorConfig::default(),
            matcher: MatcherKind::default(),
            lsh: LshParams::default(),
            selection: MatchSelection::default(),
            degenerate: DegeneratePolicy::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl ShiftConfig {
    pub fn validate(&self) -> GuardResult<()> {
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(invalid(format!("threshold must be positive, got {}", self.threshold)));
        }
        if self.min_matched_points == 0 {
            return Err(invalid("min_matched_points must be at least 1"));
        }
        self.split.validate()?;
        if !(0.0 <= self.crop_top && self.crop_top < self.crop_bottom && self.crop_bottom <= 1.0) {
            return Err(invalid(format!(
                "crop band {}..{} must satisfy 0 <= top < bottom <= 1",
                self.crop_top, self.crop_bottom
            )));
        }
        if !(self.slope_tolerance >= 0.0) {
            return Err(invalid(format!("slope_tolerance {}", self.slope_tolerance)));
        }
        if let MatchSelection::RatioTest(r) = self.selection {
            if !(r > 0.0 && r <= 1.0) {
                return Err(invalid(format!("ratio {r} outside (0, 1]")));
            }
        }
        self.extractor.validate().map_err(GuardError::InvalidConfig)?;
        self.lsh.validate().map_err(GuardError::InvalidConfig)?;
        Ok(())
    }
}

/// What goes into the diagnostic composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub draw_grid: bool,
    /// Mark matches: red circles and lines below threshold, coloured dots above
    pub draw_matches: bool,
    /// Seed for marker colours; entropy when unset
    pub seed: Option<u64>,
    /// TTF/OTF used for distance labels; labels are skipped without one
    pub font: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            draw_grid: true,
            draw_matches: false,
            seed: None,
            font: None,
        }
    }
}

/// Colour channel the intensity histogram is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Red,
    Green,
    #[default]
    Blue,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Settings of the screen fault classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Fraction of all pixels a histogram band must exceed
    pub hist_threshold: f64,
    pub slide_window_size: usize,
    pub edge_density_cutoff: f64,
    pub blur_kernel: usize,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub channel: Channel,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            hist_threshold: 0.7,
            slide_window_size: 20,
            edge_density_cutoff: 0.1,
            blur_kernel: 7,
            blur_sigma: 4.0,
            canny_low: 127.0,
            canny_high: 200.0,
            channel: Channel::Blue,
        }
    }
}

impl FaultConfig {
    pub fn validate(&self) -> GuardResult<()> {
        if !(self.hist_threshold > 0.0 && self.hist_threshold < 1.0) {
            return Err(invalid(format!("hist_threshold {} outside (0, 1)", self.hist_threshold)));
        }
        if !(1..=215).contains(&self.slide_window_size) {
            return Err(invalid(format!(
                "slide_window_size {} outside 1..=215",
                self.slide_window_size
            )));
        }
        if !(0.0..=1.0).contains(&self.edge_density_cutoff) {
            return Err(invalid(format!("edge_density_cutoff {}", self.edge_density_cutoff)));
        }
        if self.blur_kernel % 2 == 0 {
            return Err(invalid(format!("blur_kernel {} must be odd", self.blur_kernel)));
        }
        if !(self.blur_sigma > 0.0) {
            return Err(invalid(format!("blur_sigma {}", self.blur_sigma)));
        }
        if !(self.canny_low >= 0.0 && self.canny_low <= self.canny_high) {
            return Err(invalid(format!(
                "canny thresholds {}/{} must satisfy 0 <= low <= high",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

/// Directory layout a batch is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Fault analysis of every image in `standard_dir/*/*`
    #[serde(alias = "A")]
    #[value(aliases = ["A", "a"])]
    FaultOnly,
    /// Shift check of every device folder, faults for moved samples
    #[default]
    #[serde(alias = "B")]
    #[value(aliases = ["B", "b"])]
    Fleet,
    /// Shift check of one device folder
    #[serde(alias = "C")]
    #[value(aliases = ["C", "c"])]
    SingleDevice,
}

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Batch driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub mode: Mode,
    pub standard_dir: PathBuf,
    pub comparison_dir: PathBuf,
    /// Category logs, manifest and artifacts go here
    pub save_path: PathBuf,
    pub jobs: usize,
    pub slow_job_warning_secs: f64,
    pub artifact_extension: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            standard_dir: PathBuf::from("standard"),
            comparison_dir: PathBuf::from("comparison"),
            save_path: PathBuf::from("results"),
            jobs: num_cpus::get().max(1),
            slow_job_warning_secs: 30.0,
            artifact_extension: "jpg".to_string(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> GuardResult<()> {
        if self.jobs == 0 {
            return Err(invalid("jobs must be at least 1"));
        }
        if !(self.slow_job_warning_secs > 0.0) {
            return Err(invalid(format!("slow_job_warning_secs {}", self.slow_job_warning_secs)));
        }
        if !IMAGE_EXTENSIONS.contains(&self.artifact_extension.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!("artifact_extension {:?}", self.artifact_extension)));
        }
        Ok(())
    }
}

/// Everything a batch run needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub shift: ShiftConfig,
    pub fault: FaultConfig,
    pub driver: DriverConfig,
}

impl GuardConfig {
    /// Fewer, stronger corners and exact matching
    pub fn fast_preset() -> Self {
        let mut cfg = Self::default();
        cfg.shift.extractor = DetectorConfig::fast_preset(0, 0).core;
        cfg.shift.matcher = MatcherKind::BruteForce;
        cfg
    }

    /// Low FAST threshold for dim or low-contrast scenes
    pub fn dense_preset() -> Self {
        let mut cfg = Self::default();
        cfg.shift.extractor = DetectorConfig::dense_preset(0, 0).core;
        cfg
    }

    pub fn validate(&self) -> GuardResult<()> {
        self.shift.validate()?;
        self.fault.validate()?;
        self.driver.validate()
    }

    /// Load from a `.toml` or `.json` file and validate
    pub fn load<P: AsRef<Path>>(path: P) -> GuardResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_path(path)?;
        let parse_err = |message: String| GuardError::ConfigParse {
            path: path.to_path_buf(),
            message,
        };
        let config: Self = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Write as JSON when the extension says so, TOML otherwise
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GuardResult<()> {
        let path = path.as_ref();
        let text = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| GuardError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            self.to_toml()?
        };
        std::fs::write(path, text).with_path(path)
    }

    pub fn to_toml(&self) -> GuardResult<String> {
        toml::to_string_pretty(self).map_err(|e| GuardError::ConfigParse {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "mode={:?} threshold={} min_matched={} split={}x{} matcher={:?} max_features={} hist={} window={} edge_cutoff={} jobs={}",
            self.driver.mode,
            self.shift.threshold,
            self.shift.min_matched_points,
            self.shift.split.rows,
            self.shift.split.cols,
            self.shift.matcher,
            self.shift.extractor.max_features,
            self.fault.hist_threshold,
            self.fault.slide_window_size,
            self.fault.edge_density_cutoff,
            self.driver.jobs,
        )
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn invalid(msg: impl Into<String>) -> GuardError {
    GuardError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_presets_validate() {
        for cfg in [GuardConfig::default(), GuardConfig::fast_preset(), GuardConfig::dense_preset()] {
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn rejects_bad_shift_settings() {
        let mut cfg = ShiftConfig::default();
        cfg.split = GridSplit { rows: 0, cols: 3 };
        assert!(cfg.validate().is_err());

        let mut cfg = ShiftConfig::default();
        cfg.threshold = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ShiftConfig::default();
        cfg.crop_top = 0.9;
        cfg.crop_bottom = 0.1;
        assert!(cfg.validate().is_err());

        let mut cfg = ShiftConfig::default();
        cfg.selection = MatchSelection::RatioTest(1.5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_fault_settings() {
        let mut cfg = FaultConfig::default();
        cfg.hist_threshold = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = FaultConfig::default();
        cfg.blur_kernel = 6;
        assert!(cfg.validate().is_err());

        let mut cfg = FaultConfig::default();
        cfg.canny_low = 250.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: GuardConfig = toml::from_str(
            r#"
            [shift]
            threshold = 6.5
            split = { rows = 2, cols = 4 }

            [driver]
            mode = "A"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.shift.threshold, 6.5);
        assert_eq!(cfg.shift.split, GridSplit { rows: 2, cols: 4 });
        assert_eq!(cfg.shift.min_matched_points, 2);
        assert_eq!(cfg.driver.mode, Mode::FaultOnly);
        assert_eq!(cfg.fault, FaultConfig::default());
    }

    #[test]
    fn save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = GuardConfig::dense_preset();
        cfg.shift.selection = MatchSelection::RatioTest(0.75);
        cfg.shift.diagnostics.seed = Some(9);
        for name in ["guard.toml", "guard.json"] {
            let path = dir.path().join(name);
            cfg.save(&path).unwrap();
            assert_eq!(GuardConfig::load(&path).unwrap(), cfg);
        }
    }
}
