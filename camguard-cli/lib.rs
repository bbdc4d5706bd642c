//! Camera shift and screen fault detection for fixed camera feeds.
//!
//! [`ShiftDetector`] compares a sample frame against a stored baseline
//! using ORB-style features, a region/angle consistency filter and a vote
//! over match displacements. [`ScreenFaultDetector`] classifies black,
//! snow and other faulty frames from intensity histograms and edge
//! density. The [`driver`] module runs both over directory trees and
//! writes per-category logs.

pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod fault;
pub mod logging;
pub mod region;
pub mod render;
pub mod shift;
pub mod sink;

pub use camguard_core::{self, Descriptor, ExtractorConfig, Keypoint};
pub use config::{Channel, DiagnosticsConfig, DriverConfig, FaultConfig, GuardConfig, Mode, ShiftConfig};
pub use driver::{BatchSummary, Job, Routed, plan_jobs, run_batch, run_job};
pub use error::{GuardError, GuardResult};
pub use extractor::{FeatureExtractor, Features, OrbExtractor};
pub use fault::{FaultFlags, ScreenFaultDetector};
pub use region::{GridSplit, RegionAngleFilter, RegionGrid, displacement_slope};
pub use shift::{DegeneratePolicy, FilteredMatch, MatchSelection, ShiftDetector, ShiftReport, ShiftVerdict};
pub use sink::{Category, CategorySinks, SummaryEntry};
