//! Batch runs over directory trees of baseline and sample images.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::{GuardConfig, IMAGE_EXTENSIONS, Mode};
use crate::error::{GuardError, GuardResult, IoContext};
use crate::fault::ScreenFaultDetector;
use crate::shift::{ShiftDetector, ShiftVerdict};
use crate::sink::{Category, CategorySinks, SummaryEntry};

/// One unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Baseline image, or the analysed image in fault-only mode
    pub baseline: PathBuf,
    pub comparison: Option<PathBuf>,
    pub artifact: Option<PathBuf>,
}

/// A path routed to a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub category: Category,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub jobs: usize,
    pub entries: Vec<SummaryEntry>,
    pub elapsed: Duration,
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn sorted_entries(dir: &Path) -> GuardResult<Vec<PathBuf>> {
    let mut out = std::fs::read_dir(dir)
        .with_path(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_path(dir)?;
    out.sort();
    Ok(out)
}

fn images_in(dir: &Path) -> GuardResult<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect())
}

fn artifact_path(save_path: &Path, group: &OsStr, image: &Path, extension: &str) -> PathBuf {
    let stem = image.file_stem().unwrap_or_default();
    let mut name = group.to_os_string();
    name.push("_");
    name.push(stem);
    name.push(".");
    name.push(extension);
    save_path.join(name)
}

/// Lists the jobs of a run in a stable order
pub fn plan_jobs(config: &GuardConfig) -> GuardResult<Vec<Job>> {
    let d = &config.driver;
    let ext = d.artifact_extension.as_str();
    let mut jobs = Vec::new();

    match d.mode {
        Mode::FaultOnly => {
            for device in sorted_entries(&d.standard_dir)?.into_iter().filter(|p| p.is_dir()) {
                for image in images_in(&device)? {
                    jobs.push(Job { baseline: image, comparison: None, artifact: None });
                }
            }
        }
        Mode::Fleet => {
            for device in sorted_entries(&d.standard_dir)?.into_iter().filter(|p| p.is_dir()) {
                let group = device.file_name().unwrap_or_default().to_os_string();
                for image in images_in(&device)? {
                    let file = image.file_name().unwrap_or_default();
                    jobs.push(Job {
                        comparison: Some(d.comparison_dir.join(&group).join(file)),
                        artifact: Some(artifact_path(&d.save_path, &group, &image, ext)),
                        baseline: image,
                    });
                }
            }
        }
        Mode::SingleDevice => {
            let group = d.standard_dir.file_name().unwrap_or_default().to_os_string();
            for image in images_in(&d.standard_dir)? {
                let file = image.file_name().unwrap_or_default();
                jobs.push(Job {
                    comparison: Some(d.comparison_dir.join(file)),
                    artifact: Some(artifact_path(&d.save_path, &group, &image, ext)),
                    baseline: image,
                });
            }
        }
    }
    Ok(jobs)
}

pub fn load_rgb(path: &Path) -> GuardResult<RgbImage> {
    let img = image::open(path).map_err(|source| GuardError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Routes a sample that could not be confirmed as unmoved
fn classify_sample(
    fault: &ScreenFaultDetector,
    sample: &RgbImage,
    sample_path: &Path,
    fallback: Routed,
) -> GuardResult<Routed> {
    let flags = fault.analyse(sample)?;
    Ok(match flags.category() {
        Some(category) => Routed { category, path: sample_path.to_path_buf() },
        None => fallback,
    })
}

/// Runs one job; `Ok(None)` means nothing to report
pub fn run_job(
    job: &Job,
    shift: &ShiftDetector,
    fault: &ScreenFaultDetector,
) -> GuardResult<Option<Routed>> {
    let Some(comparison_path) = &job.comparison else {
        let image = load_rgb(&job.baseline)?;
        let flags = fault.analyse(&image)?;
        return Ok(flags.category().map(|category| Routed {
            category,
            path: job.baseline.clone(),
        }));
    };

    let baseline = load_rgb(&job.baseline)?;
    let comparison = load_rgb(comparison_path)?;
    let report = shift.detect(&baseline, &comparison, job.artifact.as_deref())?;
    debug!(baseline = %job.baseline.display(), verdict = %report.verdict, "shift verdict");

    let routed = match report.verdict {
        ShiftVerdict::NoMove => None,
        ShiftVerdict::ShapeError => Some(Routed {
            category: Category::Error,
            path: job.baseline.clone(),
        }),
        ShiftVerdict::Moved => {
            let fallback = Routed {
                category: Category::Shift,
                path: report.artifact.clone().unwrap_or_else(|| comparison_path.clone()),
            };
            Some(classify_sample(fault, &comparison, comparison_path, fallback)?)
        }
        ShiftVerdict::Undetermined => {
            let fallback = Routed {
                category: Category::Undetermined,
                path: comparison_path.clone(),
            };
            Some(classify_sample(fault, &comparison, comparison_path, fallback)?)
        }
    };
    Ok(routed)
}

fn spawn_writer(
    sinks: CategorySinks,
    rx: Receiver<Routed>,
) -> std::thread::JoinHandle<GuardResult<Vec<SummaryEntry>>> {
    std::thread::spawn(move || {
        let mut sinks = sinks;
        for routed in rx.iter() {
            sinks.record(routed.category, &routed.path)?;
        }
        sinks.finish()
    })
}

/// Plans, runs and records a whole batch
pub fn run_batch(config: &GuardConfig) -> GuardResult<BatchSummary> {
    config.validate()?;
    let started = Instant::now();
    let shift = ShiftDetector::new(config.shift.clone())?;
    let fault = ScreenFaultDetector::new(config.fault.clone())?;
    let jobs = plan_jobs(config)?;
    info!(jobs = jobs.len(), mode = ?config.driver.mode, "starting batch");

    let sinks = CategorySinks::create(&config.driver.save_path)?;
    let (tx, rx) = crossbeam_channel::bounded::<Routed>(config.driver.jobs * 4);
    let writer = spawn_writer(sinks, rx);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.driver.jobs)
        .thread_name(|i| format!("camguard-job-{i}"))
        .build()?;
    let slow = Duration::from_secs_f64(config.driver.slow_job_warning_secs);

    pool.install(|| {
        jobs.par_iter().for_each_with(tx, |tx: &mut Sender<Routed>, job| {
            let t0 = Instant::now();
            let routed = match run_job(job, &shift, &fault) {
                Ok(r) => r,
                Err(e) => {
                    error!(baseline = %job.baseline.display(), "job failed: {e}");
                    Some(Routed {
                        category: Category::Error,
                        path: job.baseline.clone(),
                    })
                }
            };
            let elapsed = t0.elapsed();
            if elapsed > slow {
                warn!(baseline = %job.baseline.display(), ?elapsed, "slow job");
            }
            if let Some(r) = routed {
                if tx.send(r).is_err() {
                    error!("result writer stopped; dropping {}", job.baseline.display());
                }
            }
        });
    });

    let entries = writer
        .join()
        .map_err(|_| GuardError::WriterPanicked)??;

    let summary = BatchSummary {
        jobs: jobs.len(),
        entries,
        elapsed: started.elapsed(),
    };
    info!(jobs = summary.jobs, elapsed = ?summary.elapsed, "batch done");
    Ok(summary)
}
