use std::path::PathBuf;

use anyhow::{Context, Result};
use camguard_cli::{GridSplit, GuardConfig, MatchSelection, Mode, logging};
use camguard_match::MatcherKind;
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera shift and screen fault inspection", long_about = None)]
struct Cli {
    /// TOML or JSON configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// fault-only (A), fleet (B) or single-device (C)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Baseline images (analysed images in fault-only mode)
    #[arg(long)]
    standard_dir: Option<PathBuf>,

    /// Sample images, laid out like the baseline directory
    #[arg(long)]
    comparison_dir: Option<PathBuf>,

    /// Where logs, manifest and diagnostic images go
    #[arg(long)]
    save_path: Option<PathBuf>,

    /// Pixel displacement below which a match counts as unmoved
    #[arg(long)]
    threshold: Option<f32>,

    /// Unmoved matches needed to report no movement
    #[arg(long)]
    min_matched_points: Option<usize>,

    /// Grid rows and columns, e.g. `3,3`
    #[arg(long, value_delimiter = ',', num_args = 2)]
    split: Option<Vec<usize>>,

    /// Keypoint cap per image
    #[arg(long)]
    n_features: Option<usize>,

    #[arg(long, value_enum)]
    matcher: Option<MatcherArg>,

    /// Apply a ratio test to the two nearest neighbours
    #[arg(long)]
    ratio: Option<f32>,

    /// Draw matches on diagnostic images
    #[arg(long)]
    draw_matches: bool,

    /// Seed for diagnostic marker colours
    #[arg(long)]
    seed: Option<u64>,

    /// Font for distance labels
    #[arg(long)]
    font: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Error log file; defaults to AlgorithmError.log in the save path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// No console logging
    #[arg(short, long)]
    quiet: bool,

    /// Write the effective configuration here and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum MatcherArg {
    BruteForce,
    Lsh,
}

impl From<MatcherArg> for MatcherKind {
    fn from(m: MatcherArg) -> Self {
        match m {
            MatcherArg::BruteForce => MatcherKind::BruteForce,
            MatcherArg::Lsh => MatcherKind::Lsh,
        }
    }
}

impl Cli {
    fn apply(&self, cfg: &mut GuardConfig) -> Result<()> {
        let d = &mut cfg.driver;
        if let Some(mode) = self.mode {
            d.mode = mode;
        }
        if let Some(p) = &self.standard_dir {
            d.standard_dir = p.clone();
        }
        if let Some(p) = &self.comparison_dir {
            d.comparison_dir = p.clone();
        }
        if let Some(p) = &self.save_path {
            d.save_path = p.clone();
        }
        if let Some(j) = self.jobs {
            d.jobs = j;
        }

        let s = &mut cfg.shift;
        if let Some(t) = self.threshold {
            s.threshold = t;
        }
        if let Some(n) = self.min_matched_points {
            s.min_matched_points = n;
        }
        if let Some(split) = &self.split {
            s.split = GridSplit::new(split[0], split[1]).context("invalid --split")?;
        }
        if let Some(n) = self.n_features {
            s.extractor.max_features = n;
        }
        if let Some(m) = self.matcher {
            s.matcher = m.into();
        }
        if let Some(r) = self.ratio {
            s.selection = MatchSelection::RatioTest(r);
        }
        if self.draw_matches {
            s.diagnostics.draw_matches = true;
        }
        if let Some(seed) = self.seed {
            s.diagnostics.seed = Some(seed);
        }
        if let Some(font) = &self.font {
            s.diagnostics.font = Some(font.clone());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => GuardConfig::default(),
    };
    cli.apply(&mut cfg)?;
    cfg.validate().context("invalid configuration")?;

    if let Some(path) = &cli.write_config {
        cfg.save(path)
            .with_context(|| format!("writing configuration {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&cfg.driver.save_path)
        .with_context(|| format!("creating {}", cfg.driver.save_path.display()))?;
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| cfg.driver.save_path.join("AlgorithmError.log"));
    logging::initiate_logging(Some(&log_file), cli.quiet)
        .map_err(|e| anyhow::anyhow!(e))
        .context("starting logging")?;

    info!("{}", cfg.summary());
    let summary = camguard_cli::run_batch(&cfg).context("batch run failed")?;

    for entry in &summary.entries {
        println!("{:<14} {:>6}  {}", entry.kind, entry.count, entry.path.display());
    }
    println!("{} jobs in {:.1?}", summary.jobs, summary.elapsed);
    Ok(())
}
