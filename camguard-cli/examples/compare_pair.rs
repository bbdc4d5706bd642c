use camguard_cli::{FaultConfig, ScreenFaultDetector, ShiftConfig, ShiftDetector};
use camguard_cli::driver::load_rgb;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("📷 Camera Shift Check");
    println!("=====================\n");

    let mut args = std::env::args().skip(1);
    let (Some(baseline), Some(sample)) = (args.next(), args.next()) else {
        eprintln!("usage: compare_pair <baseline> <sample> [overlay.jpg]");
        std::process::exit(2);
    };
    let overlay = PathBuf::from(args.next().unwrap_or_else(|| "overlay.jpg".to_string()));

    let baseline = load_rgb(Path::new(&baseline))?;
    let sample = load_rgb(Path::new(&sample))?;
    println!("Baseline {}x{}, sample {}x{}", baseline.width(), baseline.height(), sample.width(), sample.height());

    let mut config = ShiftConfig::default();
    config.diagnostics.draw_matches = true;
    config.diagnostics.seed = Some(7);
    camguard_cli::camguard_core::init_thread_pool(config.extractor.n_threads)?;
    let detector = ShiftDetector::new(config)?;

    let t0 = Instant::now();
    let report = detector.detect(&baseline, &sample, Some(&overlay))?;
    println!("\n🔎 Verdict: {} in {:.2?}", report.verdict, t0.elapsed());
    println!("   • keypoints: {} / {}", report.baseline_keypoints, report.comparison_keypoints);
    println!("   • filtered matches: {}", report.matches.len());
    println!("   • below threshold: {}", report.below_threshold);
    if let Some(median) = report.median_distance() {
        println!("   • median displacement: {median:.2}px");
    }
    if let Some(path) = &report.artifact {
        println!("   • overlay: {}", path.display());
    }

    let faults = ScreenFaultDetector::new(FaultConfig::default())?.analyse(&sample)?;
    println!("\n🖥️  Sample screen: {:?} (edge density {:.3})", faults.category(), faults.edge_density);
    Ok(())
}
