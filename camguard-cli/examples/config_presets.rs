use camguard_cli::GuardConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Configuration Presets");
    println!("========================\n");

    let presets = [
        ("default", GuardConfig::default()),
        ("fast", GuardConfig::fast_preset()),
        ("dense", GuardConfig::dense_preset()),
    ];

    for (name, cfg) in &presets {
        cfg.validate()?;
        println!("   • {name}: {}", cfg.summary());
    }

    let dir = std::env::temp_dir().join("camguard-presets");
    std::fs::create_dir_all(&dir)?;
    for (name, cfg) in &presets {
        for ext in ["toml", "json"] {
            let path = dir.join(format!("{name}.{ext}"));
            cfg.save(&path)?;
            let back = GuardConfig::load(&path)?;
            assert_eq!(&back, cfg);
        }
    }
    println!("\n✅ Saved and reloaded presets in {}", dir.display());

    println!("\n📋 Default configuration as TOML:\n");
    println!("{}", GuardConfig::default().to_toml()?);
    Ok(())
}
