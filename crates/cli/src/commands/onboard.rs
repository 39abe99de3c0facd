//! `toolwright onboard`: First-time setup.

use std::path::Path;

use toolwright_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();

    println!("Toolwright: First-Time Setup");
    println!("============================\n");

    let created = write_default_config(&config_dir)?;
    let config_path = config_dir.join("config.toml");

    if created {
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Optionally add tool keys under [tools] (OpenWeatherMap, CoinGecko, Brave)");
        println!("   3. Run: toolwright agent\n");
    } else {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default `config.toml` into `dir`, creating the directory.
///
/// Returns `false` without touching anything if the file already exists.
pub fn write_default_config(dir: &Path) -> std::io::Result<bool> {
    let config_path = dir.join("config.toml");
    if config_path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    Ok(true)
}
