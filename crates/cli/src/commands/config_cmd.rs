//! `wizard config`: show, locate, or initialize the config file.

use std::path::{Path, PathBuf};

use wizard_config::AppConfig;

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

pub async fn init(
    config_path: Option<&Path>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve(config_path);
    write_default(&path, force)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}
