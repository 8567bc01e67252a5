use crate::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

pub const APP_NAME: &str = "wkinstall";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CACHE_DIR_NAME: &str = ".wkhtmltopdf";
pub const INSTALL_DIR_NAME: &str = "wkhtmltopdf";

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("WKINSTALL_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Settings file, then `WKHTMLTOPDF_*` environment overrides.
pub fn load_settings() -> Result<InstallSettings> {
    let config_path = get_config_file_path()?;

    let mut settings = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file at {}", config_path.display()))?;
        serde_json::from_str(&content).with_context(|| "Could not parse config file as JSON")?
    } else {
        InstallSettings::default()
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_env_overrides(settings: &mut InstallSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(arch) = var("WKHTMLTOPDF_ARCH") {
        settings.arch = Some(arch);
    }

    if let Some(url) = var("WKHTMLTOPDF_CDN_URL") {
        settings.cdn_url = Some(url);
    }

    if let Some(path) = var("WKHTMLTOPDF_CDN_PATH") {
        settings.cdn_path = Some(path);
    }

    if let Some(ignore) = var("WKHTMLTOPDF_IGNORE_CACHE") {
        settings.ignore_cache = ignore.to_lowercase() == "true" || ignore == "1";
    }

    if let Some(attempts) = var("WKHTMLTOPDF_MAX_ATTEMPTS") {
        match attempts.parse::<u32>() {
            Ok(n) if n > 0 => settings.max_attempts = n,
            _ => tracing::warn!("Ignoring invalid WKHTMLTOPDF_MAX_ATTEMPTS '{}'", attempts),
        }
    }

    if let Some(delay) = var("WKHTMLTOPDF_RETRY_DELAY_MS") {
        match delay.parse::<u64>() {
            Ok(ms) => settings.retry_delay_ms = ms,
            Err(_) => tracing::warn!("Ignoring invalid WKHTMLTOPDF_RETRY_DELAY_MS '{}'", delay),
        }
    }

    if let Some(dir) = var("WKHTMLTOPDF_CACHE_DIR") {
        settings.cache_dir = Some(dir);
    }

    if let Some(dir) = var("WKHTMLTOPDF_INSTALL_DIR") {
        settings.install_dir = Some(dir);
    }
}

/// The install directory sits next to the running executable unless overridden.
pub fn get_install_dir(settings: &InstallSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.install_dir {
        return Ok(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().context("Could not locate the running executable")?;
    let path = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Invalid executable path {}", exe.display()))?
        .join(INSTALL_DIR_NAME);
    tracing::debug!("Install directory: {}", path.display());
    Ok(path)
}

/// Preferred per-user cache directory; may not exist yet.
pub fn get_preferred_cache_dir(settings: &InstallSettings) -> Option<PathBuf> {
    if let Some(dir) = &settings.cache_dir {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(CACHE_DIR_NAME))
}
