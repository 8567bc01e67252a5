mod cache;
mod cli;
mod config;
mod download;
mod error;
mod extract;
mod install;
mod platform;
mod types;

use anyhow::{Context, Result};
use cache::CacheStore;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction, InstallOverrides};
use config::{get_config_file_path, get_install_dir, get_preferred_cache_dir, load_settings};
use download::{BarProgress, HttpFetcher, NoProgress, ProgressObserver};
use install::{find_installed, Installer};
use platform::{get_system_info, resolve_target, SourceLocation, Target};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use types::{InstallSettings, InstalledBinary};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    match cli.command {
        Commands::Version => {
            println!("wkinstall v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Install { overrides } => {
            let settings = effective_settings(&overrides)?;
            match run_install(&settings, cli.quiet).await {
                Ok(binary) => println!("{}", binary.path.display()),
                Err(e) => {
                    tracing::error!("wkhtmltopdf - {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Path { overrides } => {
            let settings = effective_settings(&overrides)?;
            let (target, install_dir) = match locate(&settings) {
                Ok(located) => located,
                Err(e) => {
                    tracing::error!("{:#}", e);
                    std::process::exit(1);
                }
            };
            match find_installed(&install_dir, target) {
                Some(binary) if binary.is_ready() => println!("{}", binary.path.display()),
                _ => {
                    tracing::error!(
                        "wkhtmltopdf is not installed at {}. Run `wkinstall install` first.",
                        install_dir.join(target.binary_name()).display()
                    );
                    std::process::exit(1);
                }
            }
        }

        Commands::Convert {
            input,
            output,
            extra_args,
            overrides,
        } => {
            let settings = effective_settings(&overrides)?;
            let binary = match ensure_installed(&settings, cli.quiet).await {
                Ok(binary) => binary,
                Err(e) => {
                    tracing::error!("wkhtmltopdf - {}", e);
                    std::process::exit(1);
                }
            };

            let mut cmd = Command::new(&binary.path);
            cmd.args(&extra_args).arg(&input).arg(&output);

            tracing::debug!("Executing: {:?}", cmd);

            let status = cmd
                .spawn()
                .with_context(|| format!("Could not start {}", binary.path.display()))?
                .wait()?;
            if status.success() {
                tracing::info!("Conversion completed: {}", output.display());
            }
            std::process::exit(status.code().unwrap_or(1));
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let settings = load_settings()?;
                let rendered = match format.as_str() {
                    "yaml" => serde_yaml::to_string(&settings)?,
                    "json" => serde_json::to_string_pretty(&settings)?,
                    other => anyhow::bail!("Unknown format '{}'. Use json or yaml.", other),
                };
                println!("{}", rendered.trim_end());
            }
            ConfigAction::Path => {
                println!("{}", get_config_file_path()?.display());
            }
        },
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// Config file and environment, then command-line flags.
fn effective_settings(overrides: &InstallOverrides) -> Result<InstallSettings> {
    let mut settings = load_settings()?;

    if let Some(arch) = &overrides.arch {
        settings.arch = Some(arch.clone());
    }
    if let Some(url) = &overrides.cdn_url {
        settings.cdn_url = Some(url.clone());
    }
    if let Some(path) = &overrides.cdn_path {
        settings.cdn_path = Some(path.clone());
    }
    if overrides.ignore_cache {
        settings.ignore_cache = true;
    }
    if let Some(attempts) = overrides.max_attempts {
        settings.max_attempts = attempts;
    }
    if let Some(dir) = &overrides.cache_dir {
        settings.cache_dir = Some(dir.to_string_lossy().to_string());
    }
    if let Some(dir) = &overrides.install_dir {
        settings.install_dir = Some(dir.to_string_lossy().to_string());
    }

    tracing::debug!("Effective settings: {:?}", settings);
    Ok(settings)
}

fn locate(settings: &InstallSettings) -> Result<(Target, PathBuf)> {
    let host = get_system_info();
    let target = resolve_target(&host, settings.arch.as_deref())?;
    let install_dir = get_install_dir(settings)?;
    Ok((target, install_dir))
}

async fn run_install(settings: &InstallSettings, quiet: bool) -> Result<InstalledBinary> {
    // Unsupported platforms fail here, before any request is made
    let (target, install_dir) = locate(settings)?;
    let source = SourceLocation::new(
        target,
        settings.cdn_url.as_deref(),
        settings.cdn_path.as_deref(),
    );
    tracing::info!("Resolved {} to {}", target, source.resolved_url);
    tracing::debug!("CDN {} with path {}", source.base_url, source.path_template);

    let cache = CacheStore::open(
        get_preferred_cache_dir(settings),
        &install_dir,
        settings.ignore_cache,
    );

    let installer = Installer::new(HttpFetcher::new()?, cache, target, source, install_dir)
        .with_max_attempts(settings.max_attempts)
        .with_retry_delay(Duration::from_millis(settings.retry_delay_ms));

    let mut progress: Box<dyn ProgressObserver> = if quiet {
        Box::new(NoProgress)
    } else {
        eprintln!("Installing wkhtmltopdf for {}...", target);
        Box::new(BarProgress::new(&target.binary_name()))
    };
    let binary = installer.install(progress.as_mut()).await?;
    tracing::info!("wkhtmltopdf ready at {}", binary.path.display());
    Ok(binary)
}

async fn ensure_installed(settings: &InstallSettings, quiet: bool) -> Result<InstalledBinary> {
    let (target, install_dir) = locate(settings)?;
    if let Some(binary) = find_installed(&install_dir, target).filter(|b| b.is_ready()) {
        return Ok(binary);
    }

    tracing::info!("wkhtmltopdf not found locally. Attempting to install...");
    run_install(settings, quiet).await
}
