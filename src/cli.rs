use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // If there's a git tag at HEAD, use just the tag (release build)
    if let Some(tag) = option_env!("WKINSTALL_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("WKINSTALL_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("WKINSTALL_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "wkinstall")]
#[command(about = "Fetches and installs the wkhtmltopdf binary for this platform")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download (or reuse the cached archive), unpack and verify wkhtmltopdf
    Install {
        #[command(flatten)]
        overrides: InstallOverrides,
    },

    /// Print the path of the installed binary; fails if it is not ready
    Path {
        #[command(flatten)]
        overrides: InstallOverrides,
    },

    /// Render an HTML file to PDF with the installed binary
    #[command(
        after_help = "Examples:\n  wkinstall convert report.html report.pdf\n  wkinstall convert page.html page.pdf -- --page-size A4 --quiet"
    )]
    Convert {
        /// HTML input file
        input: PathBuf,
        /// PDF output file
        output: PathBuf,
        /// Extra options passed to wkhtmltopdf before the input path
        #[arg(last = true)]
        extra_args: Vec<String>,
        #[command(flatten)]
        overrides: InstallOverrides,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

/// Per-invocation overrides; these win over environment and config file.
#[derive(Args, Debug, Default, Clone)]
pub struct InstallOverrides {
    /// Platform identity (e.g. 'linuxx64') or architecture (e.g. 'ia32')
    #[arg(long)]
    pub arch: Option<String>,
    /// Base URL of the CDN
    #[arg(long)]
    pub cdn_url: Option<String>,
    /// Path prefix on the CDN, completed by the platform suffix
    #[arg(long)]
    pub cdn_path: Option<String>,
    /// Always download, even if a cached archive exists
    #[arg(long)]
    pub ignore_cache: bool,
    /// Maximum download-extract-verify attempts
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,
    /// Directory holding downloaded archives
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Directory the binary is unpacked into
    #[arg(long)]
    pub install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show full configuration
    Show {
        /// Output format (json, yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Print the path of the configuration file
    Path,
}
