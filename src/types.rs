use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallSettings {
    /// Identity (`linuxx64`) or bare architecture (`ia32`) override
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub cdn_url: Option<String>,
    #[serde(default)]
    pub cdn_path: Option<String>,
    #[serde(default)]
    pub ignore_cache: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub install_dir: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            arch: None,
            cdn_url: None,
            cdn_path: None,
            ignore_cache: false,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            cache_dir: None,
            install_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

/// A verified binary, ready to be handed to the document converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    pub path: PathBuf,
    pub executable: bool,
    pub size_bytes: u64,
}

impl InstalledBinary {
    pub fn is_ready(&self) -> bool {
        self.executable && self.size_bytes > 0
    }
}
