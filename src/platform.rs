use crate::error::{InstallError, Result};
use crate::types::PlatformInfo;
use std::fmt;

pub const DEFAULT_CDN_URL: &str = "https://static.oppie.io";
pub const DEFAULT_CDN_PATH: &str = "/bin/wkhtmltopdf/wkhtmltopdf-";
pub const BINARY_STEM: &str = "wkhtmltopdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Darwin,
    Linux,
    Win32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Ia32,
}

/// Every platform a wkhtmltopdf archive is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    DarwinX64,
    LinuxIa32,
    LinuxX64,
    Win32Ia32,
    Win32X64,
}

pub const ALL_TARGETS: [Target; 5] = [
    Target::DarwinX64,
    Target::LinuxIa32,
    Target::LinuxX64,
    Target::Win32Ia32,
    Target::Win32X64,
];

impl Os {
    fn parse(os: &str) -> Option<Os> {
        match os.to_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Some(Os::Darwin),
            "linux" => Some(Os::Linux),
            "win32" | "windows" => Some(Os::Win32),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::Win32 => "win32",
        }
    }
}

impl Arch {
    fn parse(arch: &str) -> Option<Arch> {
        match arch.to_lowercase().as_str() {
            "x64" | "amd64" | "x86_64" => Some(Arch::X64),
            "ia32" | "i386" | "i686" | "x86" => Some(Arch::Ia32),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Ia32 => "ia32",
        }
    }
}

impl Target {
    pub fn from_parts(os: Os, arch: Arch) -> Option<Target> {
        match (os, arch) {
            (Os::Darwin, Arch::X64) => Some(Target::DarwinX64),
            (Os::Linux, Arch::Ia32) => Some(Target::LinuxIa32),
            (Os::Linux, Arch::X64) => Some(Target::LinuxX64),
            (Os::Win32, Arch::Ia32) => Some(Target::Win32Ia32),
            (Os::Win32, Arch::X64) => Some(Target::Win32X64),
            // No 32-bit macOS build was ever published
            (Os::Darwin, Arch::Ia32) => None,
        }
    }

    /// Parses identity strings such as `linuxx64` or `win32ia32`.
    pub fn from_identity(identity: &str) -> Option<Target> {
        ALL_TARGETS
            .into_iter()
            .find(|t| t.identity() == identity.to_lowercase())
    }

    pub fn os(self) -> Os {
        match self {
            Target::DarwinX64 => Os::Darwin,
            Target::LinuxIa32 | Target::LinuxX64 => Os::Linux,
            Target::Win32Ia32 | Target::Win32X64 => Os::Win32,
        }
    }

    pub fn arch(self) -> Arch {
        match self {
            Target::LinuxIa32 | Target::Win32Ia32 => Arch::Ia32,
            Target::DarwinX64 | Target::LinuxX64 | Target::Win32X64 => Arch::X64,
        }
    }

    pub fn identity(self) -> String {
        format!("{}{}", self.os().as_str(), self.arch().as_str())
    }

    /// Suffix appended to the CDN path template.
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Target::DarwinX64 => "darwin-amd64.zip",
            Target::LinuxIa32 => "linux-i386.zip",
            Target::LinuxX64 => "linux-amd64.zip",
            Target::Win32Ia32 | Target::Win32X64 => "win32.zip",
        }
    }

    pub fn binary_suffix(self) -> &'static str {
        match self.os() {
            Os::Win32 => ".exe",
            Os::Darwin | Os::Linux => "",
        }
    }

    pub fn needs_shim(self) -> bool {
        self.os() == Os::Win32
    }

    pub fn binary_name(self) -> String {
        format!("{}{}", BINARY_STEM, self.binary_suffix())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}

/// Where the archive for a target lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub base_url: String,
    pub path_template: String,
    pub resolved_url: String,
}

impl SourceLocation {
    pub fn new(target: Target, base_url: Option<&str>, path_template: Option<&str>) -> Self {
        let base_url = base_url.unwrap_or(DEFAULT_CDN_URL).to_string();
        let path_template = path_template.unwrap_or(DEFAULT_CDN_PATH).to_string();
        let resolved_url = format!("{}{}{}", base_url, path_template, target.artifact_suffix());
        Self {
            base_url,
            path_template,
            resolved_url,
        }
    }
}

pub fn get_system_info() -> PlatformInfo {
    let os = match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        "windows" => "win32".to_string(),
        os => os.to_string(),
    };

    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64".to_string(),
        "x86" => "ia32".to_string(),
        arch => arch.to_string(),
    };

    PlatformInfo { os, arch }
}

/// Maps the host platform plus an optional override to a supported target.
///
/// The override is either a full identity (`linuxx64`) or a bare architecture
/// (`ia32`) combined with the host OS.
pub fn resolve_target(host: &PlatformInfo, arch_override: Option<&str>) -> Result<Target> {
    let unsupported = |identity: String| InstallError::UnsupportedPlatform { identity };

    if let Some(value) = arch_override {
        if let Some(target) = Target::from_identity(value) {
            return Ok(target);
        }
        let identity = format!("{}{}", host.os, value);
        return Os::parse(&host.os)
            .zip(Arch::parse(value))
            .and_then(|(os, arch)| Target::from_parts(os, arch))
            .ok_or_else(|| unsupported(identity));
    }

    let identity = format!("{}{}", host.os, host.arch);
    Os::parse(&host.os)
        .zip(Arch::parse(&host.arch))
        .and_then(|(os, arch)| Target::from_parts(os, arch))
        .ok_or_else(|| unsupported(identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(os: &str, arch: &str) -> PlatformInfo {
        PlatformInfo {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    #[test]
    fn test_every_target_has_url_and_binary_name() {
        for target in ALL_TARGETS {
            let source = SourceLocation::new(target, None, None);
            assert!(source
                .resolved_url
                .starts_with("https://static.oppie.io/bin/wkhtmltopdf/wkhtmltopdf-"));
            assert!(source.resolved_url.ends_with(".zip"));
            assert!(!target.binary_name().is_empty());
            assert_eq!(Target::from_identity(&target.identity()), Some(target));
        }
    }

    #[test]
    fn test_resolve_host_pairs() {
        assert_eq!(
            resolve_target(&host("linux", "x64"), None).unwrap(),
            Target::LinuxX64
        );
        assert_eq!(
            resolve_target(&host("darwin", "x64"), None).unwrap(),
            Target::DarwinX64
        );
        assert_eq!(
            resolve_target(&host("win32", "ia32"), None).unwrap(),
            Target::Win32Ia32
        );
        assert_eq!(
            resolve_target(&host("linux", "ia32"), None).unwrap(),
            Target::LinuxIa32
        );
    }

    #[test]
    fn test_unsupported_pairs() {
        for (os, arch) in [
            ("linux", "aarch64"),
            ("darwin", "aarch64"),
            ("darwin", "ia32"),
            ("freebsd", "x64"),
            ("win32", "arm"),
        ] {
            let err = resolve_target(&host(os, arch), None).unwrap_err();
            assert!(matches!(err, InstallError::UnsupportedPlatform { .. }));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_arch_override() {
        let linux = host("linux", "aarch64");
        assert_eq!(
            resolve_target(&linux, Some("win32x64")).unwrap(),
            Target::Win32X64
        );
        assert_eq!(
            resolve_target(&linux, Some("ia32")).unwrap(),
            Target::LinuxIa32
        );
        assert_eq!(
            resolve_target(&linux, Some("amd64")).unwrap(),
            Target::LinuxX64
        );

        let err = resolve_target(&linux, Some("solarissparc")).unwrap_err();
        assert_eq!(err.to_string(), "platform linuxsolarissparc is not supported");
    }

    #[test]
    fn test_windows_targets_need_shim() {
        assert!(Target::Win32X64.needs_shim());
        assert_eq!(Target::Win32Ia32.binary_name(), "wkhtmltopdf.exe");
        assert!(!Target::LinuxX64.needs_shim());
        assert_eq!(Target::DarwinX64.binary_name(), "wkhtmltopdf");
    }

    #[test]
    fn test_source_overrides() {
        let source = SourceLocation::new(
            Target::LinuxX64,
            Some("http://127.0.0.1:8080"),
            Some("/mirror/wk-"),
        );
        assert_eq!(
            source.resolved_url,
            "http://127.0.0.1:8080/mirror/wk-linux-amd64.zip"
        );
    }

    #[test]
    fn test_platform_info() {
        let info = get_system_info();
        assert!(!info.os.is_empty());
        assert!(!info.arch.is_empty());
    }
}
