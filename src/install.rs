use crate::cache::{CacheEntry, CacheStore};
use crate::download::{Fetch, ProgressObserver};
use crate::error::{InstallError, Result};
use crate::extract::{extract_archive, ArchiveKind};
use crate::platform::{SourceLocation, Target, BINARY_STEM};
use crate::types::InstalledBinary;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retry bookkeeping threaded through the acquisition loop.
#[derive(Debug)]
pub struct AttemptContext {
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<InstallError>,
    /// Set after any failure so the next attempt ignores the cache entry.
    pub force_download: bool,
}

impl AttemptContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            last_error: None,
            force_download: false,
        }
    }

    /// Consumes a failed attempt. Returns the context for the next attempt, or
    /// the terminal error once the budget is spent.
    pub fn next(self, error: InstallError) -> Result<Self> {
        if self.attempt >= self.max_attempts {
            return Err(InstallError::AttemptsExhausted {
                attempts: self.attempt,
                last: Box::new(error),
            });
        }
        Ok(Self {
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
            last_error: Some(error),
            force_download: true,
        })
    }
}

/// Drives cache check, download, extraction and verification until the
/// binary is installed or the attempt budget runs out.
pub struct Installer<F: Fetch> {
    fetcher: F,
    cache: CacheStore,
    target: Target,
    source: SourceLocation,
    install_dir: PathBuf,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<F: Fetch> Installer<F> {
    pub fn new(
        fetcher: F,
        cache: CacheStore,
        target: Target,
        source: SourceLocation,
        install_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            cache,
            target,
            source,
            install_dir,
            max_attempts: 3,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn install(&self, progress: &mut dyn ProgressObserver) -> Result<InstalledBinary> {
        let entry = self.cache.entry(&self.source.resolved_url);
        tracing::debug!(
            "Cache entry {} ({} bytes)",
            entry.path.display(),
            entry.size_bytes
        );

        let lock = acquisition_lock(&entry.key);
        let _guard = lock.lock().await;

        let mut ctx = AttemptContext::new(self.max_attempts);
        loop {
            match self.attempt(&ctx, &entry, progress).await {
                Ok(binary) => {
                    tracing::info!("Binary unpacked to {}", binary.path.display());
                    return Ok(binary);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    self.cache.invalidate(&entry.path);
                    ctx = ctx.next(e)?;
                    if let Some(last) = &ctx.last_error {
                        tracing::warn!(
                            "Attempt {}/{} failed: {}",
                            ctx.attempt - 1,
                            ctx.max_attempts,
                            last
                        );
                    }
                    tracing::warn!("Install failed, retrying in {:?}", self.retry_delay);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &AttemptContext,
        entry: &CacheEntry,
        progress: &mut dyn ProgressObserver,
    ) -> Result<InstalledBinary> {
        let url = &self.source.resolved_url;

        if !ctx.force_download && self.cache.is_valid(&entry.path) {
            tracing::info!("Cached download found at {}", entry.path.display());
        } else {
            self.fetcher.fetch(url, &entry.path, progress).await?;
            let size = fs::metadata(&entry.path).map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                return Err(InstallError::CorruptedArtifact {
                    path: entry.path.clone(),
                });
            }
        }

        clear_previous_install(&self.install_dir, self.target)?;

        let archive = entry.path.clone();
        let install_dir = self.install_dir.clone();
        let kind = ArchiveKind::from_url(url);
        tokio::task::spawn_blocking(move || extract_archive(&archive, &install_dir, kind))
            .await
            .map_err(|e| InstallError::extraction(&entry.path, e))??;

        verify_install(&self.install_dir, self.target)
    }
}

/// One acquisition in flight per cache key within this process.
fn acquisition_lock(key: &str) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key.to_string()).or_default().clone()
}

fn shim_path(install_dir: &Path) -> PathBuf {
    install_dir.join(format!("{}.cmd", BINARY_STEM))
}

/// A stale binary from an earlier install must not satisfy verification of a
/// new archive.
fn clear_previous_install(install_dir: &Path, target: Target) -> Result<()> {
    for path in [install_dir.join(target.binary_name()), shim_path(install_dir)] {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed previous {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(InstallError::io(&path, e)),
        }
    }
    Ok(())
}

/// Sets the executable bit, writes the Windows launcher, then checks that a
/// non-empty binary is in place.
pub fn verify_install(install_dir: &Path, target: Target) -> Result<InstalledBinary> {
    let binary = install_dir.join(target.binary_name());

    if target.needs_shim() {
        let shim = shim_path(install_dir);
        fs::write(&shim, target.binary_name()).map_err(|e| InstallError::io(&shim, e))?;
        tracing::debug!("Wrote launcher {}", shim.display());
    }

    let corrupted = || InstallError::CorruptedArtifact {
        path: binary.clone(),
    };

    let executable = make_executable(&binary).map_err(|e| {
        tracing::debug!("Could not set permissions on {}: {}", binary.display(), e);
        corrupted()
    })?;

    let metadata = fs::metadata(&binary).map_err(|_| corrupted())?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(corrupted());
    }

    Ok(InstalledBinary {
        path: binary.clone(),
        executable,
        size_bytes: metadata.len(),
    })
}

fn make_executable(path: &Path) -> std::io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        fs::metadata(path)?;
    }
    Ok(true)
}

/// Inspects an existing install without modifying it.
pub fn find_installed(install_dir: &Path, target: Target) -> Option<InstalledBinary> {
    let path = install_dir.join(target.binary_name());
    let metadata = fs::metadata(&path).ok()?;
    if !metadata.is_file() {
        return None;
    }

    #[cfg(unix)]
    let executable = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    };
    #[cfg(not(unix))]
    let executable = true;

    Some(InstalledBinary {
        path,
        executable,
        size_bytes: metadata.len(),
    })
}
