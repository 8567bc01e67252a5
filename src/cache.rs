//! Local archive cache, one file per source URL.

use crate::extract::ArchiveKind;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ignore_cache: bool,
}

impl CacheStore {
    /// Uses `preferred` when it can be created and written, otherwise `fallback`.
    pub fn open(preferred: Option<PathBuf>, fallback: &Path, ignore_cache: bool) -> Self {
        let dir = match preferred {
            Some(dir) => match ensure_dir(&dir) {
                Ok(()) => dir,
                Err(e) => {
                    tracing::warn!(
                        "Cannot use cache directory {} ({}), falling back to {}",
                        dir.display(),
                        e,
                        fallback.display()
                    );
                    fallback.to_path_buf()
                }
            },
            None => fallback.to_path_buf(),
        };

        if let Err(e) = ensure_dir(&dir) {
            tracing::debug!("Cache directory {} not available yet: {}", dir.display(), e);
        }
        tracing::debug!("Cache directory: {}", dir.display());

        Self { dir, ignore_cache }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_for(url: &str) -> String {
        URL_SAFE_NO_PAD.encode(url.as_bytes())
    }

    pub fn path_for(&self, key: &str, kind: ArchiveKind) -> PathBuf {
        self.dir.join(format!("{}.{}", key, kind.extension()))
    }

    pub fn entry(&self, url: &str) -> CacheEntry {
        let key = Self::key_for(url);
        let path = self.path_for(&key, ArchiveKind::from_url(url));
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        CacheEntry {
            key,
            path,
            size_bytes,
        }
    }

    /// A missing or zero-byte file is a miss, and so is everything when the
    /// cache is ignored.
    pub fn is_valid(&self, path: &Path) -> bool {
        if self.ignore_cache {
            return false;
        }
        fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    pub fn invalidate(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!("Removed cache entry {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove cache entry {}: {}", path.display(), e),
        }
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    if !fs::metadata(dir)?.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "not a directory",
        ));
    }
    // An existing directory on a read-only filesystem passes the checks above
    tempfile::tempfile_in(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const URL: &str = "https://static.oppie.io/bin/wkhtmltopdf/wkhtmltopdf-linux-amd64.zip";

    #[test]
    fn test_key_is_reversible_and_path_safe() {
        let key = CacheStore::key_for(URL);
        assert!(!key.contains('/'));
        assert!(!key.contains('+'));
        assert!(!key.contains('='));
        assert_eq!(CacheStore::key_for(URL), key);
        assert_eq!(URL_SAFE_NO_PAD.decode(&key).unwrap(), URL.as_bytes());
        assert_ne!(CacheStore::key_for(&format!("{}?v=2", URL)), key);
    }

    #[test]
    fn test_zero_byte_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(Some(dir.path().to_path_buf()), dir.path(), false);
        let entry = store.entry(URL);

        assert!(!store.is_valid(&entry.path));
        fs::write(&entry.path, b"").unwrap();
        assert!(!store.is_valid(&entry.path));
        fs::write(&entry.path, b"PK").unwrap();
        assert!(store.is_valid(&entry.path));
        assert_eq!(store.entry(URL).size_bytes, 2);
        assert!(entry.path.to_string_lossy().ends_with(".zip"));
    }

    #[test]
    fn test_ignore_cache_reports_invalid() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(Some(dir.path().to_path_buf()), dir.path(), true);
        let entry = store.entry(URL);
        fs::write(&entry.path, b"archive bytes").unwrap();
        assert!(!store.is_valid(&entry.path));
    }

    #[test]
    fn test_falls_back_when_preferred_is_unusable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("home-file");
        fs::write(&blocker, b"not a directory").unwrap();
        let fallback = dir.path().join("install");

        let store = CacheStore::open(Some(blocker.join(".wkhtmltopdf")), &fallback, false);
        assert_eq!(store.dir(), fallback.as_path());
        assert!(fallback.is_dir());
    }

    #[test]
    fn test_entry_extension_follows_archive_kind() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(Some(dir.path().to_path_buf()), dir.path(), false);

        let xz = store.entry("https://x/wk.tar.xz");
        assert!(xz.path.to_string_lossy().ends_with(".tar.xz"));
        assert_eq!(xz.path, store.path_for(&xz.key, ArchiveKind::TarXz));

        let gz = store.entry("https://x/wk.tar.gz");
        assert!(gz.path.to_string_lossy().ends_with(".tar.gz"));
        assert_ne!(gz.key, xz.key);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_when_preferred_is_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let preferred = dir.path().join(".wkhtmltopdf");
        fs::create_dir(&preferred).unwrap();
        fs::set_permissions(&preferred, fs::Permissions::from_mode(0o555)).unwrap();
        let fallback = dir.path().join("install");

        // root ignores directory permissions
        let writable = tempfile::tempfile_in(&preferred).is_ok();
        let store = CacheStore::open(Some(preferred.clone()), &fallback, false);
        fs::set_permissions(&preferred, fs::Permissions::from_mode(0o755)).unwrap();

        if writable {
            assert_eq!(store.dir(), preferred.as_path());
        } else {
            assert_eq!(store.dir(), fallback.as_path());
        }
    }

    #[test]
    fn test_invalidate_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(Some(dir.path().to_path_buf()), dir.path(), false);
        let entry = store.entry(URL);
        store.invalidate(&entry.path);
        fs::write(&entry.path, b"data").unwrap();
        store.invalidate(&entry.path);
        assert!(!entry.path.exists());
    }
}
