use crate::error::{InstallError, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::Path;
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveKind {
    /// Detects the format from the URL path; anything unrecognised is a zip.
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if path.ends_with(".tar.xz") {
            ArchiveKind::TarXz
        } else {
            ArchiveKind::Zip
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::TarXz => "tar.xz",
        }
    }
}

/// Unpacks every entry of `archive_path` into `extract_dir`, returning the
/// number of files written.
pub fn extract_archive(archive_path: &Path, extract_dir: &Path, kind: ArchiveKind) -> Result<usize> {
    tracing::info!(
        "Unpacking {} into {}",
        archive_path.display(),
        extract_dir.display()
    );

    fs::create_dir_all(extract_dir).map_err(|e| InstallError::extraction(archive_path, e))?;

    let count = match kind {
        ArchiveKind::Zip => extract_zip(archive_path, extract_dir),
        ArchiveKind::TarGz => fs::File::open(archive_path)
            .and_then(|file| extract_tar(Archive::new(GzDecoder::new(file)), extract_dir)),
        ArchiveKind::TarXz => fs::File::open(archive_path).and_then(|file| {
            extract_tar(Archive::new(xz2::read::XzDecoder::new(file)), extract_dir)
        }),
    }
    .map_err(|e| InstallError::extraction(archive_path, e))?;

    tracing::debug!("Extracted {} file(s)", count);
    Ok(count)
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> io::Result<usize> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let Some(relative) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("Skipping malicious path in zip: {}", file.name());
            continue;
        };
        let outpath = extract_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile)?;
        count += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(count)
}

fn extract_tar<R: io::Read>(mut archive: Archive<R>, extract_dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        // unpack_in refuses entries that escape extract_dir
        if entry.unpack_in(extract_dir)? && entry.header().entry_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}
