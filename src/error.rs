//! Error taxonomy for the acquisition pipeline.
//!
//! Everything except [`InstallError::UnsupportedPlatform`] and the terminal
//! [`InstallError::AttemptsExhausted`] wrapper is retryable.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("platform {identity} is not supported")]
    UnsupportedPlatform { identity: String },

    #[error("error downloading {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("error unpacking {}: {reason}", .archive.display())]
    Extraction { archive: PathBuf, reason: String },

    #[error("corrupted file {}", .path.display())]
    CorruptedArtifact { path: PathBuf },

    #[error("error storing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("install failed after {attempts} attempt(s): {last}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        last: Box<InstallError>,
    },
}

impl InstallError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            InstallError::UnsupportedPlatform { .. } | InstallError::AttemptsExhausted { .. }
        )
    }

    pub(crate) fn transport(url: &str, reason: impl ToString) -> Self {
        InstallError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn extraction(archive: &std::path::Path, reason: impl ToString) -> Self {
        InstallError::Extraction {
            archive: archive.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        InstallError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = InstallError> = std::result::Result<T, E>;
