use crate::error::{InstallError, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Receives byte counts while an archive streams in.
pub trait ProgressObserver {
    fn on_start(&mut self, _total: Option<u64>) {}
    fn on_progress(&mut self, downloaded: u64, total: Option<u64>);
    fn on_finish(&mut self) {}
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _downloaded: u64, _total: Option<u64>) {}
}

/// Terminal progress bar on stderr.
pub struct BarProgress {
    pb: ProgressBar,
    label: String,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        Self {
            pb: ProgressBar::new(0),
            label: label.to_string(),
        }
    }
}

impl ProgressObserver for BarProgress {
    fn on_start(&mut self, total: Option<u64>) {
        match total {
            Some(total) => {
                self.pb.set_length(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                {
                    self.pb.set_style(style.progress_chars("#>-"));
                }
            }
            None => {
                if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner:.green} {bytes}") {
                    self.pb.set_style(style);
                }
            }
        }
        self.pb.set_message(format!("Downloading {}", self.label));
    }

    fn on_progress(&mut self, downloaded: u64, _total: Option<u64>) {
        self.pb.set_position(downloaded);
    }

    fn on_finish(&mut self) {
        self.pb.finish_with_message("Download complete");
    }
}

/// Transport seam between the retry loop and the network.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Streams `url` into `destination` and returns the byte count once the
    /// file is durably written.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wkinstall/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InstallError::transport("<client>", e))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        download_file(&self.client, url, destination, progress).await
    }
}

/// Downloads into a temporary sibling of `local_path` and renames it into
/// place after `sync_all`, so `local_path` never holds a partial archive.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    local_path: &Path,
    progress: &mut dyn ProgressObserver,
) -> Result<u64> {
    tracing::info!("Downloading binary {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::transport(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(InstallError::transport(
            url,
            format!("wrong status code: {}", status.as_u16()),
        ));
    }

    let total_size = response.content_length();
    let parent = local_path.parent().ok_or_else(|| {
        InstallError::io(
            local_path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "destination has no parent directory",
            ),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;

    let mut file = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(parent)
        .map_err(|e| InstallError::io(local_path, e))?;

    progress.on_start(total_size);
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| InstallError::transport(url, e))?;
        file.write_all(&chunk)
            .map_err(|e| InstallError::io(local_path, e))?;
        downloaded += chunk.len() as u64;
        progress.on_progress(downloaded, total_size);
    }

    if let Some(total) = total_size {
        if downloaded != total {
            return Err(InstallError::transport(
                url,
                format!("stream ended after {} of {} bytes", downloaded, total),
            ));
        }
    }

    file.as_file_mut()
        .sync_all()
        .map_err(|e| InstallError::io(local_path, e))?;
    file.persist(local_path)
        .map_err(|e| InstallError::io(local_path, e.error))?;

    progress.on_finish();
    tracing::info!("Binary downloaded to {} ({} bytes)", local_path.display(), downloaded);
    Ok(downloaded)
}
