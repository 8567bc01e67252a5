use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;
use zip::write::FileOptions;

#[allow(dead_code)]
pub const ARTIFACT_PATH: &str = "/bin/wkhtmltopdf/wkhtmltopdf-linux-amd64.zip";

// Not every test binary uses every helper.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub install_dir: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config").join("config.json");
        let cache_dir = temp_dir.path().join("cache");
        let install_dir = temp_dir.path().join("install");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_wkinstall"));

        Self {
            _temp_dir: temp_dir,
            config_path,
            cache_dir,
            install_dir,
            bin_path,
        }
    }

    /// A command isolated from the developer's home, pinned to the
    /// linux-amd64 artifact so results do not depend on the host.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        for var in [
            "WKHTMLTOPDF_CDN_URL",
            "WKHTMLTOPDF_CDN_PATH",
            "WKHTMLTOPDF_IGNORE_CACHE",
            "WKHTMLTOPDF_MAX_ATTEMPTS",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("WKINSTALL_CONFIG", &self.config_path);
        cmd.env("WKHTMLTOPDF_CACHE_DIR", &self.cache_dir);
        cmd.env("WKHTMLTOPDF_INSTALL_DIR", &self.install_dir);
        cmd.env("WKHTMLTOPDF_ARCH", "linuxx64");
        cmd.env("WKHTMLTOPDF_RETRY_DELAY_MS", "0");
        cmd.env("HOME", self._temp_dir.path());
        cmd
    }

    /// Command pointed at a mock CDN.
    pub fn cmd_with_cdn(&self, cdn_url: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.env("WKHTMLTOPDF_CDN_URL", cdn_url);
        cmd
    }

    pub fn cache_file_for(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.zip", URL_SAFE_NO_PAD.encode(url.as_bytes())))
    }

    pub fn binary_path(&self) -> PathBuf {
        self.install_dir.join("wkhtmltopdf")
    }
}

#[allow(dead_code)]
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default())
            .expect("Failed to start zip entry");
        zip.write_all(data.as_bytes())
            .expect("Failed to write zip entry");
    }
    zip.finish().expect("Failed to finish zip").into_inner()
}

/// An archive whose binary copies its input file to its output path.
#[allow(dead_code)]
pub fn fake_wkhtmltopdf_archive() -> Vec<u8> {
    zip_archive(&[(
        "wkhtmltopdf",
        "#!/bin/sh\neval \"src=\\${$(($# - 1))}\"\neval \"dst=\\${$#}\"\ncp \"$src\" \"$dst\"\n",
    )])
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        if self.status.success() {
            panic!(
                "Command unexpectedly succeeded\nstdout: {}\nstderr: {}",
                self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
