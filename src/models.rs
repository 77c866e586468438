use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Serialize;

use crate::platform::Platform;

/// An installable unit: the source port binary or a game-data archive.
/// Built once by the catalog and never mutated.
#[derive(Clone, Debug)]
pub struct PackageSpec {
    pub id: String,
    pub platform_urls: HashMap<Platform, String>,
    /// Subdirectory of the data directory the archive extracts into;
    /// `None` extracts at the data-directory root.
    pub target_subdir: Option<String>,
    pub archive_kind: ArchiveKind,
    pub kind: PackageKind,
}

impl PackageSpec {
    pub fn url_for(&self, platform: Platform) -> Option<&str> {
        self.platform_urls.get(&platform).map(String::as_str)
    }

    pub fn target_directory(&self, data_dir: &Path) -> PathBuf {
        match &self.target_subdir {
            Some(subdir) => data_dir.join(subdir),
            None => data_dir.to_path_buf(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageKind {
    SourcePort,
    GameData,
}

/// One fetch attempt. A redirect produces a new task with the same filename
/// and directory and only the URL replaced.
#[derive(Clone, Debug)]
pub struct DownloadTask {
    pub url: Url,
    pub target_filename: String,
    pub target_directory: PathBuf,
}

impl DownloadTask {
    /// The filename defaults to the basename of the URL path.
    pub fn new(url: Url, target_directory: impl Into<PathBuf>) -> Self {
        let target_filename = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("download.bin")
            .to_string();
        Self {
            url,
            target_filename,
            target_directory: target_directory.into(),
        }
    }

    pub fn target_path(&self) -> PathBuf {
        self.target_directory.join(&self.target_filename)
    }

    pub fn redirected(&self, url: Url) -> Self {
        Self {
            url,
            target_filename: self.target_filename.clone(),
            target_directory: self.target_directory.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Downloading,
    Finished,
}

/// Emitted repeatedly while a download streams, then exactly once with
/// `Finished` after the file is flushed and closed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub filename: String,
    pub phase: ProgressPhase,
    /// 0 when the server sent no content-length.
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub percentage: f64,
}

impl ProgressEvent {
    pub(crate) fn downloading(filename: &str, total_bytes: u64, downloaded_bytes: u64) -> Self {
        let percentage = if total_bytes > 0 {
            downloaded_bytes as f64 / total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            filename: filename.to_string(),
            phase: ProgressPhase::Downloading,
            total_bytes,
            downloaded_bytes,
            percentage,
        }
    }

    pub(crate) fn finished(filename: &str, total_bytes: u64, downloaded_bytes: u64) -> Self {
        Self {
            filename: filename.to_string(),
            phase: ProgressPhase::Finished,
            total_bytes,
            downloaded_bytes,
            percentage: 100.0,
        }
    }
}

/// What to run and how, derived from the platform profile at launch time.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStage {
    Idle,
    Fetching,
    Extracting,
    Ready,
    Launching,
    Launched,
    Failed,
}

/// Last observed stage for one package id. `Failed` never turns into
/// `Ready` implicitly; a fresh install has to succeed first.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallState {
    pub package_id: String,
    pub stage: InstallStage,
    pub detail: Option<String>,
    pub updated_at: i64,
}

impl InstallState {
    pub(crate) fn new(package_id: &str, stage: InstallStage, detail: Option<String>) -> Self {
        Self {
            package_id: package_id.to_string(),
            stage,
            detail,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}
