use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("download timed out")]
    Timeout,
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),
    #[error("download cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("archive entry escapes the destination directory: {0}")]
    UnsafePath(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
}

impl From<io::Error> for ExtractError {
    fn from(err: io::Error) -> Self {
        ExtractError::ExtractionFailed(err.to_string())
    }
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(err: zip::result::ZipError) -> Self {
        ExtractError::ExtractionFailed(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("executable not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to set permissions: {0}")]
    ChmodFailed(String),
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("launching is not supported on {0}")]
    UnsupportedPlatform(Platform),
    #[error("failed to start process: {0}")]
    SpawnFailed(String),
}

/// Pipeline stage a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Extract,
    Permissions,
    Launch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Permissions => "permissions",
            Stage::Launch => "launch",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Permissions(#[from] PermissionError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    #[error("unknown game: {0}")]
    UnknownGame(String),
    #[error("no {package} build is published for {platform}")]
    UnsupportedPlatform { package: String, platform: Platform },
    #[error("an install is already in progress for {0}")]
    InstallInFlight(String),
    #[error("{stage} stage failed: {source}")]
    Stage { stage: Stage, source: StageError },
}

impl PipelineError {
    pub fn stage(stage: Stage, source: impl Into<StageError>) -> Self {
        PipelineError::Stage {
            stage,
            source: source.into(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
