use std::path::{Path, PathBuf};

/// Name of the top-level directory everything installs into.
pub const DATA_DIR_NAME: &str = "doomdash-data";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

/// Where installed packages and in-flight downloads live on disk.
#[derive(Clone, Debug)]
pub struct DataLayout {
    data_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl DataLayout {
    /// Data lands in `doomdash-data` on the desktop unless `DOOMDASH_DATA_DIR`
    /// says otherwise; downloads go to the system temp directory unless
    /// `DOOMDASH_SCRATCH_DIR` overrides it.
    pub fn resolve() -> Self {
        Self {
            data_dir: resolve_data_dir(),
            scratch_dir: resolve_scratch_dir(),
        }
    }

    pub fn new(data_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = env_dir("DOOMDASH_DATA_DIR") {
        return dir;
    }

    if let Some(desktop) = dirs::desktop_dir() {
        let candidate = desktop.join(DATA_DIR_NAME);
        if let Some(dir) = ensure_dir(&candidate) {
            return dir;
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(DATA_DIR_NAME);
        if let Some(dir) = ensure_dir(&candidate) {
            return dir;
        }
    }

    PathBuf::from(DATA_DIR_NAME)
}

fn resolve_scratch_dir() -> PathBuf {
    if let Some(dir) = env_dir("DOOMDASH_SCRATCH_DIR") {
        return dir;
    }
    std::env::temp_dir()
}

pub fn resolve_log_dir(data_dir: &Path) -> PathBuf {
    if let Some(dir) = env_dir("DOOMDASH_LOG_DIR") {
        return dir;
    }

    let candidate = data_dir.join("logs");
    if let Some(dir) = ensure_dir(&candidate) {
        return dir;
    }

    PathBuf::from("logs")
}
