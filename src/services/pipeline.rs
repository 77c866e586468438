use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Url;

use crate::catalog::{Catalog, Game, SOURCE_PORT_ID};
use crate::errors::{FetchError, PipelineError, PipelineResult, Stage};
use crate::models::{
    ArchiveKind, DownloadTask, InstallStage, InstallState, PackageKind, PackageSpec,
};
use crate::platform::PlatformProfile;
use crate::services::extractor::ArchiveExtractor;
use crate::services::fetcher::{cancel_pair, CancelHandle, CancelToken, Fetcher, ProgressSink};
use crate::services::game_launcher::GameLauncher;
use crate::services::permissions::ensure_executable;
use crate::utils::paths::DataLayout;

struct InstallHandle {
    cancel: CancelHandle,
}

type Registry = Arc<Mutex<HashMap<String, InstallHandle>>>;

/// Removes the registry entry for a package when its install finishes,
/// whichever way it finishes.
struct RegistryGuard {
    registry: Registry,
    package_id: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        lock_map(&self.registry).remove(&self.package_id);
    }
}

fn lock_map<K, V>(map: &Arc<Mutex<HashMap<K, V>>>) -> MutexGuard<'_, HashMap<K, V>> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Drives fetch → extract → permissions for one package at a time per
/// package id, and the separate launch flow for installed games. Progress
/// from the fetch stage is forwarded to the caller's sink untouched.
#[derive(Clone)]
pub struct InstallPipeline {
    fetcher: Fetcher,
    extractor: ArchiveExtractor,
    launcher: GameLauncher,
    profile: PlatformProfile,
    catalog: Catalog,
    layout: DataLayout,
    registry: Registry,
    states: Arc<Mutex<HashMap<String, InstallState>>>,
}

impl InstallPipeline {
    pub fn new(catalog: Catalog, profile: PlatformProfile, layout: DataLayout) -> Self {
        let launcher = GameLauncher::new(profile, layout.data_dir());
        Self {
            fetcher: Fetcher::new(),
            extractor: ArchiveExtractor,
            launcher,
            profile,
            catalog,
            layout,
            registry: Arc::new(Mutex::new(HashMap::new())),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetches, extracts and normalizes one package, returning the
    /// directory it was installed into. A second call for the same package
    /// id while one is in flight is rejected; there is no automatic retry
    /// across stages.
    pub async fn install(
        &self,
        package_id: &str,
        progress: Option<ProgressSink>,
    ) -> PipelineResult<PathBuf> {
        let package = self
            .catalog
            .get(package_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPackage(package_id.to_string()))?;
        let url = package
            .url_for(self.profile.platform)
            .ok_or_else(|| PipelineError::UnsupportedPlatform {
                package: package.id.clone(),
                platform: self.profile.platform,
            })?;
        let url = Url::parse(url)
            .map_err(|_| PipelineError::stage(Stage::Fetch, FetchError::InvalidUrl(url.to_string())))?;

        let (cancel_handle, cancel_token) = cancel_pair();
        let _guard = self.begin_install(package_id, InstallHandle {
            cancel: cancel_handle,
        })?;

        let result = self.run_install(&package, url, progress, cancel_token).await;
        match &result {
            Ok(path) => {
                self.set_state(package_id, InstallStage::Ready, Some(path.display().to_string()));
                tracing::info!("{} installed to {}", package_id, path.display());
            }
            Err(err) => {
                self.set_state(package_id, InstallStage::Failed, Some(err.to_string()));
                tracing::error!("install failed for {}: {}", package_id, err);
            }
        }
        result
    }

    async fn run_install(
        &self,
        package: &PackageSpec,
        url: Url,
        progress: Option<ProgressSink>,
        cancel: CancelToken,
    ) -> PipelineResult<PathBuf> {
        self.set_state(&package.id, InstallStage::Fetching, None);
        let task = DownloadTask::new(url, self.layout.scratch_dir());
        let archive_path = self
            .fetcher
            .fetch(task, progress, cancel)
            .await
            .map_err(|err| PipelineError::stage(Stage::Fetch, err))?;

        self.set_state(&package.id, InstallStage::Extracting, None);
        let dest_dir = package.target_directory(self.layout.data_dir());
        match package.archive_kind {
            ArchiveKind::Zip => self
                .extractor
                .extract(&archive_path, &dest_dir)
                .await
                .map_err(|err| PipelineError::stage(Stage::Extract, err))?,
        }
        // The archive has served its purpose; keep scratch clean.
        let _ = tokio::fs::remove_file(&archive_path).await;

        if package.kind == PackageKind::SourcePort {
            let executable = self
                .launcher
                .resolve_executable()
                .map_err(|err| PipelineError::stage(Stage::Launch, err))?;
            ensure_executable(&executable, &self.profile)
                .map_err(|err| PipelineError::stage(Stage::Permissions, err))?;
        }

        Ok(dest_dir)
    }

    /// Starts an installed game as a detached process. Permissions are
    /// re-normalized first so a freshly copied data directory still works.
    pub fn launch(&self, game: Game) -> PipelineResult<()> {
        self.set_state(SOURCE_PORT_ID, InstallStage::Launching, Some(game.id().to_string()));
        let result = self.run_launch(game);
        match &result {
            Ok(()) => {
                self.set_state(SOURCE_PORT_ID, InstallStage::Launched, Some(game.id().to_string()));
            }
            Err(err) => {
                self.set_state(SOURCE_PORT_ID, InstallStage::Failed, Some(err.to_string()));
                tracing::error!("launch failed for {}: {}", game, err);
            }
        }
        result
    }

    fn run_launch(&self, game: Game) -> PipelineResult<()> {
        let spec = self
            .launcher
            .launch_spec(game)
            .map_err(|err| PipelineError::stage(Stage::Launch, err))?;
        ensure_executable(&spec.executable, &self.profile)
            .map_err(|err| PipelineError::stage(Stage::Permissions, err))?;
        self.launcher
            .launch(&spec)
            .map_err(|err| PipelineError::stage(Stage::Launch, err))
    }

    /// Signals the in-flight install for `package_id`, if any. The partial
    /// download is removed by the fetcher as part of aborting.
    pub fn cancel_install(&self, package_id: &str) -> bool {
        let map = lock_map(&self.registry);
        match map.get(package_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Last observed state for a package; a package nothing has touched yet
    /// reports `Idle`.
    pub fn state(&self, package_id: &str) -> InstallState {
        lock_map(&self.states)
            .get(package_id)
            .cloned()
            .unwrap_or_else(|| InstallState::new(package_id, InstallStage::Idle, None))
    }

    fn begin_install(
        &self,
        package_id: &str,
        handle: InstallHandle,
    ) -> PipelineResult<RegistryGuard> {
        let mut map = lock_map(&self.registry);
        if map.contains_key(package_id) {
            return Err(PipelineError::InstallInFlight(package_id.to_string()));
        }
        map.insert(package_id.to_string(), handle);
        Ok(RegistryGuard {
            registry: Arc::clone(&self.registry),
            package_id: package_id.to_string(),
        })
    }

    fn set_state(&self, package_id: &str, stage: InstallStage, detail: Option<String>) {
        let state = InstallState::new(package_id, stage, detail);
        lock_map(&self.states).insert(package_id.to_string(), state);
    }
}
