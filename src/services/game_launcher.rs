use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::catalog::{Game, FREEDOOM_DATA_DIR, SOURCE_PORT_ID};
use crate::errors::LaunchError;
use crate::models::LaunchSpec;
use crate::platform::{BundleLayout, PlatformProfile};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;
#[cfg(target_os = "windows")]
const DETACHED_PROCESS: u32 = 0x00000008;

/// Resolves the installed source port under the platform's bundle layout
/// and starts games as detached processes whose lifetime is independent of
/// this one.
#[derive(Clone, Debug)]
pub struct GameLauncher {
    profile: PlatformProfile,
    data_dir: PathBuf,
}

impl GameLauncher {
    pub fn new(profile: PlatformProfile, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            data_dir: data_dir.into(),
        }
    }

    /// Path of the source port binary. Fails before anything is spawned
    /// when the platform has no supported layout.
    pub fn resolve_executable(&self) -> Result<PathBuf, LaunchError> {
        match self.profile.bundle_layout {
            Some(BundleLayout::AppBundle) => Ok(self
                .data_dir
                .join(format!("{SOURCE_PORT_ID}.app"))
                .join("Contents")
                .join("MacOS")
                .join(SOURCE_PORT_ID)),
            Some(BundleLayout::FlatExe) => Ok(self.data_dir.join(format!("{SOURCE_PORT_ID}.exe"))),
            None => Err(LaunchError::UnsupportedPlatform(self.profile.platform)),
        }
    }

    pub fn launch_spec(&self, game: Game) -> Result<LaunchSpec, LaunchError> {
        let executable = self.resolve_executable()?;
        let wad_path = self.data_dir.join(FREEDOOM_DATA_DIR).join(game.wad_file());
        Ok(LaunchSpec {
            executable,
            args: vec!["-iwad".to_string(), wad_path.to_string_lossy().into_owned()],
            working_directory: Some(self.data_dir.clone()),
        })
    }

    /// Returns as soon as process creation succeeds; nobody waits on the
    /// child and it outlives this process.
    pub fn launch(&self, spec: &LaunchSpec) -> Result<(), LaunchError> {
        let mut command = Command::new(&spec.executable);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &spec.working_directory {
            command.current_dir(dir);
        }
        detach(&mut command);

        let child = command
            .spawn()
            .map_err(|err| LaunchError::SpawnFailed(err.to_string()))?;
        tracing::info!("started {} (pid {})", spec.executable.display(), child.id());
        drop(child);
        Ok(())
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(target_os = "windows")]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    command.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
}

#[cfg(not(any(unix, target_os = "windows")))]
fn detach(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("doomdash-launch-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp directory");
        dir
    }

    #[test]
    fn resolves_the_flat_exe_layout() {
        let launcher = GameLauncher::new(PlatformProfile::windows(), "/data/doomdash-data");
        let exe = launcher.resolve_executable().expect("resolve");
        assert_eq!(exe, Path::new("/data/doomdash-data/uzdoom.exe"));
    }

    #[test]
    fn resolves_the_app_bundle_layout() {
        let launcher = GameLauncher::new(PlatformProfile::macos(), "/data/doomdash-data");
        let exe = launcher.resolve_executable().expect("resolve");
        assert_eq!(
            exe,
            Path::new("/data/doomdash-data/uzdoom.app/Contents/MacOS/uzdoom")
        );
    }

    #[test]
    fn fails_fast_without_a_supported_layout() {
        let launcher = GameLauncher::new(PlatformProfile::linux(), "/data/doomdash-data");
        let err = launcher.resolve_executable().expect_err("must fail");
        assert!(matches!(err, LaunchError::UnsupportedPlatform(_)));
    }

    #[test]
    fn launch_specs_point_the_port_at_the_wad() {
        let launcher = GameLauncher::new(PlatformProfile::windows(), "/data/doomdash-data");
        let spec = launcher.launch_spec(Game::Freedoom2).expect("spec");
        assert_eq!(spec.args[0], "-iwad");
        assert!(spec.args[1].ends_with("freedoom2.wad"));
        assert_eq!(
            spec.working_directory.as_deref(),
            Some(Path::new("/data/doomdash-data"))
        );
    }

    #[test]
    fn spawn_failures_are_reported() {
        let dir = temp_dir();
        let launcher = GameLauncher::new(PlatformProfile::windows(), &dir);
        let spec = LaunchSpec {
            executable: dir.join("not-a-binary"),
            args: Vec::new(),
            working_directory: None,
        };
        let err = launcher.launch(&spec).expect_err("spawn must fail");
        assert!(matches!(err, LaunchError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn launch_returns_without_waiting_for_the_child() {
        let dir = temp_dir();
        let launcher = GameLauncher::new(PlatformProfile::macos(), &dir);
        let spec = LaunchSpec {
            executable: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "sleep 0".to_string()],
            working_directory: Some(dir.clone()),
        };
        launcher.launch(&spec).expect("spawn succeeds");
    }
}
