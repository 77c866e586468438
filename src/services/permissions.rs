use std::path::Path;

use crate::errors::PermissionError;
use crate::platform::PlatformProfile;

/// Makes the launch target executable (rwxr-xr-x) on platforms that track
/// an execute bit. Platforms that launch by file extension get a no-op
/// success without touching the filesystem.
pub fn ensure_executable(path: &Path, profile: &PlatformProfile) -> Result<(), PermissionError> {
    if !profile.has_execute_bit {
        return Ok(());
    }
    if !path.is_file() {
        return Err(PermissionError::NotFound(path.to_path_buf()));
    }
    set_execute_mode(path)?;
    tracing::debug!("execute permission set on {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn set_execute_mode(path: &Path) -> Result<(), PermissionError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|err| PermissionError::ChmodFailed(err.to_string()))
}

#[cfg(not(unix))]
fn set_execute_mode(_path: &Path) -> Result<(), PermissionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_file(contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("doomdash-perm-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp directory");
        let path = dir.join("target-bin");
        std::fs::write(&path, contents).expect("write file");
        path
    }

    #[test]
    fn no_op_on_platforms_without_an_execute_bit() {
        let profile = PlatformProfile::windows();
        ensure_executable(Path::new("/definitely/not/here.exe"), &profile)
            .expect("no-op always succeeds");
    }

    #[test]
    fn a_missing_target_is_reported() {
        let profile = PlatformProfile::linux();
        let err = ensure_executable(Path::new("/definitely/not/here"), &profile)
            .expect_err("missing file must fail");
        assert!(matches!(err, PermissionError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn sets_read_and_execute_for_everyone() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_file(b"#!/bin/sh\n");
        let profile = PlatformProfile::linux();
        ensure_executable(&path, &profile).expect("chmod succeeds");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
