use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        };
        f.write_str(name)
    }
}

/// On-disk shape of the installed source port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleLayout {
    /// `uzdoom.app/Contents/MacOS/uzdoom`
    AppBundle,
    /// `uzdoom.exe` at the data-directory root
    FlatExe,
}

/// Capability flags for the running platform. Components take this as a
/// value instead of branching on the OS themselves; `bundle_layout == None`
/// means the platform has no supported launch layout.
#[derive(Clone, Copy, Debug)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub has_execute_bit: bool,
    pub bundle_layout: Option<BundleLayout>,
}

impl PlatformProfile {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::windows()
        } else if cfg!(target_os = "macos") {
            Self::macos()
        } else {
            Self::linux()
        }
    }

    pub fn windows() -> Self {
        Self {
            platform: Platform::Windows,
            has_execute_bit: false,
            bundle_layout: Some(BundleLayout::FlatExe),
        }
    }

    pub fn macos() -> Self {
        Self {
            platform: Platform::MacOs,
            has_execute_bit: true,
            bundle_layout: Some(BundleLayout::AppBundle),
        }
    }

    pub fn linux() -> Self {
        Self {
            platform: Platform::Linux,
            has_execute_bit: true,
            bundle_layout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_has_no_execute_bit() {
        let profile = PlatformProfile::windows();
        assert!(!profile.has_execute_bit);
        assert_eq!(profile.bundle_layout, Some(BundleLayout::FlatExe));
    }

    #[test]
    fn macos_uses_an_app_bundle() {
        let profile = PlatformProfile::macos();
        assert!(profile.has_execute_bit);
        assert_eq!(profile.bundle_layout, Some(BundleLayout::AppBundle));
    }
}
