use std::collections::HashMap;
use std::fmt;

use crate::models::{ArchiveKind, PackageKind, PackageSpec};
use crate::platform::Platform;

pub const SOURCE_PORT_ID: &str = "uzdoom";
pub const GAME_DATA_ID: &str = "freedoom";
/// Directory the freedoom archive unpacks its wads into.
pub const FREEDOOM_DATA_DIR: &str = "freedoom-0.13.0";

const UZDOOM_WINDOWS_URL: &str =
    "https://github.com/UZDoom/UZDoom/releases/download/4.14.3/Windows-UZDoom-4.14.3.zip";
const UZDOOM_MACOS_URL: &str =
    "https://github.com/UZDoom/UZDoom/releases/download/4.14.3/macOS-UZDoom-4.14.3.zip";
const FREEDOOM_URL: &str =
    "https://github.com/freedoom/freedoom/releases/download/v0.13.0/freedoom-0.13.0.zip";

/// The built-in set of installable packages.
#[derive(Clone, Debug)]
pub struct Catalog {
    packages: Vec<PackageSpec>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let uzdoom = PackageSpec {
            id: SOURCE_PORT_ID.to_string(),
            platform_urls: HashMap::from([
                (Platform::Windows, UZDOOM_WINDOWS_URL.to_string()),
                (Platform::MacOs, UZDOOM_MACOS_URL.to_string()),
            ]),
            target_subdir: None,
            archive_kind: ArchiveKind::Zip,
            kind: PackageKind::SourcePort,
        };
        // Plain data, same archive everywhere.
        let freedoom = PackageSpec {
            id: GAME_DATA_ID.to_string(),
            platform_urls: HashMap::from([
                (Platform::Windows, FREEDOOM_URL.to_string()),
                (Platform::MacOs, FREEDOOM_URL.to_string()),
                (Platform::Linux, FREEDOOM_URL.to_string()),
            ]),
            target_subdir: None,
            archive_kind: ArchiveKind::Zip,
            kind: PackageKind::GameData,
        };
        Self {
            packages: vec![uzdoom, freedoom],
        }
    }

    pub fn with_packages(packages: Vec<PackageSpec>) -> Self {
        Self { packages }
    }

    pub fn get(&self, id: &str) -> Option<&PackageSpec> {
        self.packages.iter().find(|package| package.id == id)
    }
}

/// Playable games shipped inside the freedoom data archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Game {
    Freedoom1,
    Freedoom2,
}

impl Game {
    pub const ALL: [Game; 2] = [Game::Freedoom1, Game::Freedoom2];

    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "freedoom-1" => Some(Game::Freedoom1),
            "freedoom-2" => Some(Game::Freedoom2),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Game::Freedoom1 => "freedoom-1",
            Game::Freedoom2 => "freedoom-2",
        }
    }

    pub fn wad_file(&self) -> &'static str {
        match self {
            Game::Freedoom1 => "freedoom1.wad",
            Game::Freedoom2 => "freedoom2.wad",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
