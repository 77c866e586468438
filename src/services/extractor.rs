use std::fs::File;
use std::io;
use std::path::{Component, Path};

use zip::ZipArchive;

use crate::errors::ExtractError;

/// Unpacks a downloaded zip archive into a destination directory, creating
/// it if needed. Entries that try to escape the destination (absolute paths
/// or `..`) abort the whole extraction.
///
/// Extraction is not transactional: entries written before a failure stay
/// on disk and the caller sees the error.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub async fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
        let archive_path = archive_path.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&archive_path, &dest_dir))
            .await
            .map_err(|err| ExtractError::ExtractionFailed(err.to_string()))?
    }
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(dest_dir)?;

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().replace('\\', "/");
        if name.is_empty() {
            continue;
        }
        let entry_path = Path::new(&name);
        if !is_safe_relative_path(entry_path) {
            return Err(ExtractError::UnsafePath(name));
        }
        let out_path = dest_dir.join(entry_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        io::copy(&mut entry, &mut outfile)?;
    }
    Ok(())
}

fn is_safe_relative_path(path: &Path) -> bool {
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return false,
            _ => {}
        }
    }
    true
}
