use flate2::read::GzDecoder;
use log::info;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;

use super::DocumentError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Sources of one upload on disk.
///
/// A `.tar.gz` upload is unpacked into a temporary directory that lives as
/// long as this value.
pub struct UploadSources {
    root: PathBuf,
    unpacked: Option<TempDir>,
}

impl UploadSources {
    /// Directory or `.tex` file to look for the main document in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_unpacked(&self) -> bool {
        self.unpacked.is_some()
    }
}

/// Opens an upload: gzip archives are unpacked, anything else is used as is.
pub fn open_upload(path: &Path) -> Result<UploadSources, DocumentError> {
    if !is_gzip(path)? {
        return Ok(UploadSources {
            root: path.to_path_buf(),
            unpacked: None,
        });
    }

    let dir = tempfile::Builder::new()
        .prefix("paper-upload-")
        .tempdir()
        .map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    extract_tar_gz(path, dir.path())?;
    info!("Unpacked {} into {}", path.display(), dir.path().display());

    Ok(UploadSources {
        root: dir.path().to_path_buf(),
        unpacked: Some(dir),
    })
}

fn is_gzip(path: &Path) -> Result<bool, DocumentError> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut magic = [0u8; 2];
    let read = File::open(path)
        .and_then(|mut file| file.read(&mut magic))
        .map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(read == magic.len() && magic == GZIP_MAGIC)
}

/// Relative path of an archive member, or `None` if it would escape the
/// destination.
fn normalize_member_path(raw: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}

/// Unpacks a `.tar.gz` into `destination`. Links and members outside the
/// destination are rejected.
pub fn extract_tar_gz(archive_path: &Path, destination: &Path) -> Result<(), DocumentError> {
    let archive_error = |source: std::io::Error| DocumentError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(archive_error)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    for item in archive.entries().map_err(archive_error)? {
        let mut entry = item.map_err(archive_error)?;
        let raw_path = entry.path().map_err(archive_error)?.into_owned();
        let relative = normalize_member_path(&raw_path)
            .ok_or_else(|| DocumentError::UnsafeArchiveEntry(raw_path.clone()))?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(DocumentError::UnsafeArchiveEntry(raw_path));
        }

        let target = destination.join(&relative);
        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(archive_error)?;
            continue;
        }
        if relative.as_os_str().is_empty() {
            return Err(DocumentError::UnsafeArchiveEntry(raw_path));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(archive_error)?;
        }
        entry.unpack(&target).map_err(archive_error)?;
    }
    Ok(())
}
