//! Shot archive: where processed shot images end up on disk.
//!
//! Layout:
//! ```text
//! {captures_dir}/
//! ├── burst_1/
//! │   ├── shot_1-0.jpg
//! │   └── shot_1-1.jpg
//! └── burst_2/
//!     └── shot_2-0.jpg
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Storage backend for encoded shot images.
///
/// Called from blocking threads, so implementations may do plain file I/O.
pub trait ShotArchive: Send + Sync {
    /// Store one JPEG and return where it went.
    fn store(&self, burst_id: u64, shot_id: &str, jpeg: &[u8]) -> Result<PathBuf, ArchiveError>;
}

/// Filesystem archive, one directory per burst
#[derive(Debug, Clone)]
pub struct FsShotArchive {
    root: PathBuf,
}

impl FsShotArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shot_path(&self, burst_id: u64, shot_id: &str) -> PathBuf {
        self.root
            .join(format!("burst_{}", burst_id))
            .join(format!("shot_{}.jpg", shot_id))
    }
}

impl ShotArchive for FsShotArchive {
    fn store(&self, burst_id: u64, shot_id: &str, jpeg: &[u8]) -> Result<PathBuf, ArchiveError> {
        let path = self.shot_path(burst_id, shot_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ArchiveError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, jpeg).map_err(|source| ArchiveError::Write {
            path: path.clone(),
            source,
        })?;

        debug!("Stored shot {} ({} bytes) at {}", shot_id, jpeg.len(), path.display());
        Ok(path)
    }
}
