//! Evidence image metrics

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Width and height of an evidence image; `0×0` when unreadable
pub fn image_dimensions(path: &Path) -> (u32, u32) {
    match image::image_dimensions(path) {
        Ok(dims) => dims,
        Err(e) => {
            warn!("⚠️ Could not read image size of {}: {}", path.display(), e);
            (0, 0)
        }
    }
}

/// SHA-256 of a file, hex encoded
pub fn file_digest(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}

/// Per-file evidence metadata for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub sha256: Option<String>,
}

impl EvidenceInfo {
    pub fn probe(path: &Path) -> Self {
        let (width, height) = image_dimensions(path);
        Self {
            path: path.to_path_buf(),
            width,
            height,
            sha256: file_digest(path),
        }
    }
}
