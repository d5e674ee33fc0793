//! On-disk build caches.
//!
//! A cache entry is a directory that is only trusted once it carries a
//! completion marker recording the hash of its contents. Anything without a
//! valid marker is a leftover from an interrupted build and is discarded
//! before rebuilding. Nothing is ever invalidated automatically beyond that:
//! deleting the directory is the way to force a fresh entry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::CACHE_COMPLETE_MARKER;
use crate::error::BuildError;
use crate::util::fs::{copy_dir, remove_path};
use crate::util::hash::hash_directory;

const MARKER_VERSION: u32 = 1;

/// Excluded when copying an entry out: the marker belongs to the cache.
const HASH_EXCLUSIONS: &[&str] = &[CACHE_COMPLETE_MARKER];

/// Contents of `.kompo-complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMarker {
  pub version: u32,
  pub status: String,
  /// SHA-256 of the entry contents, marker excluded.
  pub output_hash: String,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
  path: PathBuf,
  /// Names left out of the content hash, the marker always among them.
  unhashed: Vec<&'static str>,
}

impl CacheEntry {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      unhashed: HASH_EXCLUSIONS.to_vec(),
    }
  }

  /// Leave directories or files with these names out of the content hash.
  pub fn skip_hashing(mut self, names: &[&'static str]) -> Self {
    self.unhashed.extend_from_slice(names);
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn marker_path(&self) -> PathBuf {
    self.path.join(CACHE_COMPLETE_MARKER)
  }

  /// `None` when the marker is absent.
  pub fn read_marker(&self) -> Result<Option<CacheMarker>, BuildError> {
    let marker_path = self.marker_path();
    if !marker_path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(&marker_path)?;
    Ok(Some(serde_json::from_str(&content)?))
  }

  /// Whether the entry has a readable marker whose hash matches the contents.
  pub fn is_complete(&self) -> bool {
    let marker = match self.read_marker() {
      Ok(Some(marker)) => marker,
      Ok(None) => return false,
      Err(e) => {
        warn!(path = ?self.path, error = %e, "unreadable cache marker, will rebuild");
        return false;
      }
    };

    match hash_directory(&self.path, &self.unhashed) {
      Ok(current) if current.0 == marker.output_hash => true,
      Ok(current) => {
        warn!(
          path = ?self.path,
          expected = %marker.output_hash,
          actual = %current,
          "cache entry corrupted, will rebuild"
        );
        false
      }
      Err(e) => {
        warn!(path = ?self.path, error = %e, "failed to hash cache entry, will rebuild");
        false
      }
    }
  }

  /// Hash the entry and write its marker.
  pub fn mark_complete(&self) -> Result<CacheMarker, BuildError> {
    let output_hash = hash_directory(&self.path, &self.unhashed)?;
    let marker = CacheMarker {
      version: MARKER_VERSION,
      status: "complete".to_string(),
      output_hash: output_hash.0,
    };
    let content = serde_json::to_string(&marker)?;
    std::fs::write(self.marker_path(), format!("{}\n", content))?;
    debug!(path = ?self.path, hash = %marker.output_hash, "cache entry complete");
    Ok(marker)
  }

  /// Remove the entry unless it is complete. Returns whether it was removed.
  pub fn discard_if_incomplete(&self) -> Result<bool, BuildError> {
    if !self.path.exists() || self.is_complete() {
      return Ok(false);
    }
    debug!(path = ?self.path, "discarding incomplete cache entry");
    remove_path(&self.path)?;
    Ok(true)
  }

  pub fn discard(&self) -> Result<(), BuildError> {
    remove_path(&self.path)?;
    Ok(())
  }

  /// Copy the entry's contents (marker excluded) into `dest`.
  pub fn restore_into(&self, dest: &Path) -> Result<u64, BuildError> {
    Ok(copy_dir(&self.path, dest, HASH_EXCLUSIONS)?)
  }

  /// Replace the entry with copies of `sources` (each copied under its own
  /// file name) and mark it complete. Missing sources are skipped.
  pub fn store_from(&self, sources: &[PathBuf]) -> Result<CacheMarker, BuildError> {
    remove_path(&self.path)?;
    std::fs::create_dir_all(&self.path)?;
    for source in sources {
      let Some(name) = source.file_name() else {
        continue;
      };
      if !source.is_dir() {
        continue;
      }
      copy_dir(source, &self.path.join(name), &[])?;
    }
    self.mark_complete()
  }
}
