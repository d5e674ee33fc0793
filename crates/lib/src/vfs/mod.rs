//! The embedded filesystem.
//!
//! Every runtime-reachable file is serialized into three flat tables:
//! - `paths`: absolute paths, each followed by a single zero byte
//! - `contents`: file bytes, back to back
//! - `offsets`: `count + 1` cumulative offsets into `contents`, starting at 0
//!
//! File `i` occupies `contents[offsets[i]..offsets[i + 1]]`. The runtime
//! companion rebuilds a path trie from these tables at startup, so lookup
//! does not depend on table order; the builder keeps the order deterministic
//! anyway so identical inputs give identical executables.

mod source;
mod walk;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::VfsStats;
use crate::error::BuildError;

pub use source::write_fs_source;
pub use walk::{is_pruned_dir, is_skipped_file, scan_roots};

#[derive(Debug, Error)]
pub enum VfsError {
  #[error("failed to read {}: {source}", path.display())]
  Unreadable {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk {}: {source}", root.display())]
  Walk {
    root: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("scan task failed: {0}")]
  Join(String),
}

impl From<VfsError> for BuildError {
  fn from(err: VfsError) -> Self {
    match err {
      VfsError::Unreadable { path, source } => BuildError::UnreadableFile { path, source },
      other => BuildError::Vfs(other),
    }
  }
}

/// One embedded file, as recorded in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsEntry {
  pub path: PathBuf,
  pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsTables {
  paths: Vec<u8>,
  contents: Vec<u8>,
  offsets: Vec<u64>,
  entries: Vec<VfsEntry>,
  seen: HashSet<PathBuf>,
}

impl Default for VfsTables {
  fn default() -> Self {
    Self {
      paths: Vec::new(),
      contents: Vec::new(),
      offsets: vec![0],
      entries: Vec::new(),
      seen: HashSet::new(),
    }
  }
}

impl VfsTables {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append one file. A path already present keeps its first content and
  /// this call returns `false`.
  pub fn push(&mut self, path: &Path, bytes: &[u8]) -> bool {
    if !self.seen.insert(path.to_path_buf()) {
      return false;
    }
    self.paths.extend_from_slice(path.as_os_str().as_encoded_bytes());
    self.paths.push(0);
    self.contents.extend_from_slice(bytes);
    self.offsets.push(self.contents.len() as u64);
    self.entries.push(VfsEntry {
      path: path.to_path_buf(),
      len: bytes.len() as u64,
    });
    true
  }

  pub fn file_count(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn paths(&self) -> &[u8] {
    &self.paths
  }

  pub fn contents(&self) -> &[u8] {
    &self.contents
  }

  pub fn offsets(&self) -> &[u64] {
    &self.offsets
  }

  pub fn entries(&self) -> &[VfsEntry] {
    &self.entries
  }

  /// Content of the `index`th file.
  pub fn file(&self, index: usize) -> Option<&[u8]> {
    let start = *self.offsets.get(index)? as usize;
    let end = *self.offsets.get(index + 1)? as usize;
    self.contents.get(start..end)
  }

  pub fn get(&self, path: &Path) -> Option<&[u8]> {
    let index = self.entries.iter().position(|e| e.path == path)?;
    self.file(index)
  }

  pub fn stats(&self) -> VfsStats {
    VfsStats {
      file_count: self.file_count(),
      content_bytes: self.contents.len() as u64,
    }
  }
}
