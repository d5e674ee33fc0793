//! Concurrent discovery and reading of embed roots.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{VfsError, VfsTables};
use crate::consts::{NON_RUNTIME_DIRS, PRUNED_DIRS, SKIPPED_EXTENSIONS, SKIPPED_FILE_NAMES};

struct ScannedFile {
  path: PathBuf,
  bytes: Vec<u8>,
}

/// Directories never descended into: VCS metadata, specs, docs, build leftovers.
///
/// Test and example directories are pruned too unless they sit inside a
/// `lib` tree, where they are part of the load path.
pub fn is_pruned_dir(name: &OsStr, in_lib: bool) -> bool {
  name
    .to_str()
    .is_some_and(|n| PRUNED_DIRS.contains(&n) || (!in_lib && NON_RUNTIME_DIRS.contains(&n)))
}

/// Whether `path` lies below a `lib` directory, counting `root` itself.
fn below_lib(root: &Path, path: &Path) -> bool {
  let is_lib = |name: Option<&OsStr>| name.is_some_and(|n| n == "lib");
  if is_lib(root.file_name()) {
    return true;
  }
  path
    .strip_prefix(root)
    .ok()
    .and_then(Path::parent)
    .is_some_and(|parent| parent.components().any(|c| is_lib(Some(c.as_os_str()))))
}

/// Files never embedded: linked separately, or not loadable at runtime.
pub fn is_skipped_file(path: &Path) -> bool {
  let by_name = path
    .file_name()
    .and_then(OsStr::to_str)
    .is_some_and(|n| SKIPPED_FILE_NAMES.contains(&n));
  let by_ext = path
    .extension()
    .and_then(OsStr::to_str)
    .is_some_and(|e| SKIPPED_EXTENSIONS.contains(&e));
  by_name || by_ext
}

/// Scan every root concurrently and build the tables.
///
/// One unit of work runs per root. Results are appended by this single
/// writer in root order once every unit has finished, so the tables do not
/// depend on which scan completes first. The first unreadable file aborts the
/// whole scan; the remaining units are cancelled when the set is dropped.
///
/// Relative roots are resolved against the current directory. A missing root
/// is skipped with a warning. An explicitly listed file is embedded even if
/// its name would be skipped during a directory walk.
pub async fn scan_roots(roots: &[PathBuf]) -> Result<VfsTables, VfsError> {
  let mut join_set = JoinSet::new();

  for (index, root) in roots.iter().enumerate() {
    let root = std::path::absolute(root).map_err(|source| VfsError::Unreadable {
      path: root.clone(),
      source,
    })?;
    join_set.spawn(async move { (index, scan_root(root).await) });
  }

  let mut per_root: Vec<Option<Vec<ScannedFile>>> = (0..roots.len()).map(|_| None).collect();
  while let Some(joined) = join_set.join_next().await {
    let (index, scanned) = joined.map_err(|e| VfsError::Join(e.to_string()))?;
    per_root[index] = Some(scanned?);
  }

  let mut tables = VfsTables::new();
  for files in per_root.into_iter().flatten() {
    for file in files {
      if !tables.push(&file.path, &file.bytes) {
        debug!(path = ?file.path, "already embedded");
      }
    }
  }
  Ok(tables)
}

async fn scan_root(root: PathBuf) -> Result<Vec<ScannedFile>, VfsError> {
  let meta = match tokio::fs::metadata(&root).await {
    Ok(meta) => meta,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      warn!(root = ?root, "embed root does not exist, skipping");
      return Ok(Vec::new());
    }
    Err(source) => return Err(VfsError::Unreadable { path: root, source }),
  };

  let paths = if meta.is_dir() {
    let dir = root.clone();
    tokio::task::spawn_blocking(move || discover(&dir))
      .await
      .map_err(|e| VfsError::Join(e.to_string()))??
  } else {
    vec![root]
  };

  let mut files = Vec::with_capacity(paths.len());
  for path in paths {
    let bytes = tokio::fs::read(&path)
      .await
      .map_err(|source| VfsError::Unreadable {
        path: path.clone(),
        source,
      })?;
    files.push(ScannedFile { path, bytes });
  }
  Ok(files)
}

/// Surviving files below `dir`, in file-name order.
fn discover(dir: &Path) -> Result<Vec<PathBuf>, VfsError> {
  let walker = WalkDir::new(dir)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| {
      e.depth() == 0 || !(e.file_type().is_dir() && is_pruned_dir(e.file_name(), below_lib(dir, e.path())))
    });

  let mut paths = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|source| VfsError::Walk {
      root: dir.to_path_buf(),
      source,
    })?;
    let path = entry.path();
    let file_type = entry.file_type();

    // Symlinks count when they resolve to a regular file.
    let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
    if !is_file || is_skipped_file(path) {
      continue;
    }
    paths.push(path.to_path_buf());
  }
  Ok(paths)
}
