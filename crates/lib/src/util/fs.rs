use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Recursively copy `src` into `dest`, creating `dest` if needed.
///
/// Symlinks are recreated rather than followed on unix. Entries whose file
/// name is in `exclude` are skipped along with everything below them.
pub fn copy_dir(src: &Path, dest: &Path, exclude: &[&str]) -> io::Result<u64> {
  fs::create_dir_all(dest)?;
  let mut copied = 0;

  let walker = WalkDir::new(src).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0
      || e
        .file_name()
        .to_str()
        .map(|name| !exclude.contains(&name))
        .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = match entry.path().strip_prefix(src) {
      Ok(rel) if !rel.as_os_str().is_empty() => rel,
      _ => continue,
    };
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      copy_symlink(entry.path(), &target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      copied += fs::copy(entry.path(), &target)?;
    }
  }

  Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
  let link = fs::read_link(src)?;
  if dest.symlink_metadata().is_ok() {
    fs::remove_file(dest)?;
  }
  std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
  fs::copy(src, dest).map(|_| ())
}

/// Copy one file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::copy(src, dest)
}

/// Remove a file or directory tree; a missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
  match path.symlink_metadata() {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}
