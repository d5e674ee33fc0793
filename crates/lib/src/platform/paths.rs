use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "KOMPO_CACHE_DIR";

/// The user's home directory, if `HOME` is set.
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Root of all build caches.
///
/// `KOMPO_CACHE_DIR` wins; otherwise `$XDG_CACHE_HOME/kompo`, falling back to
/// `~/.cache/kompo`.
pub fn cache_dir() -> Option<PathBuf> {
  if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|d| !d.is_empty()) {
    return Some(PathBuf::from(dir));
  }
  let cache_home = std::env::var_os("XDG_CACHE_HOME")
    .filter(|d| !d.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|h| h.join(".cache")))?;
  Some(cache_home.join(APP_NAME))
}

/// Where cargo installs binaries when it is not on `PATH`.
pub fn cargo_home_bin() -> Option<PathBuf> {
  std::env::var_os("CARGO_HOME")
    .filter(|d| !d.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|h| h.join(".cargo")))
    .map(|d| d.join("bin"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn explicit_cache_dir_wins() {
    temp_env::with_vars(
      [
        (CACHE_DIR_ENV, Some("/custom/cache")),
        ("XDG_CACHE_HOME", Some("/xdg")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/custom/cache")));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_then_home_fallback() {
    temp_env::with_vars(
      [
        (CACHE_DIR_ENV, None::<&str>),
        ("XDG_CACHE_HOME", Some("/xdg")),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/xdg").join(APP_NAME)));
      },
    );
    temp_env::with_vars(
      [
        (CACHE_DIR_ENV, None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/home/user/.cache").join(APP_NAME)));
      },
    );
  }

  #[test]
  #[serial]
  fn no_home_means_no_cache_dir() {
    temp_env::with_vars(
      [
        (CACHE_DIR_ENV, None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", None::<&str>),
      ],
      || {
        assert_eq!(cache_dir(), None);
      },
    );
  }

  #[test]
  #[serial]
  fn cargo_bin_prefers_cargo_home() {
    temp_env::with_vars([("CARGO_HOME", Some("/opt/cargo")), ("HOME", Some("/home/u"))], || {
      assert_eq!(cargo_home_bin(), Some(PathBuf::from("/opt/cargo/bin")));
    });
    temp_env::with_vars([("CARGO_HOME", None::<&str>), ("HOME", Some("/home/u"))], || {
      assert_eq!(cargo_home_bin(), Some(PathBuf::from("/home/u/.cargo/bin")));
    });
  }
}
