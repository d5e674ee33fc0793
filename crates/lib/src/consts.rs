pub const APP_NAME: &str = "kompo";

/// Standard-library extensions compiled statically into the interpreter.
pub const STATIC_EXTENSIONS: &[&str] = &[
  "bigdecimal",
  "cgi/escape",
  "continuation",
  "coverage",
  "date",
  "digest/bubblebabble",
  "digest",
  "digest/md5",
  "digest/rmd160",
  "digest/sha1",
  "digest/sha2",
  "etc",
  "fcntl",
  "fiddle",
  "io/console",
  "io/nonblock",
  "io/wait",
  "json",
  "json/generator",
  "json/parser",
  "nkf",
  "monitor",
  "objspace",
  "openssl",
  "pathname",
  "psych",
  "pty",
  "racc/cparse",
  "rbconfig/sizeof",
  "readline",
  "ripper",
  "socket",
  "stringio",
  "strscan",
  "syslog",
  "zlib",
];

/// Libraries that always stay dynamically linked, in link order.
pub const DYNAMIC_LIBS: &[&str] = &["pthread", "dl", "m", "c"];

/// Runtime companion libraries that mount the embedded filesystem.
pub const RUNTIME_LIBS: &[&str] = &["kompo_fs", "kompo_wrap"];

/// Static interpreter library produced by the interpreter build.
pub const RUBY_STATIC_LIB: &str = "ruby-static";

/// Directory names never descended into while embedding.
pub const PRUNED_DIRS: &[&str] = &[".git", ".github", "ports", "logs", "spec", "docs", "exe"];

/// Directory names pruned only outside a `lib` tree. Below `lib` they are
/// requirable code (`require "test/unit"`).
pub const NON_RUNTIME_DIRS: &[&str] = &["test", "tests", "examples"];

/// File extensions never embedded (linked separately or never loadable).
pub const SKIPPED_EXTENSIONS: &[&str] = &[
  "so", "bundle", "dylib", "a", "c", "h", "o", "java", "jar", "gz", "dat", "sqlite3", "exe", "gem", "out", "png", "jpg",
  "jpeg", "gif", "bmp", "ico", "svg", "webp", "ttf", "data",
];

/// File names never embedded regardless of extension.
pub const SKIPPED_FILE_NAMES: &[&str] = &["selenium-manager"];

/// Marker file written once a cache entry is complete.
pub const CACHE_COMPLETE_MARKER: &str = ".kompo-complete";

pub const RUBY_BUILD_REPO: &str = "https://github.com/rbenv/ruby-build.git";
pub const KOMPO_VFS_REPO: &str = "https://github.com/ahogappa/kompo-vfs.git";
