//! The build context threaded through every task.
//!
//! Each field is owned by exactly one task, which defines it; every later
//! task only reads it through [`require`]. Reading a field whose owner has
//! not run yet is a [`BuildError::MissingField`], never a silent `None`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::BuildError;
use crate::task::TaskId;

/// Whether cached interpreter and dependency builds may be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  /// Reuse complete cache entries.
  #[default]
  Repack,
  /// Always invoke the external tools and refresh the cache.
  Rebuild,
}

/// Parameters parsed by the command-line layer.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  /// Project root; the current directory when unset.
  pub project_dir: Option<PathBuf>,
  /// Entry script; `<project>/main.rb` when unset.
  pub entrypoint: Option<PathBuf>,
  /// Extra files and directories, relative to the project root.
  pub files: Vec<PathBuf>,
  /// Where the executable is written; the project root when unset.
  pub dest_dir: Option<PathBuf>,
  /// Dependency group passed to the standalone install.
  pub use_group: Option<String>,
  /// Force Gemfile use on or off; auto-detected when unset.
  pub gemfile: Option<bool>,
  /// Reuse an existing standalone install directory.
  pub bundle_cache: Option<PathBuf>,
  /// Interpreter version override, e.g. `3.4.1`.
  pub ruby_version: Option<String>,
  pub mode: BuildMode,
  /// Local checkout of the runtime companion library.
  pub local_runtime_dir: Option<PathBuf>,
  /// Leave the work directory in place on teardown.
  pub keep_work_dir: bool,
}

/// A compiled native extension that must be registered at interpreter start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeExt {
  /// Feature path the interpreter requires, e.g. `json/ext/parser.so`.
  pub feature: String,
  /// C initializer symbol, e.g. `Init_parser`.
  pub init_fn: String,
}

/// Counters reported by the embedding step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VfsStats {
  pub file_count: usize,
  pub content_bytes: u64,
}

#[derive(Debug, Default)]
pub struct BuildContext {
  pub options: BuildOptions,
  resolved: Vec<TaskId>,

  // make-work-dir
  pub project_dir: Option<PathBuf>,
  pub project_name: Option<String>,
  pub work_dir: Option<PathBuf>,
  pub dest_dir: Option<PathBuf>,
  pub cache_root: Option<PathBuf>,

  // check-ruby-version
  pub ruby_version: Option<String>,

  // install-ruby-build
  pub ruby_build: Option<PathBuf>,

  // install-cargo (absent cargo is only fatal when a task needs it)
  pub cargo: Option<PathBuf>,

  // copy-gemfile
  pub use_gemfile: Option<bool>,

  // copy-project-files
  pub entrypoint: Option<PathBuf>,
  pub work_dir_entrypoint: Option<PathBuf>,
  pub work_dir_files: Option<Vec<PathBuf>>,

  // install-ruby
  pub ruby_cache: Option<PathBuf>,
  pub ruby_bin: Option<PathBuf>,
  pub bundler_bin: Option<PathBuf>,
  pub ruby_lib_dir: Option<PathBuf>,
  pub ruby_pc: Option<PathBuf>,
  pub ruby_build_path: Option<PathBuf>,
  pub ruby_abi_version: Option<String>,
  pub interpreter_cached: Option<bool>,

  // check-stdlibs
  pub std_load_path: Option<Vec<PathBuf>>,

  // bundle-install
  pub use_group: Option<String>,
  pub bundle_cache: Option<PathBuf>,
  pub bundle_setup: Option<PathBuf>,
  pub bundle_ruby_dir: Option<PathBuf>,
  pub bundle_cached: Option<bool>,

  // build-native-gems
  pub exts_dir: Option<PathBuf>,
  pub native_exts: Option<Vec<NativeExt>>,
  pub ext_metadata: Option<Vec<PathBuf>>,

  // require-bundler-setup
  pub gem_load_path: Option<Vec<PathBuf>>,

  // make-main-c
  pub main_c: Option<PathBuf>,

  // make-fs-c
  pub fs_c: Option<PathBuf>,
  pub vfs_stats: Option<VfsStats>,

  // install-runtime-lib
  pub runtime_lib_dir: Option<PathBuf>,

  // packing
  pub output: Option<PathBuf>,
}

impl BuildContext {
  pub fn new(options: BuildOptions) -> Self {
    Self {
      options,
      ..Self::default()
    }
  }

  pub fn is_resolved(&self, id: TaskId) -> bool {
    self.resolved.contains(&id)
  }

  pub fn mark_resolved(&mut self, id: TaskId) {
    if !self.is_resolved(id) {
      self.resolved.push(id);
    }
  }

  pub fn mark_unresolved(&mut self, id: TaskId) {
    self.resolved.retain(|r| *r != id);
  }

  /// Resolved tasks in the order they completed.
  pub fn resolved(&self) -> &[TaskId] {
    &self.resolved
  }

  pub fn use_gemfile(&self) -> Result<bool, BuildError> {
    require(&self.use_gemfile, "use_gemfile").copied()
  }

  pub fn work_dir(&self) -> Result<&Path, BuildError> {
    require(&self.work_dir, "work_dir").map(PathBuf::as_path)
  }
}

/// Read a context field that an earlier task must have defined.
pub fn require<'a, T>(field: &'a Option<T>, name: &'static str) -> Result<&'a T, BuildError> {
  field.as_ref().ok_or(BuildError::MissingField(name))
}
