//! The packaging pipeline as a task graph.
//!
//! Leaves stage the toolchain and project; the interpreter and dependency
//! tasks fill the caches; the generators write `main.c` and `fs.c`; packing
//! links everything into one executable.

mod dependencies;
mod generate;
mod interpreter;
mod pack;
mod staging;

use crate::task::{TaskGraph, TaskId};

pub use dependencies::{BuildNativeGems, BundleInstall, RequireBundlerSetup};
pub use generate::{MakeFsC, MakeMainC};
pub use interpreter::{CheckStdlibs, InstallRuby, normalize_ruby_version};
pub use pack::{InstallRuntimeLib, Packing};
pub use staging::{CheckRubyVersion, CopyGemfile, CopyProjectFiles, InstallCargo, InstallRubyBuild, MakeWorkDir};

pub const MAKE_WORK_DIR: TaskId = TaskId("make-work-dir");
pub const CHECK_RUBY_VERSION: TaskId = TaskId("check-ruby-version");
pub const INSTALL_RUBY_BUILD: TaskId = TaskId("install-ruby-build");
pub const INSTALL_CARGO: TaskId = TaskId("install-cargo");
pub const COPY_GEMFILE: TaskId = TaskId("copy-gemfile");
pub const COPY_PROJECT_FILES: TaskId = TaskId("copy-project-files");
pub const STAGE_PROJECT: TaskId = TaskId("stage-project");
pub const INSTALL_RUBY: TaskId = TaskId("install-ruby");
pub const CHECK_STDLIBS: TaskId = TaskId("check-stdlibs");
pub const BUNDLE_INSTALL: TaskId = TaskId("bundle-install");
pub const BUILD_NATIVE_GEMS: TaskId = TaskId("build-native-gems");
pub const REQUIRE_BUNDLER_SETUP: TaskId = TaskId("require-bundler-setup");
pub const MAKE_MAIN_C: TaskId = TaskId("make-main-c");
pub const MAKE_FS_C: TaskId = TaskId("make-fs-c");
pub const INSTALL_RUNTIME_LIB: TaskId = TaskId("install-runtime-lib");
pub const PACKING: TaskId = TaskId("packing");

/// Every pipeline task, registered by id.
pub fn registry() -> TaskGraph {
  let mut graph = TaskGraph::new();
  graph.register(MakeWorkDir);
  graph.register(CheckRubyVersion);
  graph.register(InstallRubyBuild);
  graph.register(InstallCargo);
  graph.register(CopyGemfile);
  graph.register(CopyProjectFiles);
  graph.union(STAGE_PROJECT, COPY_GEMFILE, COPY_PROJECT_FILES);
  graph.register(InstallRuby);
  graph.register(CheckStdlibs);
  graph.register(BundleInstall);
  graph.register(BuildNativeGems);
  graph.register(RequireBundlerSetup);
  graph.register(MakeMainC);
  graph.register(MakeFsC);
  graph.register(InstallRuntimeLib);
  graph.register(Packing);
  graph
}
