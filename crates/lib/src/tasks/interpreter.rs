//! Static interpreter build and its load path.

use std::path::Path;

use tracing::info;

use super::{CHECK_RUBY_VERSION, CHECK_STDLIBS, INSTALL_RUBY, INSTALL_RUBY_BUILD};
use crate::cache::CacheEntry;
use crate::context::{BuildContext, BuildMode, require};
use crate::error::BuildError;
use crate::task::{Task, TaskId};
use crate::toolchain::{InterpreterBuild, Toolchain, configure_options};

const RUBY_PC: &str = "ruby.pc";

/// `v3_4_1` or `3.4.1` → `3.4.1`.
pub fn normalize_ruby_version(raw: &str) -> String {
  raw.trim().trim_start_matches('v').replace('_', ".")
}

/// Library ABI directory name, e.g. `3.4.0` for `3.4.1`.
fn abi_version(version: &str) -> String {
  let mut parts = version.split('.');
  match (parts.next(), parts.next()) {
    (Some(major), Some(minor)) => format!("{}.{}.0", major, minor),
    _ => version.to_string(),
  }
}

/// Kept interpreter build tree below the prefix; left out of the entry hash.
const BUILD_TREE: &str = "build";

fn interpreter_entry(prefix: &Path) -> CacheEntry {
  CacheEntry::new(prefix).skip_hashing(&[BUILD_TREE])
}

pub struct InstallRuby;

impl Task for InstallRuby {
  fn id(&self) -> TaskId {
    INSTALL_RUBY
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![INSTALL_RUBY_BUILD, CHECK_RUBY_VERSION]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let version = require(&ctx.ruby_version, "ruby_version")?.clone();
    // Installed straight into the cache entry; the prefix is baked into the
    // interpreter's load path.
    let prefix = require(&ctx.cache_root, "cache_root")?.join("ruby").join(&version);

    ctx.ruby_bin = Some(prefix.join("bin").join("ruby"));
    ctx.bundler_bin = Some(prefix.join("bin").join("bundle"));
    ctx.ruby_lib_dir = Some(prefix.join("lib"));
    ctx.ruby_pc = Some(prefix.join("lib").join("pkgconfig").join(RUBY_PC));
    ctx.ruby_build_path = Some(prefix.join(BUILD_TREE));
    ctx.ruby_abi_version = Some(abi_version(&version));
    ctx.ruby_cache = Some(prefix);
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let version = require(&ctx.ruby_version, "ruby_version")?;
    let entry = interpreter_entry(require(&ctx.ruby_cache, "ruby_cache")?);

    if ctx.options.mode == BuildMode::Repack && entry.is_complete() {
      info!(version = %version, path = ?entry.path(), "using cached interpreter");
      ctx.interpreter_cached = Some(true);
      return Ok(());
    }

    entry.discard()?;
    std::fs::create_dir_all(entry.path())?;
    let cache_root = require(&ctx.cache_root, "cache_root")?;
    let download_cache = cache_root.join("downloads");
    std::fs::create_dir_all(&download_cache)?;

    info!(version = %version, "building static interpreter");
    let build = InterpreterBuild {
      version: version.clone(),
      prefix: entry.path().to_path_buf(),
      download_cache,
      build_path: require(&ctx.ruby_build_path, "ruby_build_path")?.clone(),
      tmp_dir: ctx.work_dir()?.to_path_buf(),
      configure_options: configure_options(RUBY_PC),
    };
    tools
      .ruby_build(require(&ctx.ruby_build, "ruby_build")?)
      .install(&build)?;
    entry.mark_complete()?;

    ctx.interpreter_cached = Some(false);
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(cache) = &ctx.ruby_cache {
      interpreter_entry(cache).discard_if_incomplete()?;
    }
    Ok(())
  }
}

pub struct CheckStdlibs;

impl Task for CheckStdlibs {
  fn id(&self) -> TaskId {
    CHECK_STDLIBS
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![INSTALL_RUBY]
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let ruby_bin = require(&ctx.ruby_bin, "ruby_bin")?;
    let load_path = tools.ruby(ruby_bin).load_path(None)?;
    ctx.std_load_path = Some(load_path);
    Ok(())
  }
}
