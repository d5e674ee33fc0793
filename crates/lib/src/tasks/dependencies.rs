//! Standalone dependency install and native extension builds.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{
  BUILD_NATIVE_GEMS, BUNDLE_INSTALL, CHECK_STDLIBS, INSTALL_CARGO, INSTALL_RUBY, REQUIRE_BUNDLER_SETUP, STAGE_PROJECT,
};
use crate::cache::CacheEntry;
use crate::context::{BuildContext, BuildMode, NativeExt, require};
use crate::error::BuildError;
use crate::metadata::ExtMetadata;
use crate::task::{Task, TaskId};
use crate::toolchain::Toolchain;
use crate::util::fs::{copy_file, remove_path};
use crate::util::hash::{hash_bytes, hash_file};

/// Length of the lockfile hash used in bundle cache directory names.
const LOCK_HASH_LEN: usize = 16;

/// The directories a standalone install writes below the work dir.
fn bundle_outputs(work_dir: &Path) -> Vec<PathBuf> {
  vec![work_dir.join("ruby"), work_dir.join("bundler")]
}

pub struct BundleInstall;

impl Task for BundleInstall {
  fn id(&self) -> TaskId {
    BUNDLE_INSTALL
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![STAGE_PROJECT, INSTALL_RUBY]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if !ctx.use_gemfile()? {
      return Ok(());
    }
    let work_dir = ctx.work_dir()?.to_path_buf();
    let version = require(&ctx.ruby_version, "ruby_version")?;
    let abi = require(&ctx.ruby_abi_version, "ruby_abi_version")?;
    let group = ctx.options.use_group.clone().unwrap_or_else(|| "default".to_string());

    // A standalone install only holds the selected group.
    let bundle_cache = match &ctx.options.bundle_cache {
      Some(dir) => dir.clone(),
      None => {
        let lock = work_dir.join("Gemfile.lock");
        let key = if lock.is_file() {
          hash_file(&lock)?
        } else {
          hash_bytes(std::fs::read(work_dir.join("Gemfile"))?.as_slice())
        };
        require(&ctx.cache_root, "cache_root")?
          .join("bundle")
          .join(version)
          .join(&group)
          .join(key.short(LOCK_HASH_LEN))
      }
    };

    ctx.use_group = Some(group);
    ctx.bundle_setup = Some(work_dir.join("bundler").join("setup.rb"));
    ctx.bundle_ruby_dir = Some(work_dir.join("ruby").join(abi));
    ctx.bundle_cache = Some(bundle_cache);
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    if !ctx.use_gemfile()? {
      ctx.bundle_cached = Some(false);
      return Ok(());
    }
    let work_dir = ctx.work_dir()?;
    let entry = CacheEntry::new(require(&ctx.bundle_cache, "bundle_cache")?);

    // A user-supplied standalone install is taken as-is.
    if ctx.options.bundle_cache.is_some() {
      if !entry.path().join("bundler").join("setup.rb").is_file() {
        return Err(BuildError::MissingInput {
          path: entry.path().join("bundler").join("setup.rb"),
        });
      }
      info!(path = ?entry.path(), "using supplied bundle");
      entry.restore_into(work_dir)?;
      ctx.bundle_cached = Some(true);
      return Ok(());
    }

    if ctx.options.mode == BuildMode::Repack && entry.is_complete() {
      info!(path = ?entry.path(), "using cached bundle");
      entry.restore_into(work_dir)?;
      ctx.bundle_cached = Some(true);
      return Ok(());
    }

    entry.discard()?;
    let bundler_bin = require(&ctx.bundler_bin, "bundler_bin")?;
    let group = require(&ctx.use_group, "use_group")?;
    info!(group = %group, "installing dependencies");
    let bundler = tools.bundler(bundler_bin, work_dir);
    bundler.config_path(work_dir)?;
    bundler.install_standalone(group)?;
    entry.store_from(&bundle_outputs(work_dir))?;

    ctx.bundle_cached = Some(false);
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if ctx.use_gemfile != Some(true) {
      return Ok(());
    }
    if let Some(work_dir) = &ctx.work_dir {
      for output in bundle_outputs(work_dir) {
        remove_path(&output)?;
      }
    }
    if ctx.options.bundle_cache.is_none()
      && let Some(cache) = &ctx.bundle_cache
    {
      CacheEntry::new(cache).discard_if_incomplete()?;
    }
    Ok(())
  }
}

/// Directories below `gems_dir` holding an `extconf.rb`, in path order.
fn extension_dirs(gems_dir: &Path) -> Vec<PathBuf> {
  WalkDir::new(gems_dir)
    .sort_by_file_name()
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file() && e.file_name() == "extconf.rb")
    .filter_map(|e| e.path().parent().map(Path::to_path_buf))
    .collect()
}

/// Files in `dir` (not recursive) with the given extension, sorted.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, BuildError> {
  let mut found = Vec::new();
  if !dir.is_dir() {
    return Ok(found);
  }
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_file() && path.extension().is_some_and(|e| e == ext) {
      found.push(path);
    }
  }
  found.sort();
  Ok(found)
}

pub struct BuildNativeGems;

impl BuildNativeGems {
  /// Build the extension in `ext_dir`, returning the artifacts to link.
  fn build_one(&self, ctx: &BuildContext, tools: &Toolchain, ext_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let manifest = ext_dir.join("Cargo.toml");
    if manifest.is_file() {
      let cargo = ctx.cargo.as_deref().ok_or_else(|| BuildError::ToolchainMissing {
        tool: "cargo".to_string(),
        hint: format!("install a Rust toolchain to build {}", ext_dir.display()),
      })?;
      tools.cargo(cargo).rustc_staticlib(&manifest, Path::new("target"))?;
      return files_with_extension(&ext_dir.join("target").join("release"), "a");
    }

    let ruby_bin = require(&ctx.ruby_bin, "ruby_bin")?;
    tools.ruby(ruby_bin).extconf(ext_dir)?;
    let meta = ExtMetadata::read_or_empty(&ext_dir.join("Makefile"));
    if meta.objects.is_empty() {
      warn!(dir = ?ext_dir, "extension lists no object files");
      return Ok(Vec::new());
    }
    tools.make().objects(ext_dir, &meta.objects)?;
    Ok(meta.objects.iter().map(|o| ext_dir.join(o)).collect())
  }
}

impl Task for BuildNativeGems {
  fn id(&self) -> TaskId {
    BUILD_NATIVE_GEMS
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![STAGE_PROJECT, INSTALL_CARGO, INSTALL_RUBY, BUNDLE_INSTALL]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    ctx.exts_dir = Some(ctx.work_dir()?.join("exts"));
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let mut native_exts = Vec::new();
    let mut ext_metadata = Vec::new();

    if ctx.use_gemfile()? {
      let exts_dir = require(&ctx.exts_dir, "exts_dir")?;
      let gems_dir = require(&ctx.bundle_ruby_dir, "bundle_ruby_dir")?.join("gems");

      for ext_dir in extension_dirs(&gems_dir) {
        let rel = ext_dir.strip_prefix(&gems_dir).unwrap_or(&ext_dir);
        let out_dir = exts_dir.join(rel);
        info!(extension = %rel.display(), "building native extension");

        let artifacts = self.build_one(ctx, tools, &ext_dir)?;
        for artifact in &artifacts {
          if let Some(name) = artifact.file_name() {
            copy_file(artifact, &out_dir.join(name))?;
          }
        }

        let makefile = ext_dir.join("Makefile");
        let meta = ExtMetadata::read_or_empty(&makefile);
        match meta.feature() {
          Some(feature) => {
            let init_fn = format!("Init_{}", meta.target_name.as_deref().unwrap_or_default());
            debug!(feature = %feature, init = %init_fn, "registering extension");
            native_exts.push(NativeExt { feature, init_fn });
          }
          None => warn!(dir = ?ext_dir, "extension has no TARGET_NAME; it will not be registered"),
        }
        ext_metadata.push(makefile);
      }
    }

    ctx.native_exts = Some(native_exts);
    ctx.ext_metadata = Some(ext_metadata);
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(exts_dir) = &ctx.exts_dir {
      remove_path(exts_dir)?;
    }
    Ok(())
  }
}

pub struct RequireBundlerSetup;

impl Task for RequireBundlerSetup {
  fn id(&self) -> TaskId {
    REQUIRE_BUNDLER_SETUP
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![INSTALL_RUBY, CHECK_STDLIBS, BUNDLE_INSTALL]
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let gem_load_path = if ctx.use_gemfile()? {
      let ruby_bin = require(&ctx.ruby_bin, "ruby_bin")?;
      let setup = require(&ctx.bundle_setup, "bundle_setup")?;
      let std_load_path = require(&ctx.std_load_path, "std_load_path")?;
      tools
        .ruby(ruby_bin)
        .load_path(Some(setup))?
        .into_iter()
        .filter(|p| !std_load_path.contains(p))
        .collect()
    } else {
      Vec::new()
    };
    debug!(count = gem_load_path.len(), "dependency load path entries");
    ctx.gem_load_path = Some(gem_load_path);
    Ok(())
  }
}
