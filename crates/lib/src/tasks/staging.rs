//! Leaf tasks: workspace, tool discovery, and project staging.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{COPY_GEMFILE, COPY_PROJECT_FILES, CHECK_RUBY_VERSION, INSTALL_CARGO, INSTALL_RUBY_BUILD, MAKE_WORK_DIR};
use crate::consts::{APP_NAME, RUBY_BUILD_REPO};
use crate::context::{BuildContext, require};
use crate::error::BuildError;
use crate::platform::paths::{cache_dir, cargo_home_bin};
use crate::task::{Task, TaskId};
use crate::tasks::normalize_ruby_version;
use crate::toolchain::Toolchain;
use crate::util::fs::{copy_dir, copy_file, remove_path};

/// Resolve `path` against `base` unless it is already absolute.
fn resolve(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

/// Where a project input lands inside the work directory.
///
/// Inputs below the project root keep their relative layout; anything else
/// is placed at the top level under its file name.
fn staged_path(project_dir: &Path, work_dir: &Path, input: &Path) -> PathBuf {
  match input.strip_prefix(project_dir) {
    Ok(rel) => work_dir.join(rel),
    Err(_) => work_dir.join(input.file_name().unwrap_or(input.as_os_str())),
  }
}

fn existing_input(path: PathBuf) -> Result<PathBuf, BuildError> {
  if path.exists() {
    Ok(path)
  } else {
    Err(BuildError::MissingInput { path })
  }
}

pub struct MakeWorkDir;

impl Task for MakeWorkDir {
  fn id(&self) -> TaskId {
    MAKE_WORK_DIR
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let requested = match &ctx.options.project_dir {
      Some(dir) => dir.clone(),
      None => std::env::current_dir()?,
    };
    let project_dir = dunce::canonicalize(&requested).map_err(|_| BuildError::MissingInput { path: requested })?;
    let project_name = project_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| APP_NAME.to_string());

    let dest_dir = match &ctx.options.dest_dir {
      Some(dir) => std::path::absolute(dir)?,
      None => project_dir.clone(),
    };
    let cache_root = cache_dir().ok_or(BuildError::NoCacheDir)?.join(&project_name);

    ctx.project_dir = Some(project_dir);
    ctx.project_name = Some(project_name);
    ctx.dest_dir = Some(dest_dir);
    ctx.cache_root = Some(cache_root);
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    std::fs::create_dir_all(require(&ctx.dest_dir, "dest_dir")?)?;
    std::fs::create_dir_all(require(&ctx.cache_root, "cache_root")?)?;

    let work_dir = tempfile::Builder::new().prefix(".kompo_work_dir").tempdir()?.keep();
    info!(path = ?work_dir, "created work directory");
    ctx.work_dir = Some(work_dir);
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let Some(work_dir) = &ctx.work_dir else {
      return Ok(());
    };
    if ctx.options.keep_work_dir {
      info!(path = ?work_dir, "keeping work directory");
      return Ok(());
    }
    debug!(path = ?work_dir, "removing work directory");
    remove_path(work_dir)?;
    Ok(())
  }
}

pub struct CheckRubyVersion;

impl Task for CheckRubyVersion {
  fn id(&self) -> TaskId {
    CHECK_RUBY_VERSION
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(version) = &ctx.options.ruby_version {
      ctx.ruby_version = Some(normalize_ruby_version(version));
    }
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    if ctx.ruby_version.is_none() {
      let host = tools.require_tool("ruby", "install ruby or pass --ruby-version")?;
      let version = normalize_ruby_version(&tools.ruby(&host).version()?);
      info!(version = %version, "using host ruby version");
      ctx.ruby_version = Some(version);
    }
    Ok(())
  }
}

pub struct InstallRubyBuild;

impl Task for InstallRubyBuild {
  fn id(&self) -> TaskId {
    INSTALL_RUBY_BUILD
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![MAKE_WORK_DIR]
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(found) = tools.locate("ruby-build") {
      info!(path = ?found, "ruby-build already installed");
      ctx.ruby_build = Some(found);
      return Ok(());
    }

    let checkout = require(&ctx.cache_root, "cache_root")?.join("ruby-build");
    let bin = checkout.join("bin").join("ruby-build");
    if !checkout.exists() {
      info!(repo = RUBY_BUILD_REPO, "cloning ruby-build");
      tools.git()?.clone_repo(RUBY_BUILD_REPO, &checkout)?;
    }
    ctx.ruby_build = Some(bin);
    Ok(())
  }
}

pub struct InstallCargo;

impl Task for InstallCargo {
  fn id(&self) -> TaskId {
    INSTALL_CARGO
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![]
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let found = tools.locate("cargo").or_else(|| {
      cargo_home_bin()
        .map(|dir| dir.join("cargo"))
        .filter(|bin| bin.is_file())
    });
    match &found {
      Some(bin) => debug!(path = ?bin, "found cargo"),
      None => debug!("cargo not found; only needed for Rust extensions and the runtime library"),
    }
    ctx.cargo = found;
    Ok(())
  }
}

pub struct CopyGemfile;

impl Task for CopyGemfile {
  fn id(&self) -> TaskId {
    COPY_GEMFILE
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![MAKE_WORK_DIR]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let gemfile = require(&ctx.project_dir, "project_dir")?.join("Gemfile");
    let use_gemfile = match ctx.options.gemfile {
      Some(true) => {
        existing_input(gemfile)?;
        true
      }
      Some(false) => false,
      None => gemfile.is_file(),
    };
    ctx.use_gemfile = Some(use_gemfile);
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if !ctx.use_gemfile()? {
      return Ok(());
    }
    let project_dir = require(&ctx.project_dir, "project_dir")?;
    let work_dir = ctx.work_dir()?;
    for name in ["Gemfile", "Gemfile.lock"] {
      let src = project_dir.join(name);
      if src.is_file() {
        copy_file(&src, &work_dir.join(name))?;
      }
    }
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(work_dir) = &ctx.work_dir {
      for name in ["Gemfile", "Gemfile.lock"] {
        remove_path(&work_dir.join(name))?;
      }
    }
    Ok(())
  }
}

pub struct CopyProjectFiles;

impl Task for CopyProjectFiles {
  fn id(&self) -> TaskId {
    COPY_PROJECT_FILES
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![MAKE_WORK_DIR]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let project_dir = require(&ctx.project_dir, "project_dir")?.clone();
    let work_dir = ctx.work_dir()?.to_path_buf();

    let entrypoint = match &ctx.options.entrypoint {
      Some(path) => resolve(&project_dir, path),
      None => project_dir.join("main.rb"),
    };
    let entrypoint = existing_input(entrypoint)?;

    let mut staged = Vec::with_capacity(ctx.options.files.len());
    for file in &ctx.options.files {
      let input = existing_input(resolve(&project_dir, file))?;
      staged.push(staged_path(&project_dir, &work_dir, &input));
    }

    ctx.work_dir_entrypoint = Some(staged_path(&project_dir, &work_dir, &entrypoint));
    ctx.entrypoint = Some(entrypoint);
    ctx.work_dir_files = Some(staged);
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let project_dir = require(&ctx.project_dir, "project_dir")?;
    let entrypoint = require(&ctx.entrypoint, "entrypoint")?;
    copy_file(entrypoint, require(&ctx.work_dir_entrypoint, "work_dir_entrypoint")?)?;

    let staged = require(&ctx.work_dir_files, "work_dir_files")?;
    for (file, dest) in ctx.options.files.iter().zip(staged) {
      let src = resolve(project_dir, file);
      if src.is_dir() {
        copy_dir(&src, dest, &[])?;
      } else {
        copy_file(&src, dest)?;
      }
    }
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(entrypoint) = &ctx.work_dir_entrypoint {
      remove_path(entrypoint)?;
    }
    for staged in ctx.work_dir_files.iter().flatten() {
      remove_path(staged)?;
    }
    Ok(())
  }
}
