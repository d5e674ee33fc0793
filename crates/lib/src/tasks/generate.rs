//! Generated C sources: the bootstrap `main.c` and the embedded `fs.c`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

use super::{BUILD_NATIVE_GEMS, BUNDLE_INSTALL, MAKE_FS_C, MAKE_MAIN_C, REQUIRE_BUNDLER_SETUP, STAGE_PROJECT};
use crate::context::{BuildContext, require};
use crate::entrypoint::render_main_c;
use crate::error::BuildError;
use crate::task::{Task, TaskId};
use crate::toolchain::Toolchain;
use crate::util::fs::remove_path;
use crate::vfs::{scan_roots, write_fs_source};

pub struct MakeMainC;

impl Task for MakeMainC {
  fn id(&self) -> TaskId {
    MAKE_MAIN_C
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![BUNDLE_INSTALL, BUILD_NATIVE_GEMS]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    ctx.main_c = Some(ctx.work_dir()?.join("main.c"));
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let exts = require(&ctx.native_exts, "native_exts")?;
    let setup = if ctx.use_gemfile()? {
      Some(require(&ctx.bundle_setup, "bundle_setup")?.as_path())
    } else {
      None
    };
    std::fs::write(require(&ctx.main_c, "main_c")?, render_main_c(exts, setup))?;
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(main_c) = &ctx.main_c {
      remove_path(main_c)?;
    }
    Ok(())
  }
}

pub struct MakeFsC;

impl MakeFsC {
  /// Embed roots in the order they are written to the tables.
  fn roots(ctx: &BuildContext) -> Result<Vec<PathBuf>, BuildError> {
    let mut roots = require(&ctx.work_dir_files, "work_dir_files")?.clone();
    roots.extend(require(&ctx.gem_load_path, "gem_load_path")?.iter().cloned());
    roots.extend(require(&ctx.std_load_path, "std_load_path")?.iter().cloned());
    roots.push(require(&ctx.work_dir_entrypoint, "work_dir_entrypoint")?.clone());
    if ctx.use_gemfile()? {
      roots.push(require(&ctx.bundle_setup, "bundle_setup")?.clone());
    }
    Ok(roots)
  }
}

impl Task for MakeFsC {
  fn id(&self) -> TaskId {
    MAKE_FS_C
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![STAGE_PROJECT, BUNDLE_INSTALL, REQUIRE_BUNDLER_SETUP]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    ctx.fs_c = Some(ctx.work_dir()?.join("fs.c"));
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let roots = Self::roots(ctx)?;
    let tables = tools.block_on(scan_roots(&roots))?;

    let wd = ctx.work_dir()?;
    let start = require(&ctx.work_dir_entrypoint, "work_dir_entrypoint")?;
    let mut out = BufWriter::new(File::create(require(&ctx.fs_c, "fs_c")?)?);
    write_fs_source(&tables, wd, start, &mut out)?;
    out.flush()?;

    let stats = tables.stats();
    info!(files = stats.file_count, bytes = stats.content_bytes, "embedded filesystem written");
    ctx.vfs_stats = Some(stats);
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(fs_c) = &ctx.fs_c {
      remove_path(fs_c)?;
    }
    Ok(())
  }
}
