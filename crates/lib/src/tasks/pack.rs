//! The runtime companion library and the final link.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{INSTALL_CARGO, INSTALL_RUNTIME_LIB, MAKE_FS_C, MAKE_MAIN_C, MAKE_WORK_DIR, PACKING};
use crate::consts::KOMPO_VFS_REPO;
use crate::context::{BuildContext, require};
use crate::error::BuildError;
use crate::link::{LinkInputs, LinkPlan};
use crate::metadata::{ExtMetadata, read_extlibs};
use crate::task::{Task, TaskId};
use crate::toolchain::Toolchain;
use crate::util::fs::remove_path;

const RUNTIME_ARCHIVE: &str = "libkompo_fs.a";

pub struct InstallRuntimeLib;

impl InstallRuntimeLib {
  fn checkout(ctx: &BuildContext) -> Result<PathBuf, BuildError> {
    match &ctx.options.local_runtime_dir {
      Some(dir) => Ok(std::path::absolute(dir)?),
      None => Ok(require(&ctx.cache_root, "cache_root")?.join("kompo-vfs")),
    }
  }
}

impl Task for InstallRuntimeLib {
  fn id(&self) -> TaskId {
    INSTALL_RUNTIME_LIB
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![MAKE_WORK_DIR, INSTALL_CARGO]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    ctx.runtime_lib_dir = Some(Self::checkout(ctx)?.join("target").join("release"));
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let checkout = Self::checkout(ctx)?;
    let lib_dir = require(&ctx.runtime_lib_dir, "runtime_lib_dir")?;
    let local = ctx.options.local_runtime_dir.is_some();

    if !local && lib_dir.join(RUNTIME_ARCHIVE).is_file() {
      debug!(path = ?lib_dir, "runtime library already built");
      return Ok(());
    }

    let cargo = ctx.cargo.as_deref().ok_or_else(|| BuildError::ToolchainMissing {
      tool: "cargo".to_string(),
      hint: "install a Rust toolchain to build the runtime library".to_string(),
    })?;
    if !local && !checkout.exists() {
      info!(repo = KOMPO_VFS_REPO, "cloning runtime library");
      tools.git()?.clone_repo(KOMPO_VFS_REPO, &checkout)?;
    }
    info!(path = ?checkout, "building runtime library");
    tools.cargo(cargo).build_release(&checkout.join("Cargo.toml"))?;
    Ok(())
  }
}

/// Every file below `root` whose extension is one of `exts`, sorted.
fn files_below(root: &Path, exts: &[&str]) -> Vec<PathBuf> {
  let mut found: Vec<PathBuf> = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .map(|e| e.into_path())
    .filter(|p| p.extension().and_then(OsStr::to_str).is_some_and(|e| exts.contains(&e)))
    .collect();
  found.sort();
  found
}

/// Unpacked interpreter source trees kept by the interpreter build.
fn interpreter_sources(build_path: &Path) -> Result<Vec<PathBuf>, BuildError> {
  let mut dirs = Vec::new();
  if !build_path.is_dir() {
    warn!(path = ?build_path, "interpreter build directory missing; no builtin extensions linked");
    return Ok(dirs);
  }
  for entry in std::fs::read_dir(build_path)? {
    let path = entry?.path();
    let is_source = path
      .file_name()
      .and_then(OsStr::to_str)
      .is_some_and(|n| n.starts_with("ruby-"));
    if is_source && path.is_dir() {
      dirs.push(path);
    }
  }
  dirs.sort();
  Ok(dirs)
}

pub struct Packing;

impl Packing {
  /// Collect the link inputs from the context and the build trees on disk.
  fn inputs(ctx: &BuildContext, tools: &Toolchain) -> Result<LinkInputs, BuildError> {
    let ruby_pc = require(&ctx.ruby_pc, "ruby_pc")?;
    let pkg_config = tools.pkg_config();
    let cflags = pkg_config.cflags(ruby_pc)?;
    let main_libs = pkg_config.variable(ruby_pc, "MAINLIBS")?;

    let build_path = require(&ctx.ruby_build_path, "ruby_build_path")?;
    let sources_dirs = interpreter_sources(build_path)?;

    let mut builtin_ext_libs = Vec::new();
    let mut objects = Vec::new();
    for src in &sources_dirs {
      for exts_mk in WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_name() == "exts.mk")
      {
        match read_extlibs(exts_mk.path()) {
          Ok(libs) => builtin_ext_libs.extend(libs),
          Err(e) => warn!(error = %e, "skipping interpreter extension libraries"),
        }
      }
      objects.extend(files_below(&src.join("ext"), &["o"]));
    }
    if let Some(exts_dir) = &ctx.exts_dir {
      objects.extend(files_below(exts_dir, &["o", "a"]));
    }

    let mut search_paths = vec![
      require(&ctx.ruby_lib_dir, "ruby_lib_dir")?.display().to_string(),
      require(&ctx.runtime_lib_dir, "runtime_lib_dir")?.display().to_string(),
    ];
    let mut native_ext_libs = Vec::new();
    for makefile in require(&ctx.ext_metadata, "ext_metadata")? {
      let meta = ExtMetadata::read_or_empty(makefile);
      search_paths.extend(meta.lib_paths.into_iter().filter(|p| Path::new(p).is_absolute()));
      native_ext_libs.push(meta.libs);
    }

    Ok(LinkInputs {
      main_libs,
      builtin_ext_libs,
      native_ext_libs,
      search_paths,
      objects,
      sources: vec![
        require(&ctx.main_c, "main_c")?.clone(),
        require(&ctx.fs_c, "fs_c")?.clone(),
      ],
      cflags,
      output: require(&ctx.output, "output")?.clone(),
    })
  }
}

impl Task for Packing {
  fn id(&self) -> TaskId {
    PACKING
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![MAKE_MAIN_C, MAKE_FS_C, INSTALL_RUNTIME_LIB]
  }

  fn define(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    let dest = require(&ctx.dest_dir, "dest_dir")?;
    let name = require(&ctx.project_name, "project_name")?;
    ctx.output = Some(dest.join(name));
    Ok(())
  }

  fn execute(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let plan = LinkPlan::new(Self::inputs(ctx, tools)?);
    debug!(
      static_libs = plan.static_libs.len(),
      dynamic_libs = plan.dynamic_libs.len(),
      "link plan"
    );
    info!(output = ?plan.output(), "linking executable");
    tools.linker().link(&plan.args())?;
    Ok(())
  }

  fn clean(&self, ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    if let Some(output) = &ctx.output {
      remove_path(output)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::BuildOptions;
  use crate::toolchain::testutil::{NoopRunner, ScriptedRunner};
  use tempfile::TempDir;

  fn linkable(temp: &TempDir) -> BuildContext {
    let root = temp.path();
    let build = root.join("cache/ruby/3.4.1/build");
    let ext = build.join("ruby-3.4.1/ext");
    std::fs::create_dir_all(ext.join("zlib")).unwrap();
    std::fs::write(ext.join("zlib/zlib.o"), "obj").unwrap();
    std::fs::write(ext.join("exts.mk"), "EXTLIBS = -lz\n").unwrap();
    let exts = root.join("work/exts/json/ext/parser");
    std::fs::create_dir_all(&exts).unwrap();
    std::fs::write(exts.join("parser.o"), "obj").unwrap();
    let gem = root.join("gems/json/ext/parser");
    std::fs::create_dir_all(&gem).unwrap();
    std::fs::write(
      gem.join("Makefile"),
      "LIBS = -lm -lssl\nldflags = -L/opt/ssl/lib -Lrelative\n",
    )
    .unwrap();

    let mut ctx = BuildContext::new(BuildOptions::default());
    ctx.ruby_pc = Some(root.join("cache/ruby/3.4.1/lib/pkgconfig/ruby.pc"));
    ctx.ruby_build_path = Some(build);
    ctx.ruby_lib_dir = Some(root.join("cache/ruby/3.4.1/lib"));
    ctx.runtime_lib_dir = Some(root.join("cache/kompo-vfs/target/release"));
    ctx.exts_dir = Some(root.join("work/exts"));
    ctx.ext_metadata = Some(vec![gem.join("Makefile")]);
    ctx.main_c = Some(root.join("work/main.c"));
    ctx.fs_c = Some(root.join("work/fs.c"));
    ctx.dest_dir = Some(root.join("dest"));
    ctx.project_name = Some("hello".to_string());
    ctx
  }

  #[test]
  fn gathers_link_inputs() {
    let temp = TempDir::new().unwrap();
    let tools = Toolchain::with_runner(ScriptedRunner::new().respond("pkg-config", "-lpthread -lgmp\n")).unwrap();
    let mut ctx = linkable(&temp);
    Packing.define(&mut ctx, &tools).unwrap();

    let inputs = Packing::inputs(&ctx, &tools).unwrap();

    assert_eq!(inputs.output, temp.path().join("dest/hello"));
    assert_eq!(inputs.builtin_ext_libs, vec!["-lz"]);
    assert_eq!(inputs.native_ext_libs, vec![vec!["-lm".to_string(), "-lssl".to_string()]]);
    assert_eq!(
      inputs.objects,
      vec![
        temp.path().join("cache/ruby/3.4.1/build/ruby-3.4.1/ext/zlib/zlib.o"),
        temp.path().join("work/exts/json/ext/parser/parser.o"),
      ]
    );
    assert_eq!(inputs.search_paths.len(), 3);
    assert_eq!(inputs.search_paths[2], "/opt/ssl/lib");
  }

  #[test]
  fn links_with_planned_arguments() {
    let temp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new().respond("pkg-config", "-lpthread\n");
    let calls = runner.calls();
    let tools = Toolchain::with_runner(runner).unwrap();
    let mut ctx = linkable(&temp);

    Packing.define(&mut ctx, &tools).unwrap();
    Packing.execute(&mut ctx, &tools).unwrap();

    let recorded = calls.borrow();
    let link = recorded.last().unwrap();
    assert!(link.args.contains(&"-lruby-static".to_string()));
    assert!(link.args.contains(&"-lssl".to_string()));
    assert!(link.args.contains(&"-lz".to_string()));
    let out = temp.path().join("dest/hello").display().to_string();
    assert_eq!(&link.args[link.args.len() - 2..], &["-o".to_string(), out]);
  }

  #[test]
  fn runtime_lib_is_cloned_and_built_once() {
    let temp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    let calls = runner.calls();
    let tools = Toolchain::with_runner(runner).unwrap();
    let mut ctx = BuildContext::new(BuildOptions::default());
    ctx.cache_root = Some(temp.path().join("cache"));
    ctx.cargo = Some(PathBuf::from("/usr/bin/cargo"));

    InstallRuntimeLib.define(&mut ctx, &tools).unwrap();
    InstallRuntimeLib.execute(&mut ctx, &tools).unwrap();
    {
      let recorded = calls.borrow();
      assert_eq!(recorded[0].program, "git");
      assert_eq!(recorded[1].program, "cargo");
    }

    let release = temp.path().join("cache/kompo-vfs/target/release");
    std::fs::create_dir_all(&release).unwrap();
    std::fs::write(release.join(RUNTIME_ARCHIVE), "archive").unwrap();
    InstallRuntimeLib.execute(&mut ctx, &tools).unwrap();

    assert_eq!(calls.borrow().len(), 2);
  }

  #[test]
  fn local_runtime_lib_is_always_rebuilt() {
    let temp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    let calls = runner.calls();
    let tools = Toolchain::with_runner(runner).unwrap();
    let local = temp.path().join("kompo-vfs");
    let mut ctx = BuildContext::new(BuildOptions {
      local_runtime_dir: Some(local.clone()),
      ..BuildOptions::default()
    });
    ctx.cargo = Some(PathBuf::from("/usr/bin/cargo"));

    InstallRuntimeLib.define(&mut ctx, &tools).unwrap();
    InstallRuntimeLib.execute(&mut ctx, &tools).unwrap();

    assert_eq!(ctx.runtime_lib_dir, Some(local.join("target/release")));
    let manifest = local.join("Cargo.toml").display().to_string();
    let recorded = calls.borrow();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].args, vec!["build", "--release", "--manifest-path", manifest.as_str()]);
  }

  #[test]
  fn runtime_lib_needs_cargo() {
    let temp = TempDir::new().unwrap();
    let tools = Toolchain::with_runner(NoopRunner).unwrap();
    let mut ctx = BuildContext::new(BuildOptions::default());
    ctx.cache_root = Some(temp.path().join("cache"));

    InstallRuntimeLib.define(&mut ctx, &tools).unwrap();
    let err = InstallRuntimeLib.execute(&mut ctx, &tools).unwrap_err();

    assert!(matches!(err, BuildError::ToolchainMissing { ref tool, .. } if tool == "cargo"));
  }
}
