//! Adapters for dependency installation and native compilation:
//! the dependency manager, cargo, make, git, and the final linker.

use std::path::{Path, PathBuf};

use super::{Cmd, Toolchain};
use crate::error::BuildError;

pub struct Bundler<'a> {
  tools: &'a Toolchain,
  bin: &'a Path,
  work_dir: &'a Path,
}

impl<'a> Bundler<'a> {
  pub(super) fn new(tools: &'a Toolchain, bin: &'a Path, work_dir: &'a Path) -> Self {
    Self { tools, bin, work_dir }
  }

  fn cmd(&self) -> Cmd {
    Cmd::new(self.bin)
      .env("BUNDLE_GEMFILE", self.work_dir.join("Gemfile"))
      .current_dir(self.work_dir)
  }

  pub fn config_path(&self, path: &Path) -> Result<(), BuildError> {
    self.tools.run(&self.cmd().args(["config", "set", "path"]).arg(path))?;
    Ok(())
  }

  /// Install `group` so the result loads without a system-wide registry.
  pub fn install_standalone(&self, group: &str) -> Result<(), BuildError> {
    self
      .tools
      .run(&self.cmd().arg("install").arg(format!("--standalone={}", group)))?;
    Ok(())
  }
}

pub struct Cargo<'a> {
  tools: &'a Toolchain,
  bin: &'a Path,
}

impl<'a> Cargo<'a> {
  pub(super) fn new(tools: &'a Toolchain, bin: &'a Path) -> Self {
    Self { tools, bin }
  }

  pub fn build_release(&self, manifest: &Path) -> Result<(), BuildError> {
    let cmd = Cmd::new(self.bin)
      .args(["build", "--release", "--manifest-path"])
      .arg(manifest);
    self.tools.run(&cmd)?;
    Ok(())
  }

  /// Build the crate at `manifest` as a static archive under `target_dir`.
  pub fn rustc_staticlib(&self, manifest: &Path, target_dir: &Path) -> Result<(), BuildError> {
    let mut cmd = Cmd::new(self.bin)
      .args(["rustc", "--release", "--crate-type=staticlib", "--target-dir"])
      .arg(target_dir)
      .arg("--manifest-path")
      .arg(manifest);
    if let Some(dir) = manifest.parent() {
      cmd = cmd.current_dir(dir);
    }
    self.tools.run(&cmd)?;
    Ok(())
  }
}

pub struct Make<'a> {
  tools: &'a Toolchain,
}

impl<'a> Make<'a> {
  pub(super) fn new(tools: &'a Toolchain) -> Self {
    Self { tools }
  }

  /// Compile just the object files of the Makefile in `dir`.
  pub fn objects(&self, dir: &Path, objects: &[String]) -> Result<(), BuildError> {
    let cmd = Cmd::new("make").args(objects).arg("--always-make").current_dir(dir);
    self.tools.run(&cmd)?;
    Ok(())
  }
}

pub struct Git<'a> {
  tools: &'a Toolchain,
  bin: PathBuf,
}

impl<'a> Git<'a> {
  pub(super) fn new(tools: &'a Toolchain, bin: PathBuf) -> Self {
    Self { tools, bin }
  }

  pub fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), BuildError> {
    self.tools.run(&Cmd::new(&self.bin).args(["clone", "--depth", "1", url]).arg(dest))?;
    Ok(())
  }
}

pub struct Linker<'a> {
  tools: &'a Toolchain,
}

impl<'a> Linker<'a> {
  pub(super) fn new(tools: &'a Toolchain) -> Self {
    Self { tools }
  }

  /// The C compiler driver used for the final link; `$CC` or `gcc`.
  pub fn program() -> String {
    std::env::var("CC")
      .ok()
      .filter(|cc| !cc.trim().is_empty())
      .unwrap_or_else(|| "gcc".to_string())
  }

  pub fn link(&self, args: &[String]) -> Result<(), BuildError> {
    self.tools.run(&Cmd::new(Self::program()).args(args))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::toolchain::testutil::ScriptedRunner;
  use serial_test::serial;

  #[test]
  fn bundler_runs_in_work_dir() {
    let runner = ScriptedRunner::new();
    let calls = runner.calls();
    let tools = Toolchain::with_runner(runner).unwrap();
    let bin = PathBuf::from("/w/bin/bundler");
    let work = PathBuf::from("/w");

    let bundler = tools.bundler(&bin, &work);
    bundler.config_path(&work).unwrap();
    bundler.install_standalone("default").unwrap();

    let recorded = calls.borrow();
    assert_eq!(recorded[0].args, vec!["config", "set", "path", "/w"]);
    assert_eq!(recorded[1].args, vec!["install", "--standalone=default"]);
    assert_eq!(recorded[1].cwd, Some(work.clone()));
    assert_eq!(recorded[1].env("BUNDLE_GEMFILE"), Some("/w/Gemfile".to_string()));
  }

  #[test]
  fn cargo_requests_static_archive() {
    let runner = ScriptedRunner::new();
    let calls = runner.calls();
    let tools = Toolchain::with_runner(runner).unwrap();
    let bin = PathBuf::from("/home/u/.cargo/bin/cargo");

    tools
      .cargo(&bin)
      .rustc_staticlib(Path::new("/g/ext/Cargo.toml"), Path::new("target"))
      .unwrap();

    let recorded = calls.borrow();
    assert_eq!(
      recorded[0].args,
      vec![
        "rustc",
        "--release",
        "--crate-type=staticlib",
        "--target-dir",
        "target",
        "--manifest-path",
        "/g/ext/Cargo.toml"
      ]
    );
    assert_eq!(recorded[0].cwd, Some(PathBuf::from("/g/ext")));
  }

  #[test]
  fn git_is_required_for_clone() {
    let tools = Toolchain::with_runner(ScriptedRunner::new().without("git")).unwrap();

    let err = tools.git().err().unwrap();

    assert!(matches!(err, BuildError::ToolchainMissing { ref tool, .. } if tool == "git"));
  }

  #[test]
  #[serial]
  fn linker_honours_cc() {
    temp_env::with_var("CC", Some("clang"), || {
      assert_eq!(Linker::program(), "clang");
    });
    temp_env::with_var("CC", None::<&str>, || {
      assert_eq!(Linker::program(), "gcc");
    });
  }
}
