//! Adapters over the external toolchain.
//!
//! Tasks never format shell lines or scrape tool output themselves. They go
//! through the per-tool adapters here, which build a [`Cmd`], hand it to the
//! [`CommandRunner`], and return structured data. Swapping the runner is how
//! tests drive the whole pipeline without a real interpreter or compiler.

mod cmd;
mod native;
mod ruby;

#[cfg(test)]
pub mod testutil;

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::runtime::Runtime;

use crate::error::BuildError;

pub use cmd::{Cmd, CommandRunner, SystemRunner};
pub use native::{Bundler, Cargo, Git, Linker, Make};
pub use ruby::{InterpreterBuild, PkgConfig, Ruby, RubyBuild, configure_options};

/// A command runner plus the async runtime the embedding step uses.
pub struct Toolchain {
  runner: Box<dyn CommandRunner>,
  runtime: Runtime,
}

impl Toolchain {
  /// Toolchain backed by real subprocesses.
  pub fn system() -> Result<Self, BuildError> {
    let runtime = Runtime::new()?;
    let runner = SystemRunner::new(runtime.handle().clone());
    Ok(Self {
      runner: Box::new(runner),
      runtime,
    })
  }

  /// Toolchain backed by a custom runner.
  pub fn with_runner(runner: impl CommandRunner + 'static) -> Result<Self, BuildError> {
    Ok(Self {
      runner: Box::new(runner),
      runtime: Runtime::new()?,
    })
  }

  pub fn run(&self, cmd: &Cmd) -> Result<String, BuildError> {
    self.runner.run(cmd)
  }

  pub fn locate(&self, program: &str) -> Option<PathBuf> {
    self.runner.locate(program)
  }

  /// Locate `program` or fail with `ToolchainMissing`.
  pub fn require_tool(&self, program: &str, hint: &str) -> Result<PathBuf, BuildError> {
    self.locate(program).ok_or_else(|| BuildError::ToolchainMissing {
      tool: program.to_string(),
      hint: hint.to_string(),
    })
  }

  /// Drive a future to completion on the toolchain's runtime.
  pub fn block_on<F: Future>(&self, future: F) -> F::Output {
    self.runtime.block_on(future)
  }

  pub fn ruby_build<'a>(&'a self, bin: &'a Path) -> RubyBuild<'a> {
    RubyBuild::new(self, bin)
  }

  pub fn ruby<'a>(&'a self, bin: &'a Path) -> Ruby<'a> {
    Ruby::new(self, bin)
  }

  pub fn pkg_config(&self) -> PkgConfig<'_> {
    PkgConfig::new(self)
  }

  pub fn bundler<'a>(&'a self, bin: &'a Path, work_dir: &'a Path) -> Bundler<'a> {
    Bundler::new(self, bin, work_dir)
  }

  pub fn cargo<'a>(&'a self, bin: &'a Path) -> Cargo<'a> {
    Cargo::new(self, bin)
  }

  pub fn make(&self) -> Make<'_> {
    Make::new(self)
  }

  pub fn git(&self) -> Result<Git<'_>, BuildError> {
    let bin = self.require_tool("git", "install git to fetch build tools")?;
    Ok(Git::new(self, bin))
  }

  pub fn linker(&self) -> Linker<'_> {
    Linker::new(self)
  }
}
