//! Interpreter-side adapters: the interpreter-build tool, the built
//! interpreter itself, and pkg-config queries against its descriptor.

use std::path::{Path, PathBuf};

use super::{Cmd, Toolchain};
use crate::consts::STATIC_EXTENSIONS;
use crate::error::BuildError;

/// Configure flags for a fully static interpreter with the standard
/// extensions compiled in.
pub fn configure_options(pc_name: &str) -> Vec<String> {
  vec![
    "--disable-install-doc".to_string(),
    "--disable-install-rdoc".to_string(),
    "--disable-install-capi".to_string(),
    "--with-static-linked-ext".to_string(),
    format!("--with-ruby-pc={}", pc_name),
    format!("--with-ext={}", STATIC_EXTENSIONS.join(",")),
    "--with-setup=Setup".to_string(),
    "--disable-shared".to_string(),
  ]
}

/// One interpreter build request.
#[derive(Debug, Clone)]
pub struct InterpreterBuild {
  pub version: String,
  pub prefix: PathBuf,
  /// Download cache for source tarballs.
  pub download_cache: PathBuf,
  /// Kept build tree; extension objects and `exts.mk` are read from it.
  pub build_path: PathBuf,
  pub tmp_dir: PathBuf,
  pub configure_options: Vec<String>,
}

pub struct RubyBuild<'a> {
  tools: &'a Toolchain,
  bin: &'a Path,
}

impl<'a> RubyBuild<'a> {
  pub(super) fn new(tools: &'a Toolchain, bin: &'a Path) -> Self {
    Self { tools, bin }
  }

  pub fn install(&self, build: &InterpreterBuild) -> Result<(), BuildError> {
    let cmd = Cmd::new(self.bin)
      .env("RUBY_CONFIGURE_OPTS", build.configure_options.join(" "))
      .env("RUBY_BUILD_CACHE_PATH", &build.download_cache)
      .env("RUBY_BUILD_BUILD_PATH", &build.build_path)
      .env("TMPDIR", &build.tmp_dir)
      .args(["--verbose", "--keep"])
      .arg(&build.version)
      .arg(&build.prefix);
    self.tools.run(&cmd)?;
    Ok(())
  }
}

pub struct Ruby<'a> {
  tools: &'a Toolchain,
  bin: &'a Path,
}

impl<'a> Ruby<'a> {
  pub(super) fn new(tools: &'a Toolchain, bin: &'a Path) -> Self {
    Self { tools, bin }
  }

  pub fn version(&self) -> Result<String, BuildError> {
    self.tools.run(&Cmd::new(self.bin).args(["-e", "print RUBY_VERSION"]))
  }

  /// The interpreter's load path, optionally after requiring `setup`.
  pub fn load_path(&self, setup: Option<&Path>) -> Result<Vec<PathBuf>, BuildError> {
    let mut cmd = Cmd::new(self.bin);
    if let Some(setup) = setup {
      cmd = cmd.arg("-r").arg(setup);
    }
    let out = self.tools.run(&cmd.args(["-e", "puts $:"]))?;
    Ok(
      out
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect(),
    )
  }

  /// Run `extconf.rb` in `dir`, producing its Makefile.
  pub fn extconf(&self, dir: &Path) -> Result<(), BuildError> {
    self.tools.run(&Cmd::new(self.bin).arg("extconf.rb").current_dir(dir))?;
    Ok(())
  }
}

pub struct PkgConfig<'a> {
  tools: &'a Toolchain,
}

impl<'a> PkgConfig<'a> {
  pub(super) fn new(tools: &'a Toolchain) -> Self {
    Self { tools }
  }

  pub fn cflags(&self, pc: &Path) -> Result<Vec<String>, BuildError> {
    self.query(pc, "--cflags")
  }

  pub fn variable(&self, pc: &Path, name: &str) -> Result<Vec<String>, BuildError> {
    self.query(pc, &format!("--variable={}", name))
  }

  fn query(&self, pc: &Path, option: &str) -> Result<Vec<String>, BuildError> {
    let out = self.tools.run(&Cmd::new("pkg-config").arg(option).arg(pc))?;
    Ok(out.split_whitespace().map(str::to_string).collect())
  }
}
