//! Entry point that drives the pipeline for one project.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::{BuildContext, require};
use crate::error::BuildError;
use crate::task::{TaskGraph, TaskId};
use crate::tasks::{PACKING, registry};
use crate::toolchain::Toolchain;
use crate::util::fs::remove_path;

/// What a successful build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
  pub output: PathBuf,
  pub size_bytes: u64,
  pub ruby_version: String,
  pub interpreter_cached: bool,
  pub bundle_cached: bool,
  pub native_exts: usize,
  pub embedded_files: usize,
  pub embedded_bytes: u64,
  pub tasks: Vec<TaskId>,
}

pub struct Packager {
  graph: TaskGraph,
  tools: Toolchain,
}

impl Packager {
  pub fn new(tools: Toolchain) -> Self {
    Self {
      graph: registry(),
      tools,
    }
  }

  /// Packager backed by real subprocesses.
  pub fn system() -> Result<Self, BuildError> {
    Ok(Self::new(Toolchain::system()?))
  }

  /// Tasks that would run, in order, without running any of them.
  pub fn plan(&self, ctx: &BuildContext) -> Result<Vec<TaskId>, BuildError> {
    self.graph.plan(PACKING, ctx)
  }

  /// Build the executable.
  ///
  /// On failure the context keeps every task resolved so far; call
  /// [`Packager::teardown`] to undo them.
  pub fn run(&self, ctx: &mut BuildContext) -> Result<BuildSummary, BuildError> {
    self.graph.execute(PACKING, ctx, &self.tools)?;

    let output = require(&ctx.output, "output")?.clone();
    let size_bytes = match std::fs::metadata(&output) {
      Ok(meta) => meta.len(),
      Err(_) => return Err(BuildError::MissingInput { path: output }),
    };
    let stats = ctx.vfs_stats.unwrap_or_default();
    let summary = BuildSummary {
      size_bytes,
      ruby_version: require(&ctx.ruby_version, "ruby_version")?.clone(),
      interpreter_cached: ctx.interpreter_cached.unwrap_or(false),
      bundle_cached: ctx.bundle_cached.unwrap_or(false),
      native_exts: ctx.native_exts.as_ref().map_or(0, Vec::len),
      embedded_files: stats.file_count,
      embedded_bytes: stats.content_bytes,
      tasks: ctx.resolved().to_vec(),
      output,
    };
    info!(output = ?summary.output, bytes = summary.size_bytes, "build complete");
    Ok(summary)
  }

  /// Undo every resolved task, newest first.
  pub fn teardown(&self, ctx: &mut BuildContext) -> Result<(), BuildError> {
    debug!(resolved = ctx.resolved().len(), "tearing down");
    self.graph.clean_resolved(ctx, &self.tools)
  }

  /// Remove the work directory after a successful build.
  pub fn finish(&self, ctx: &BuildContext) -> Result<(), BuildError> {
    match &ctx.work_dir {
      Some(dir) if ctx.options.keep_work_dir => {
        warn!(path = ?dir, "keeping work directory");
        Ok(())
      }
      Some(dir) => Ok(remove_path(dir)?),
      None => Ok(()),
    }
  }
}
