//! Fatal build errors.
//!
//! Every variant here aborts the task graph traversal. Malformed build
//! metadata is not an error at this level; see [`crate::metadata::MetadataError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;
use crate::util::hash::HashError;
use crate::vfs::VfsError;

#[derive(Debug, Error)]
pub enum BuildError {
  /// A required external tool is absent and cannot be installed here.
  #[error("required tool `{tool}` not found: {hint}")]
  ToolchainMissing { tool: String, hint: String },

  /// An external command exited non-zero. Output is kept verbatim.
  #[error("command failed with exit code {code:?}: {cmd}{}", format_output(.stdout, .stderr))]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  /// A file selected for embedding could not be read.
  #[error("failed to read {}: {source}", path.display())]
  UnreadableFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A project input (entrypoint, extra file) does not exist.
  #[error("input not found: {}", path.display())]
  MissingInput { path: PathBuf },

  /// A context field was read before the task that owns it ran.
  #[error("context field `{0}` read before it was defined")]
  MissingField(&'static str),

  #[error("unknown task: {0}")]
  UnknownTask(TaskId),

  #[error("task {task} depends on unregistered task {dependency}")]
  MissingDependency { task: TaskId, dependency: TaskId },

  #[error("dependency cycle detected")]
  CycleDetected,

  #[error("cannot determine a cache directory; set KOMPO_CACHE_DIR or HOME")]
  NoCacheDir,

  #[error("failed to write cache marker: {0}")]
  Marker(#[from] serde_json::Error),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Vfs(VfsError),

  #[error("async runtime error: {0}")]
  Runtime(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn format_output(stdout: &str, stderr: &str) -> String {
  let mut out = String::new();
  if !stdout.is_empty() {
    out.push_str("\n--- stdout ---\n");
    out.push_str(stdout);
  }
  if !stderr.is_empty() {
    out.push_str("\n--- stderr ---\n");
    out.push_str(stderr);
  }
  out
}
