//! Build tasks and the graph that schedules them.
//!
//! A task is a named build step with declared dependencies and three
//! lifecycle phases:
//! - `define`: compute the context fields this task owns
//! - `execute`: perform side effects (run tools, write files)
//! - `clean`: tear down what `execute` produced
//!
//! Tasks are registered by [`TaskId`] in a [`TaskGraph`], which runs each one
//! at most once per context and tears them down in reverse order.

mod graph;

pub use graph::TaskGraph;

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::toolchain::Toolchain;

/// Identifier a task is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub &'static str);

impl std::fmt::Display for TaskId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.0)
  }
}

impl serde::Serialize for TaskId {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.0)
  }
}

pub trait Task {
  fn id(&self) -> TaskId;

  /// Tasks that must be resolved before this one, in visitation order.
  fn dependencies(&self) -> Vec<TaskId>;

  fn define(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    Ok(())
  }

  fn execute(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    Ok(())
  }

  fn clean(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
    Ok(())
  }
}

/// Composite node requiring two tasks with no order imposed between them.
///
/// Both sides are required inputs; this is not a choice between them.
pub struct Union {
  id: TaskId,
  left: TaskId,
  right: TaskId,
}

impl Union {
  pub fn new(id: TaskId, left: TaskId, right: TaskId) -> Self {
    Self { id, left, right }
  }
}

impl Task for Union {
  fn id(&self) -> TaskId {
    self.id
  }

  fn dependencies(&self) -> Vec<TaskId> {
    vec![self.left, self.right]
  }
}
