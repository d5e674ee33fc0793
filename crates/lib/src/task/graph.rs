//! Dependency-ordered, memoized task execution.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use super::{Task, TaskId, Union};
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::toolchain::Toolchain;

/// Registry of tasks keyed by id.
///
/// Resolution state lives in the [`BuildContext`], not here, so one graph
/// can drive any number of independent builds.
#[derive(Default)]
pub struct TaskGraph {
  tasks: HashMap<TaskId, Box<dyn Task>>,
}

impl TaskGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a task, replacing any task with the same id.
  pub fn register(&mut self, task: impl Task + 'static) -> TaskId {
    let id = task.id();
    self.tasks.insert(id, Box::new(task));
    id
  }

  /// Register a composite node that requires both `left` and `right`.
  pub fn union(&mut self, id: TaskId, left: TaskId, right: TaskId) -> TaskId {
    self.register(Union::new(id, left, right))
  }

  pub fn contains(&self, id: TaskId) -> bool {
    self.tasks.contains_key(&id)
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Check that every dependency is registered and the graph is acyclic.
  pub fn validate(&self) -> Result<(), BuildError> {
    let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
    let mut nodes: HashMap<TaskId, NodeIndex> = HashMap::new();

    for &id in self.tasks.keys() {
      nodes.insert(id, graph.add_node(id));
    }

    for (&id, task) in &self.tasks {
      for dependency in task.dependencies() {
        let Some(&dep_idx) = nodes.get(&dependency) else {
          return Err(BuildError::MissingDependency { task: id, dependency });
        };
        // Edge from dependency to dependent
        graph.add_edge(dep_idx, nodes[&id], ());
      }
    }

    toposort(&graph, None).map_err(|_| BuildError::CycleDetected)?;
    Ok(())
  }

  /// Tasks `execute(id)` would run against `ctx`, in run order.
  pub fn plan(&self, id: TaskId, ctx: &BuildContext) -> Result<Vec<TaskId>, BuildError> {
    self.validate()?;

    let mut seen: HashSet<TaskId> = ctx.resolved().iter().copied().collect();
    let mut order = Vec::new();
    self.plan_inner(id, &mut seen, &mut order)?;
    Ok(order)
  }

  fn plan_inner(&self, id: TaskId, seen: &mut HashSet<TaskId>, order: &mut Vec<TaskId>) -> Result<(), BuildError> {
    if seen.contains(&id) {
      return Ok(());
    }
    let task = self.get(id)?;
    for dependency in task.dependencies() {
      self.plan_inner(dependency, seen, order)?;
    }
    seen.insert(id);
    order.push(id);
    Ok(())
  }

  /// Resolve `id` and everything it depends on.
  ///
  /// Already-resolved tasks are skipped, so shared dependencies run once.
  /// The first failure aborts the traversal; tasks resolved so far stay
  /// resolved and can be torn down with [`TaskGraph::clean_resolved`].
  pub fn execute(&self, id: TaskId, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    self.validate()?;
    self.execute_inner(id, ctx, tools)
  }

  fn execute_inner(&self, id: TaskId, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    if ctx.is_resolved(id) {
      return Ok(());
    }

    let task = self.get(id)?;
    for dependency in task.dependencies() {
      self.execute_inner(dependency, ctx, tools)?;
    }

    info!(task = %id, "running task");
    task.define(ctx, tools)?;
    task.execute(ctx, tools)?;
    ctx.mark_resolved(id);
    debug!(task = %id, "task resolved");

    Ok(())
  }

  /// Tear down `id`, then its dependencies in reverse declaration order.
  ///
  /// A task that is not resolved in `ctx` is left alone.
  pub fn clean(&self, id: TaskId, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    if !ctx.is_resolved(id) {
      return Ok(());
    }

    let task = self.get(id)?;
    debug!(task = %id, "cleaning task");
    task.clean(ctx, tools)?;

    for dependency in task.dependencies().into_iter().rev() {
      self.clean(dependency, ctx, tools)?;
    }

    ctx.mark_unresolved(id);
    Ok(())
  }

  /// Tear down every resolved task, most recently resolved first.
  pub fn clean_resolved(&self, ctx: &mut BuildContext, tools: &Toolchain) -> Result<(), BuildError> {
    let resolved: Vec<TaskId> = ctx.resolved().to_vec();
    for id in resolved.into_iter().rev() {
      if self.contains(id) {
        self.clean(id, ctx, tools)?;
      }
    }
    Ok(())
  }

  fn get(&self, id: TaskId) -> Result<&dyn Task, BuildError> {
    self
      .tasks
      .get(&id)
      .map(|task| task.as_ref())
      .ok_or(BuildError::UnknownTask(id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  use crate::toolchain::testutil::NoopRunner;

  type Log = Rc<RefCell<Vec<String>>>;

  struct Recording {
    id: &'static str,
    deps: Vec<&'static str>,
    log: Log,
    fail: bool,
  }

  impl Recording {
    fn new(id: &'static str, deps: &[&'static str], log: &Log) -> Self {
      Self {
        id,
        deps: deps.to_vec(),
        log: log.clone(),
        fail: false,
      }
    }

    fn failing(mut self) -> Self {
      self.fail = true;
      self
    }
  }

  impl Task for Recording {
    fn id(&self) -> TaskId {
      TaskId(self.id)
    }

    fn dependencies(&self) -> Vec<TaskId> {
      self.deps.iter().map(|d| TaskId(*d)).collect()
    }

    fn define(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
      self.log.borrow_mut().push(format!("define:{}", self.id));
      Ok(())
    }

    fn execute(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
      self.log.borrow_mut().push(format!("exec:{}", self.id));
      if self.fail {
        return Err(BuildError::CmdFailed {
          cmd: self.id.to_string(),
          code: Some(1),
          stdout: String::new(),
          stderr: String::new(),
        });
      }
      Ok(())
    }

    fn clean(&self, _ctx: &mut BuildContext, _tools: &Toolchain) -> Result<(), BuildError> {
      self.log.borrow_mut().push(format!("clean:{}", self.id));
      Ok(())
    }
  }

  fn tools() -> Toolchain {
    Toolchain::with_runner(NoopRunner).unwrap()
  }

  /// top -> [left, right], left -> [base], right -> [base]
  fn diamond(log: &Log) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("base", &[], log));
    graph.register(Recording::new("left", &["base"], log));
    graph.register(Recording::new("right", &["base"], log));
    graph.register(Recording::new("top", &["left", "right"], log));
    graph
  }

  fn execs(log: &Log) -> Vec<String> {
    log
      .borrow()
      .iter()
      .filter(|entry| entry.starts_with("exec:"))
      .cloned()
      .collect()
  }

  #[test]
  fn shared_dependency_runs_once_and_first() {
    let log = Log::default();
    let graph = diamond(&log);
    let mut ctx = BuildContext::default();

    graph.execute(TaskId("top"), &mut ctx, &tools()).unwrap();

    assert_eq!(execs(&log), vec!["exec:base", "exec:left", "exec:right", "exec:top"]);
    assert_eq!(ctx.resolved().len(), 4);
  }

  #[test]
  fn define_runs_before_execute() {
    let log = Log::default();
    let graph = diamond(&log);
    let mut ctx = BuildContext::default();

    graph.execute(TaskId("base"), &mut ctx, &tools()).unwrap();

    assert_eq!(*log.borrow(), vec!["define:base", "exec:base"]);
  }

  #[test]
  fn resolved_task_is_a_no_op() {
    let log = Log::default();
    let graph = diamond(&log);
    let mut ctx = BuildContext::default();
    let tools = tools();

    graph.execute(TaskId("top"), &mut ctx, &tools).unwrap();
    log.borrow_mut().clear();
    graph.execute(TaskId("top"), &mut ctx, &tools).unwrap();
    graph.execute(TaskId("left"), &mut ctx, &tools).unwrap();

    assert!(log.borrow().is_empty());
  }

  #[test]
  fn clean_reverses_dependency_order() {
    let log = Log::default();
    let graph = diamond(&log);
    let mut ctx = BuildContext::default();
    let tools = tools();

    graph.execute(TaskId("top"), &mut ctx, &tools).unwrap();
    log.borrow_mut().clear();
    graph.clean(TaskId("top"), &mut ctx, &tools).unwrap();

    assert_eq!(*log.borrow(), vec!["clean:top", "clean:right", "clean:base", "clean:left"]);
    assert!(ctx.resolved().is_empty());
  }

  #[test]
  fn clean_skips_unresolved_tasks() {
    let log = Log::default();
    let graph = diamond(&log);
    let mut ctx = BuildContext::default();
    let tools = tools();

    graph.clean(TaskId("top"), &mut ctx, &tools).unwrap();
    assert!(log.borrow().is_empty());

    graph.execute(TaskId("left"), &mut ctx, &tools).unwrap();
    log.borrow_mut().clear();
    graph.clean(TaskId("top"), &mut ctx, &tools).unwrap();
    assert!(log.borrow().is_empty());
  }

  #[test]
  fn failure_stops_traversal() {
    let log = Log::default();
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("a", &[], &log));
    graph.register(Recording::new("b", &["a"], &log).failing());
    graph.register(Recording::new("c", &["a"], &log));
    graph.register(Recording::new("top", &["b", "c"], &log));
    let mut ctx = BuildContext::default();

    let err = graph.execute(TaskId("top"), &mut ctx, &tools()).unwrap_err();

    assert!(matches!(err, BuildError::CmdFailed { .. }));
    assert_eq!(execs(&log), vec!["exec:a", "exec:b"]);
    assert_eq!(ctx.resolved(), &[TaskId("a")]);
  }

  #[test]
  fn clean_resolved_tears_down_partial_build() {
    let log = Log::default();
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("a", &[], &log));
    graph.register(Recording::new("b", &["a"], &log));
    graph.register(Recording::new("c", &["b"], &log).failing());
    let mut ctx = BuildContext::default();
    let tools = tools();

    assert!(graph.execute(TaskId("c"), &mut ctx, &tools).is_err());
    log.borrow_mut().clear();
    graph.clean_resolved(&mut ctx, &tools).unwrap();

    assert_eq!(*log.borrow(), vec!["clean:b", "clean:a"]);
    assert!(ctx.resolved().is_empty());
  }

  #[test]
  fn union_requires_both_sides() {
    let log = Log::default();
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("gemfile", &[], &log));
    graph.register(Recording::new("sources", &[], &log));
    graph.union(TaskId("staged"), TaskId("gemfile"), TaskId("sources"));
    let mut ctx = BuildContext::default();

    graph.execute(TaskId("staged"), &mut ctx, &tools()).unwrap();

    assert_eq!(execs(&log), vec!["exec:gemfile", "exec:sources"]);
    assert!(ctx.is_resolved(TaskId("staged")));
  }

  #[test]
  fn plan_matches_execution_order() {
    let log = Log::default();
    let graph = diamond(&log);
    let ctx = BuildContext::default();

    let plan = graph.plan(TaskId("top"), &ctx).unwrap();

    assert_eq!(plan, vec![TaskId("base"), TaskId("left"), TaskId("right"), TaskId("top")]);
    assert!(log.borrow().is_empty());
  }

  #[test]
  fn missing_dependency_is_rejected() {
    let log = Log::default();
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("a", &["ghost"], &log));
    let mut ctx = BuildContext::default();

    let err = graph.execute(TaskId("a"), &mut ctx, &tools()).unwrap_err();

    assert!(matches!(
      err,
      BuildError::MissingDependency {
        task: TaskId("a"),
        dependency: TaskId("ghost")
      }
    ));
  }

  #[test]
  fn cycle_is_rejected() {
    let log = Log::default();
    let mut graph = TaskGraph::new();
    graph.register(Recording::new("a", &["b"], &log));
    graph.register(Recording::new("b", &["a"], &log));

    assert!(matches!(graph.validate(), Err(BuildError::CycleDetected)));
  }

  #[test]
  fn unknown_task_is_rejected() {
    let graph = TaskGraph::new();
    let mut ctx = BuildContext::default();

    let err = graph.execute(TaskId("nope"), &mut ctx, &tools()).unwrap_err();
    assert!(matches!(err, BuildError::UnknownTask(TaskId("nope"))));
  }
}
