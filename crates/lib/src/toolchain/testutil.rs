//! Fake command runners for unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use super::{Cmd, CommandRunner};
use crate::error::BuildError;

/// Succeeds at everything and finds nothing.
pub struct NoopRunner;

impl CommandRunner for NoopRunner {
  fn run(&self, _cmd: &Cmd) -> Result<String, BuildError> {
    Ok(String::new())
  }

  fn locate(&self, _program: &str) -> Option<PathBuf> {
    None
  }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub program: String,
  pub args: Vec<String>,
  pub envs: Vec<(String, String)>,
  pub cwd: Option<PathBuf>,
}

impl RecordedCall {
  pub fn env(&self, key: &str) -> Option<String> {
    self.envs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
  }
}

/// Records every command and answers with canned stdout per program name.
#[derive(Default)]
pub struct ScriptedRunner {
  responses: HashMap<String, String>,
  failures: HashMap<String, String>,
  missing: Vec<String>,
  calls: Rc<RefCell<Vec<RecordedCall>>>,
}

impl ScriptedRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, program: &str, stdout: &str) -> Self {
    self.responses.insert(program.to_string(), stdout.to_string());
    self
  }

  pub fn fail(mut self, program: &str, stderr: &str) -> Self {
    self.failures.insert(program.to_string(), stderr.to_string());
    self
  }

  pub fn without(mut self, program: &str) -> Self {
    self.missing.push(program.to_string());
    self
  }

  pub fn calls(&self) -> Rc<RefCell<Vec<RecordedCall>>> {
    self.calls.clone()
  }
}

impl CommandRunner for ScriptedRunner {
  fn run(&self, cmd: &Cmd) -> Result<String, BuildError> {
    let program = cmd.program_name();
    self.calls.borrow_mut().push(RecordedCall {
      program: program.clone(),
      args: cmd.arg_strings(),
      envs: ["RUBY_CONFIGURE_OPTS", "RUBY_BUILD_BUILD_PATH", "BUNDLE_GEMFILE", "TMPDIR"]
        .iter()
        .filter_map(|key| {
          cmd
            .env_value(key)
            .map(|v| (key.to_string(), v.to_string_lossy().into_owned()))
        })
        .collect(),
      cwd: cmd.cwd().map(PathBuf::from),
    });

    if let Some(stderr) = self.failures.get(&program) {
      return Err(BuildError::CmdFailed {
        cmd: cmd.to_string(),
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.clone(),
      });
    }
    Ok(self.responses.get(&program).cloned().unwrap_or_default())
  }

  fn locate(&self, program: &str) -> Option<PathBuf> {
    if self.missing.iter().any(|m| m == program) {
      None
    } else {
      Some(PathBuf::from("/usr/bin").join(program))
    }
  }
}
