//! External command description and execution.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::BuildError;

/// An external command: program, arguments, extra environment, working dir.
#[derive(Debug, Clone)]
pub struct Cmd {
  program: OsString,
  args: Vec<OsString>,
  env: Vec<(String, OsString)>,
  cwd: Option<PathBuf>,
}

impl Cmd {
  pub fn new(program: impl AsRef<OsStr>) -> Self {
    Self {
      program: program.as_ref().to_os_string(),
      args: Vec::new(),
      env: Vec::new(),
      cwd: None,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn env(mut self, key: &str, value: impl AsRef<OsStr>) -> Self {
    self.env.push((key.to_string(), value.as_ref().to_os_string()));
    self
  }

  pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }

  pub fn program(&self) -> &OsStr {
    &self.program
  }

  /// Final path component of the program, e.g. `gcc` for `/usr/bin/gcc`.
  pub fn program_name(&self) -> String {
    Path::new(&self.program)
      .file_name()
      .unwrap_or(&self.program)
      .to_string_lossy()
      .into_owned()
  }

  pub fn arg_strings(&self) -> Vec<String> {
    self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
  }

  pub fn env_value(&self, key: &str) -> Option<&OsStr> {
    self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_os_str())
  }

  pub fn cwd(&self) -> Option<&Path> {
    self.cwd.as_deref()
  }
}

impl std::fmt::Display for Cmd {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for (key, value) in &self.env {
      write!(f, "{}='{}' ", key, value.to_string_lossy())?;
    }
    write!(f, "{}", self.program.to_string_lossy())?;
    for arg in &self.args {
      write!(f, " {}", arg.to_string_lossy())?;
    }
    Ok(())
  }
}

/// The seam between build tasks and the real toolchain.
pub trait CommandRunner {
  /// Run `cmd` to completion and return its trimmed stdout.
  ///
  /// A non-zero exit is `BuildError::CmdFailed` with the captured output.
  fn run(&self, cmd: &Cmd) -> Result<String, BuildError>;

  /// Find `program` on the search path.
  fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Runs commands as real subprocesses, one at a time.
pub struct SystemRunner {
  handle: Handle,
}

impl SystemRunner {
  pub fn new(handle: Handle) -> Self {
    Self { handle }
  }
}

impl CommandRunner for SystemRunner {
  fn run(&self, cmd: &Cmd) -> Result<String, BuildError> {
    info!(cmd = %cmd, "executing command");

    let mut command = Command::new(&cmd.program);
    command
      .args(&cmd.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    for (key, value) in &cmd.env {
      command.env(key, value);
    }
    if let Some(cwd) = &cmd.cwd {
      command.current_dir(cwd);
    }

    debug!(program = %cmd.program_name(), working_dir = ?cmd.cwd, "spawning process");

    let output = self.handle.block_on(command.output()).map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        BuildError::ToolchainMissing {
          tool: cmd.program_name(),
          hint: "not found on PATH".to_string(),
        }
      } else {
        BuildError::Io(e)
      }
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
      return Err(BuildError::CmdFailed {
        cmd: cmd.to_string(),
        code: output.status.code(),
        stdout,
        stderr,
      });
    }

    if !stderr.trim().is_empty() {
      debug!(stderr = %stderr.trim(), "command stderr");
    }
    let stdout = stdout.trim().to_string();
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command output");
    }

    Ok(stdout)
  }

  fn locate(&self, program: &str) -> Option<PathBuf> {
    which::which(program).ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn runner() -> (tokio::runtime::Runtime, SystemRunner) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let runner = SystemRunner::new(rt.handle().clone());
    (rt, runner)
  }

  #[test]
  fn display_includes_env_and_args() {
    let cmd = Cmd::new("/usr/bin/ruby-build")
      .env("TMPDIR", "/tmp/work")
      .arg("--verbose")
      .arg("3.4.1");

    assert_eq!(cmd.to_string(), "TMPDIR='/tmp/work' /usr/bin/ruby-build --verbose 3.4.1");
    assert_eq!(cmd.program_name(), "ruby-build");
  }

  #[test]
  #[cfg(unix)]
  fn run_returns_trimmed_stdout() {
    let (_rt, runner) = runner();

    let out = runner.run(&Cmd::new("/bin/echo").arg("hello")).unwrap();

    assert_eq!(out, "hello");
  }

  #[test]
  #[cfg(unix)]
  fn run_passes_env_and_cwd() {
    let (_rt, runner) = runner();
    let temp = TempDir::new().unwrap();

    let cmd = Cmd::new("/bin/sh")
      .args(["-c", "echo \"$GREETING\" > marker"])
      .env("GREETING", "hi")
      .current_dir(temp.path());
    runner.run(&cmd).unwrap();

    let written = std::fs::read_to_string(temp.path().join("marker")).unwrap();
    assert_eq!(written.trim(), "hi");
  }

  #[test]
  #[cfg(unix)]
  fn non_zero_exit_keeps_output() {
    let (_rt, runner) = runner();

    let err = runner
      .run(&Cmd::new("/bin/sh").args(["-c", "echo out; echo boom >&2; exit 3"]))
      .unwrap_err();

    match err {
      BuildError::CmdFailed {
        code, stdout, stderr, ..
      } => {
        assert_eq!(code, Some(3));
        assert_eq!(stdout.trim(), "out");
        assert_eq!(stderr.trim(), "boom");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn missing_program_is_toolchain_missing() {
    let (_rt, runner) = runner();

    let err = runner.run(&Cmd::new("kompo-definitely-not-a-tool")).unwrap_err();

    assert!(matches!(err, BuildError::ToolchainMissing { ref tool, .. } if tool == "kompo-definitely-not-a-tool"));
  }
}
