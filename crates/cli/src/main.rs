mod cmd;
mod output;

use std::path::PathBuf;

use clap::Parser;
use kompo_lib::{BuildMode, BuildOptions};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// kompo - pack a Ruby application into a single executable
#[derive(Parser)]
#[command(name = "kompo")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Extra files and directories to embed, relative to the project root
  files: Vec<PathBuf>,

  /// Entry script (default: main.rb)
  #[arg(short, long)]
  entrypoint: Option<PathBuf>,

  /// Dependency group to install
  #[arg(short = 'g', long)]
  use_group: Option<String>,

  /// Install dependencies from the project's Gemfile
  #[arg(long, overrides_with = "no_gemfile")]
  gemfile: bool,

  /// Ignore the project's Gemfile
  #[arg(long, overrides_with = "gemfile")]
  no_gemfile: bool,

  /// Build the runtime filesystem library from a local checkout
  #[arg(long)]
  local_kompo_fs_dir: Option<PathBuf>,

  /// Directory the executable is written to (default: project root)
  #[arg(long)]
  dest_dir: Option<PathBuf>,

  /// Use an existing standalone dependency install
  #[arg(long)]
  bundle_cache: Option<PathBuf>,

  /// Interpreter version to build (default: the host ruby's version)
  #[arg(long)]
  ruby_version: Option<String>,

  /// Rebuild the interpreter and dependencies even when cached
  #[arg(long, overrides_with = "repack")]
  rebuild: bool,

  /// Reuse cached interpreter and dependency builds (default)
  #[arg(long, overrides_with = "rebuild")]
  repack: bool,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,

  /// Show the tasks that would run without running them
  #[arg(long)]
  dry_run: bool,

  /// Leave the work directory in place
  #[arg(long)]
  keep_work_dir: bool,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,
}

impl Cli {
  fn gemfile(&self) -> Option<bool> {
    match (self.gemfile, self.no_gemfile) {
      (true, _) => Some(true),
      (_, true) => Some(false),
      _ => None,
    }
  }

  fn build_options(self) -> BuildOptions {
    let mode = if self.rebuild { BuildMode::Rebuild } else { BuildMode::Repack };
    BuildOptions {
      project_dir: None,
      gemfile: self.gemfile(),
      entrypoint: self.entrypoint,
      files: self.files,
      dest_dir: self.dest_dir,
      use_group: self.use_group,
      bundle_cache: self.bundle_cache,
      ruby_version: self.ruby_version,
      mode,
      local_runtime_dir: self.local_kompo_fs_dir,
      keep_work_dir: self.keep_work_dir,
    }
  }
}

fn init_logging(verbose: bool) {
  let default = if verbose { "kompo=debug" } else { "kompo=info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let format = cli.output;
  let dry_run = cli.dry_run;
  let options = cli.build_options();

  let result = if dry_run {
    cmd::cmd_plan(options, format)
  } else {
    cmd::cmd_build(options, format)
  };

  if let Err(err) = result {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_is_well_formed() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
  }

  #[test]
  fn last_gemfile_flag_wins() {
    let cli = Cli::parse_from(["kompo", "--gemfile", "--no-gemfile"]);
    assert_eq!(cli.gemfile(), Some(false));

    let cli = Cli::parse_from(["kompo", "--no-gemfile", "--gemfile"]);
    assert_eq!(cli.gemfile(), Some(true));

    let cli = Cli::parse_from(["kompo"]);
    assert_eq!(cli.gemfile(), None);
  }

  #[test]
  fn options_are_mapped() {
    let cli = Cli::parse_from([
      "kompo",
      "-e",
      "app.rb",
      "--rebuild",
      "--ruby-version",
      "3.4.1",
      "--local-kompo-fs-dir",
      "../kompo-vfs",
      "lib",
      "config",
    ]);

    let options = cli.build_options();

    assert_eq!(options.entrypoint, Some(PathBuf::from("app.rb")));
    assert_eq!(options.mode, BuildMode::Rebuild);
    assert_eq!(options.ruby_version.as_deref(), Some("3.4.1"));
    assert_eq!(options.local_runtime_dir, Some(PathBuf::from("../kompo-vfs")));
    assert_eq!(options.files, vec![PathBuf::from("lib"), PathBuf::from("config")]);
  }
}
