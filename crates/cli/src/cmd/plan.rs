//! Implementation of `kompo --dry-run`.

use anyhow::{Context, Result};

use kompo_lib::{BuildContext, BuildOptions, Packager};

use crate::output::{OutputFormat, print_info, print_json};

/// Print the tasks a build would run, in execution order.
pub fn cmd_plan(options: BuildOptions, format: OutputFormat) -> Result<()> {
  let packager = Packager::system().context("Failed to initialise toolchain")?;
  let ctx = BuildContext::new(options);
  let order = packager.plan(&ctx).context("Failed to plan build")?;

  if format.is_json() {
    return print_json(&order);
  }
  print_info(&format!("{} tasks would run:", order.len()));
  for (i, task) in order.iter().enumerate() {
    println!("  {:>2}. {}", i + 1, task);
  }
  Ok(())
}
