//! Implementation of the default `kompo` command.
//!
//! Runs the whole packaging pipeline for the project in the current
//! directory. A failed build is torn down before the error is returned.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use kompo_lib::{BuildContext, BuildOptions, BuildSummary, Packager};

use crate::output::{OutputFormat, format_bytes, format_duration, print_json, print_stat, print_success};

#[derive(Serialize)]
struct BuildReport {
  #[serde(flatten)]
  summary: BuildSummary,
  duration_ms: u128,
}

pub fn cmd_build(options: BuildOptions, format: OutputFormat) -> Result<()> {
  let started = Instant::now();
  let packager = Packager::system().context("Failed to initialise toolchain")?;
  let mut ctx = BuildContext::new(options);

  let summary = match packager.run(&mut ctx) {
    Ok(summary) => summary,
    Err(err) => {
      if let Err(clean_err) = packager.teardown(&mut ctx) {
        warn!(error = %clean_err, "teardown after failed build did not complete");
      }
      return Err(err).context("Build failed");
    }
  };
  packager.finish(&ctx).context("Failed to remove work directory")?;

  let elapsed = started.elapsed();
  if format.is_json() {
    return print_json(&BuildReport {
      summary,
      duration_ms: elapsed.as_millis(),
    });
  }
  print_summary(&summary, elapsed);
  Ok(())
}

fn print_summary(summary: &BuildSummary, elapsed: Duration) {
  print_success(&format!("Built {}", summary.output.display()));
  print_stat("Size", &format_bytes(summary.size_bytes));
  print_stat("Ruby", &summary.ruby_version);
  print_stat(
    "Embedded",
    &format!(
      "{} files ({})",
      summary.embedded_files,
      format_bytes(summary.embedded_bytes)
    ),
  );
  print_stat("Native extensions", &summary.native_exts.to_string());
  if summary.interpreter_cached {
    print_stat("Interpreter", "cached");
  }
  if summary.bundle_cached {
    print_stat("Dependencies", "cached");
  }
  print_stat("Duration", &format_duration(elapsed));
}
