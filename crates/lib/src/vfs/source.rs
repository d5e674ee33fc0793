//! Rendering of the tables as a C translation unit.

use std::io::{self, Write};
use std::path::Path;

use super::VfsTables;

/// Bytes per line in emitted array initializers.
const BYTES_PER_LINE: usize = 32;

/// Write `fs.c`: the tables plus the working directory and start file the
/// runtime companion reads at startup.
pub fn write_fs_source<W: Write>(tables: &VfsTables, wd: &Path, start_file: &Path, out: &mut W) -> io::Result<()> {
  writeln!(out, "/* Generated by kompo. Do not edit. */")?;
  writeln!(out)?;

  write_bytes(out, "PATHS", tables.paths())?;
  writeln!(out, "const int PATHS_SIZE = {};", tables.paths().len())?;
  writeln!(out)?;

  write_bytes(out, "FILES", tables.contents())?;
  writeln!(out, "const int FILES_SIZE = {};", tables.contents().len())?;
  writeln!(out)?;

  write!(out, "const unsigned long long FILES_SIZES[] = {{")?;
  for (i, offset) in tables.offsets().iter().enumerate() {
    if i % BYTES_PER_LINE == 0 {
      write!(out, "\n  ")?;
    }
    write!(out, "{},", offset)?;
  }
  writeln!(out, "\n}};")?;
  writeln!(out)?;

  write_bytes(out, "WD", &nul_terminated(wd))?;
  write_bytes(out, "START_FILE_PATH", &nul_terminated(start_file))?;
  Ok(())
}

fn nul_terminated(path: &Path) -> Vec<u8> {
  let mut bytes = path.as_os_str().as_encoded_bytes().to_vec();
  bytes.push(0);
  bytes
}

fn write_bytes<W: Write>(out: &mut W, name: &str, bytes: &[u8]) -> io::Result<()> {
  write!(out, "const char {}[] = {{", name)?;
  if bytes.is_empty() {
    // Zero-length arrays are not valid C.
    write!(out, "0")?;
  }
  for chunk in bytes.chunks(BYTES_PER_LINE) {
    write!(out, "\n  ")?;
    for byte in chunk {
      write!(out, "{},", byte)?;
    }
  }
  writeln!(out, "\n}};")
}
