//! Scraping of toolchain-generated build files.
//!
//! Makefiles written by `extconf.rb` and the interpreter's `exts.mk` are read
//! as `field = value` lines. Only the fields the link step needs are
//! extracted. A missing file or field yields [`MetadataError`], which callers
//! log and treat as an empty contribution: plenty of extensions declare no
//! extra libraries at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("failed to read build metadata {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("field `{field}` missing from {}", path.display())]
  MissingField { path: PathBuf, field: &'static str },
}

/// `field = value` assignments, first occurrence wins.
#[derive(Debug, Default, Clone)]
pub struct Assignments {
  values: HashMap<String, String>,
}

impl Assignments {
  pub fn parse(text: &str) -> Self {
    let mut values = HashMap::new();
    let mut pending = String::new();

    for raw in text.lines() {
      if let Some(continued) = raw.strip_suffix('\\') {
        pending.push_str(continued);
        pending.push(' ');
        continue;
      }
      pending.push_str(raw);
      let line = std::mem::take(&mut pending);

      if line.starts_with(['\t', '#']) {
        continue;
      }
      let Some((name, value)) = line.split_once('=') else {
        continue;
      };
      // Skip `:=`, `+=`, `?=` and rule lines; only plain assignments count.
      let name = name.trim();
      if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        continue;
      }
      values
        .entry(name.to_string())
        .or_insert_with(|| value.trim().to_string());
    }

    Self { values }
  }

  pub fn read(path: &Path) -> Result<Self, MetadataError> {
    let text = std::fs::read_to_string(path).map_err(|source| MetadataError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self::parse(&text))
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  /// Whitespace-separated tokens of `name`; empty when absent.
  pub fn tokens(&self, name: &str) -> Vec<String> {
    self
      .get(name)
      .map(|v| v.split_whitespace().map(str::to_string).collect())
      .unwrap_or_default()
  }
}

/// What the link step needs from one native extension's Makefile.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtMetadata {
  /// Library search paths, `-L` prefix stripped.
  pub lib_paths: Vec<String>,
  /// Raw library tokens from `LIBS`.
  pub libs: Vec<String>,
  /// Install prefix below the extension root, without leading `/`.
  pub target_prefix: String,
  pub target_name: Option<String>,
  pub objects: Vec<String>,
}

impl ExtMetadata {
  pub fn from_assignments(vars: &Assignments) -> Self {
    let mut lib_paths = Vec::new();
    for field in ["ldflags", "LDFLAGS"] {
      for token in vars.tokens(field) {
        if let Some(path) = token.strip_prefix("-L")
          && !path.is_empty()
        {
          lib_paths.push(path.to_string());
        }
      }
    }
    lib_paths.extend(vars.tokens("libpath"));

    Self {
      lib_paths,
      libs: vars.tokens("LIBS"),
      target_prefix: vars
        .get("target_prefix")
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string(),
      target_name: vars.get("TARGET_NAME").filter(|n| !n.is_empty()).map(str::to_string),
      objects: vars.tokens("OBJS"),
    }
  }

  pub fn read(path: &Path) -> Result<Self, MetadataError> {
    Assignments::read(path).map(|vars| Self::from_assignments(&vars))
  }

  /// Like [`ExtMetadata::read`], but a failure degrades to empty metadata.
  pub fn read_or_empty(path: &Path) -> Self {
    Self::read(path).unwrap_or_else(|e| {
      warn!(error = %e, "ignoring unreadable extension metadata");
      Self::default()
    })
  }

  /// Feature path registered with the interpreter, e.g. `json/ext/parser.so`.
  pub fn feature(&self) -> Option<String> {
    let name = self.target_name.as_deref()?;
    let feature = if self.target_prefix.is_empty() {
      format!("{}.so", name)
    } else {
      format!("{}/{}.so", self.target_prefix, name)
    };
    Some(feature)
  }
}

/// Library tokens of `EXTLIBS` in an interpreter `exts.mk`.
pub fn read_extlibs(path: &Path) -> Result<Vec<String>, MetadataError> {
  let vars = Assignments::read(path)?;
  if vars.get("EXTLIBS").is_none() {
    return Err(MetadataError::MissingField {
      path: path.to_path_buf(),
      field: "EXTLIBS",
    });
  }
  Ok(vars.tokens("EXTLIBS"))
}
