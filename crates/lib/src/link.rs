//! Link planning.
//!
//! Library requirements scraped from the interpreter and every native
//! extension are merged into one ordered-unique [`LibrarySet`], partitioned
//! by the fixed dynamic allow-list, and laid out as a single compiler
//! invocation. Planning is pure: [`LinkPlan::new`] never touches the
//! filesystem, so the ordering rules are testable without a toolchain.

use std::path::PathBuf;

use serde::Serialize;

use crate::consts::{DYNAMIC_LIBS, RUBY_STATIC_LIB, RUNTIME_LIBS};

/// Ordered-unique library names; the first occurrence keeps its position.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LibrarySet {
  names: Vec<String>,
}

impl LibrarySet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Normalise a raw token to a library name.
  ///
  /// `-lfoo`, `libfoo.a` and `/some/dir/libfoo.a` all become `foo`. Anything
  /// else (search paths, linker options, object files) is not a library.
  pub fn normalise(token: &str) -> Option<&str> {
    if let Some(name) = token.strip_prefix("-l") {
      return (!name.is_empty()).then_some(name);
    }
    let file = token.rsplit('/').next().unwrap_or(token);
    file
      .strip_prefix("lib")
      .and_then(|rest| rest.strip_suffix(".a"))
      .filter(|name| !name.is_empty())
  }

  pub fn insert(&mut self, name: &str) -> bool {
    if self.contains(name) {
      return false;
    }
    self.names.push(name.to_string());
    true
  }

  /// Merge raw tokens in order, skipping anything that is not a library.
  pub fn extend_tokens<I, S>(&mut self, tokens: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    for token in tokens {
      if let Some(name) = Self::normalise(token.as_ref()) {
        self.insert(name);
      }
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    self.names.iter().any(|n| n == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// Split into (static, dynamic). The dynamic group always carries the
  /// whole allow-list: requested names first, then the rest in allow-list
  /// order.
  pub fn partition(&self) -> (LibrarySet, LibrarySet) {
    let mut static_libs = LibrarySet::new();
    let mut dynamic_libs = LibrarySet::new();
    for name in self.iter() {
      if DYNAMIC_LIBS.contains(&name) {
        dynamic_libs.insert(name);
      } else {
        static_libs.insert(name);
      }
    }
    for name in DYNAMIC_LIBS {
      dynamic_libs.insert(name);
    }
    (static_libs, dynamic_libs)
  }
}

impl<S: AsRef<str>> FromIterator<S> for LibrarySet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut set = LibrarySet::new();
    set.extend_tokens(iter);
    set
  }
}

/// Everything the final link consumes, gathered from the context.
#[derive(Debug, Default, Clone)]
pub struct LinkInputs {
  /// Interpreter `MAINLIBS`.
  pub main_libs: Vec<String>,
  /// `EXTLIBS` of the statically built standard extensions.
  pub builtin_ext_libs: Vec<String>,
  /// `LIBS` of every native extension, one entry per extension.
  pub native_ext_libs: Vec<Vec<String>>,
  /// Library search directories, interpreter and runtime first.
  pub search_paths: Vec<String>,
  /// Object files and static archives linked in whole.
  pub objects: Vec<PathBuf>,
  /// Generated sources compiled into the executable.
  pub sources: Vec<PathBuf>,
  /// Compiler flags, e.g. the interpreter include directories.
  pub cflags: Vec<String>,
  pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkPlan {
  pub static_libs: LibrarySet,
  pub dynamic_libs: LibrarySet,
  search_paths: Vec<String>,
  objects: Vec<PathBuf>,
  sources: Vec<PathBuf>,
  cflags: Vec<String>,
  output: PathBuf,
}

impl LinkPlan {
  pub fn new(inputs: LinkInputs) -> Self {
    let mut merged = LibrarySet::new();
    merged.extend_tokens(&inputs.main_libs);
    merged.extend_tokens(&inputs.builtin_ext_libs);
    for libs in &inputs.native_ext_libs {
      merged.extend_tokens(libs);
    }
    // Linked explicitly at fixed positions.
    merged
      .names
      .retain(|n| n.as_str() != RUBY_STATIC_LIB && !RUNTIME_LIBS.contains(&n.as_str()));

    let (static_libs, dynamic_libs) = merged.partition();

    let mut search_paths: Vec<String> = Vec::new();
    for path in inputs.search_paths {
      if !search_paths.contains(&path) {
        search_paths.push(path);
      }
    }

    Self {
      static_libs,
      dynamic_libs,
      search_paths,
      objects: inputs.objects,
      sources: inputs.sources,
      cflags: inputs.cflags,
      output: inputs.output,
    }
  }

  pub fn output(&self) -> &PathBuf {
    &self.output
  }

  /// The compiler arguments, in link order.
  pub fn args(&self) -> Vec<String> {
    let mut args = vec!["-O3".to_string()];
    args.extend(self.cflags.iter().cloned());
    args.extend(self.search_paths.iter().map(|p| format!("-L{}", p)));
    args.extend(
      ["-fstack-protector-strong", "-rdynamic", "-Wl,-export-dynamic"]
        .iter()
        .map(|s| s.to_string()),
    );
    args.extend(self.sources.iter().map(|p| p.display().to_string()));

    args.push("-Wl,-Bstatic".to_string());
    args.extend(self.objects.iter().map(|p| p.display().to_string()));
    args.push(format!("-l{}", RUBY_STATIC_LIB));
    args.extend(self.static_libs.iter().map(|n| format!("-l{}", n)));
    args.extend(RUNTIME_LIBS.iter().map(|n| format!("-l{}", n)));

    args.push("-Wl,-Bdynamic".to_string());
    args.extend(self.dynamic_libs.iter().map(|n| format!("-l{}", n)));

    args.push("-o".to_string());
    args.push(self.output.display().to_string());
    args
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn normalises_library_tokens() {
    assert_eq!(LibrarySet::normalise("-lssl"), Some("ssl"));
    assert_eq!(LibrarySet::normalise("libyaml.a"), Some("yaml"));
    assert_eq!(LibrarySet::normalise("/opt/lib/libffi.a"), Some("ffi"));
    assert_eq!(LibrarySet::normalise("-L/usr/lib"), None);
    assert_eq!(LibrarySet::normalise("-l"), None);
    assert_eq!(LibrarySet::normalise("-Wl,-rpath"), None);
    assert_eq!(LibrarySet::normalise("parser.o"), None);
  }

  #[test]
  fn first_occurrence_wins() {
    let set: LibrarySet = ["-lz", "-lssl", "-lz", "libcrypto.a", "-lssl"].into_iter().collect();

    assert_eq!(set.iter().collect::<Vec<_>>(), vec!["z", "ssl", "crypto"]);
  }

  #[test]
  fn partition_always_includes_allow_list() {
    let set: LibrarySet = ["-lpthread", "-lssl", "-lm"].into_iter().collect();

    let (static_libs, dynamic_libs) = set.partition();

    assert_eq!(static_libs.iter().collect::<Vec<_>>(), vec!["ssl"]);
    assert_eq!(dynamic_libs.iter().collect::<Vec<_>>(), vec!["pthread", "m", "dl", "c"]);
  }

  #[test]
  fn single_dynamic_switch_between_groups() {
    let plan = LinkPlan::new(LinkInputs {
      main_libs: strings(&["-lpthread", "-lssl", "-lm"]),
      builtin_ext_libs: strings(&["-lz", "-lm"]),
      native_ext_libs: vec![strings(&["-lxml2", "-lssl"]), vec![]],
      search_paths: strings(&["/w/lib", "/c/vfs", "/w/lib"]),
      objects: vec![PathBuf::from("/w/ext/parser.o")],
      sources: vec![PathBuf::from("/w/main.c"), PathBuf::from("/w/fs.c")],
      cflags: strings(&["-I/w/include/ruby-3.4.0"]),
      output: PathBuf::from("/d/app"),
    });

    let args = plan.args();

    let switches: Vec<usize> = args
      .iter()
      .enumerate()
      .filter(|(_, a)| *a == "-Wl,-Bdynamic")
      .map(|(i, _)| i)
      .collect();
    assert_eq!(switches.len(), 1);
    let switch = switches[0];

    for name in ["ssl", "z", "xml2", "kompo_fs", "kompo_wrap", "ruby-static"] {
      let pos = args.iter().position(|a| *a == format!("-l{}", name)).unwrap();
      assert!(pos < switch, "-l{} should be linked statically", name);
    }
    assert_eq!(&args[switch + 1..switch + 5], &strings(&["-lpthread", "-lm", "-ldl", "-lc"])[..]);
    assert_eq!(&args[args.len() - 2..], &strings(&["-o", "/d/app"])[..]);
    assert_eq!(args.iter().filter(|a| *a == "-L/w/lib").count(), 1);
  }

  #[test]
  fn runtime_libraries_follow_static_group() {
    let plan = LinkPlan::new(LinkInputs {
      main_libs: strings(&["-lkompo_fs", "-lruby-static", "-lgmp"]),
      output: PathBuf::from("app"),
      ..LinkInputs::default()
    });

    let args = plan.args();
    let gmp = args.iter().position(|a| a == "-lgmp").unwrap();
    let fs = args.iter().position(|a| a == "-lkompo_fs").unwrap();
    let bstatic = args.iter().position(|a| a == "-Wl,-Bstatic").unwrap();

    assert!(bstatic < gmp && gmp < fs);
    assert_eq!(args.iter().filter(|a| *a == "-lkompo_fs").count(), 1);
    assert_eq!(args.iter().filter(|a| *a == "-lruby-static").count(), 1);
  }
}
