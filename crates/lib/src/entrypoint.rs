//! Bootstrap source for the packaged executable.

use std::path::Path;

use crate::context::NativeExt;

/// Render `main.c`.
///
/// The program registers every statically linked native extension, mounts
/// the embedded filesystem, and runs the interpreter on the embedded start
/// file, forwarding its own arguments to the script. With a standalone
/// bundle, `bundle_setup` is required before the script.
pub fn render_main_c(exts: &[NativeExt], bundle_setup: Option<&Path>) -> String {
  let mut src = String::new();
  src.push_str("/* Generated by kompo. Do not edit. */\n");
  src.push_str("#include <stdlib.h>\n#include <ruby.h>\n\n");
  src.push_str("void ruby_init_ext(const char *name, void (*init)(void));\n");
  src.push_str("void Init_kompo_fs(void);\n");
  src.push_str("const char *get_start_file_name(void);\n\n");

  for ext in exts {
    src.push_str(&format!("void {}(void);\n", ext.init_fn));
  }
  src.push_str("\nstatic void Init_compiled_exts(void)\n{\n");
  for ext in exts {
    src.push_str(&format!("  ruby_init_ext({}, {});\n", c_string(&ext.feature), ext.init_fn));
  }
  src.push_str("}\n\n");

  let prefix_args = if bundle_setup.is_some() { 3 } else { 1 };
  src.push_str("int main(int argc, char **argv)\n{\n");
  src.push_str(&format!(
    "  char **args = malloc(sizeof(char *) * (argc + {}));\n",
    prefix_args + 1
  ));
  src.push_str("  int n = 0;\n");
  src.push_str("  if (args == NULL) return 1;\n");
  src.push_str("  args[n++] = argv[0];\n");
  if let Some(setup) = bundle_setup {
    src.push_str("  args[n++] = \"-r\";\n");
    src.push_str(&format!("  args[n++] = {};\n", c_string(&setup.to_string_lossy())));
  }
  src.push_str("  args[n++] = (char *)get_start_file_name();\n");
  src.push_str("  for (int i = 1; i < argc; i++) args[n++] = argv[i];\n");
  src.push_str("  args[n] = NULL;\n\n");
  src.push_str("  ruby_sysinit(&argc, &argv);\n");
  src.push_str("  {\n");
  src.push_str("    RUBY_INIT_STACK;\n");
  src.push_str("    ruby_init();\n");
  src.push_str("    Init_compiled_exts();\n");
  src.push_str("    Init_kompo_fs();\n");
  src.push_str("    return ruby_run_node(ruby_options(n, args));\n");
  src.push_str("  }\n}\n");
  src
}

/// A C string literal with quotes and backslashes escaped.
fn c_string(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for c in value.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}
