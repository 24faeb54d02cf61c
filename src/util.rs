//! Small utility helpers used across modules.

use std::sync::OnceLock;

use regex::Regex;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Rewrite `\( .. \)` and `\[ .. \]` delimiters into `$ .. $` / `$$ .. $$`,
/// which is what the markdown renderer understands.
pub fn clean_latex(text: &str) -> String {
  static INLINE: OnceLock<Regex> = OnceLock::new();
  static DISPLAY: OnceLock<Regex> = OnceLock::new();
  let inline = INLINE.get_or_init(|| Regex::new(r"\\\((.*?)\\\)").expect("static regex"));
  let display = DISPLAY.get_or_init(|| Regex::new(r"\\\[([\s\S]*?)\\\]").expect("static regex"));

  let text = inline.replace_all(text, "$$$1$$");
  display.replace_all(&text, "$$$$$1$$$$").into_owned()
}

/// Pull the outermost `{ ... }` slice out of a model reply that wrapped its JSON
/// in prose or code fences.
pub fn json_object_slice(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start { None } else { Some(&text[start..=end]) }
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}
